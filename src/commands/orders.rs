use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::info;

use super::{require_session, toast_error};
use crate::orders::history::{fetch_history, summarize, HistoryScope};
use crate::orders::{OrderListView, OrderStatus, PageSize, SortField, StatusFilter};
use crate::{parse_channel_payload, payload_arg0_as_string, value_i64, value_str, AppState};

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Query inputs present in one payload. Absent keys leave the current
/// value alone; `null` or `""` clears a date.
#[derive(Debug, Default, PartialEq)]
struct QueryPatch {
    search: Option<String>,
    status: Option<StatusFilter>,
    date_from: Option<Option<NaiveDate>>,
    date_to: Option<Option<NaiveDate>>,
    page_size: Option<PageSize>,
    page: Option<usize>,
}

fn parse_date(value: &Value) -> Result<Option<NaiveDate>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            // Accept full ISO timestamps from date pickers; only the day matters.
            let day = s.trim().get(..10).unwrap_or(s.trim());
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| format!("Invalid date: {s}"))
        }
        other => Err(format!("Invalid date: {other}")),
    }
}

fn field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| payload.get(*k))
}

fn parse_query_patch(payload: &Value) -> Result<QueryPatch, String> {
    let mut patch = QueryPatch::default();
    if let Some(v) = field(payload, &["search", "q"]) {
        patch.search = Some(v.as_str().unwrap_or_default().to_string());
    }
    if let Some(v) = field(payload, &["status", "statusFilter"]) {
        patch.status = Some(StatusFilter::parse(v.as_str().unwrap_or_default()));
    }
    if let Some(v) = field(payload, &["dateFrom", "date_from", "from"]) {
        patch.date_from = Some(parse_date(v)?);
    }
    if let Some(v) = field(payload, &["dateTo", "date_to", "to"]) {
        patch.date_to = Some(parse_date(v)?);
    }
    if let Some(v) = field(payload, &["pageSize", "page_size", "limit"]) {
        let size = match v.as_u64() {
            Some(n) => PageSize::try_from(n),
            None => v.as_str().unwrap_or_default().parse(),
        };
        patch.page_size = Some(size.map_err(|e| e.to_string())?);
    }
    if let Some(page) = value_i64(payload, &["page"]) {
        patch.page = Some(page.max(1) as usize);
    }
    if let (Some(Some(from)), Some(Some(to))) = (patch.date_from, patch.date_to) {
        if from > to {
            return Err(format!("Start date {from} is after end date {to}"));
        }
    }
    Ok(patch)
}

fn apply_query_patch(view: &mut OrderListView, patch: QueryPatch) {
    if let Some(search) = patch.search {
        view.set_search(&search);
    }
    if let Some(status) = patch.status {
        view.set_status_filter(status);
    }
    if let Some(date) = patch.date_from {
        view.set_date_from(date);
    }
    if let Some(date) = patch.date_to {
        view.set_date_to(date);
    }
    if let Some(size) = patch.page_size {
        view.set_page_size(size);
    }
    if let Some(page) = patch.page {
        view.set_page(page);
    }
}

fn parse_sort_payload(arg0: Option<Value>) -> Result<SortField, String> {
    payload_arg0_as_string(arg0, &["field", "sortBy", "column"])
        .ok_or_else(|| "Missing sort field".to_string())?
        .parse()
}

fn parse_page_payload(arg0: Option<Value>) -> Result<usize, String> {
    let page = match arg0 {
        Some(Value::Number(n)) => n.as_i64(),
        Some(payload @ Value::Object(_)) => value_i64(&payload, &["page"]),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    page.map(|p| p.max(1) as usize)
        .ok_or_else(|| "Missing page number".to_string())
}

fn parse_status_update_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<(String, OrderStatus), String> {
    let (order_id, status) = match (arg0, arg1) {
        (Some(Value::String(id)), Some(Value::String(status))) => {
            (Some(id.trim().to_string()), Some(status.trim().to_string()))
        }
        (arg0, arg1) => {
            let payload = parse_channel_payload(arg0, arg1);
            (
                value_str(&payload, &["orderId", "order_id", "id", "_id"]),
                value_str(&payload, &["status", "newStatus"]),
            )
        }
    };
    let order_id = order_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "Missing order id".to_string())?;
    let status = status
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Missing status".to_string())?;
    Ok((order_id, OrderStatus::parse(&status)))
}

// ---------------------------------------------------------------------------
// Board commands
// ---------------------------------------------------------------------------

/// Enter the order view: guard, make sure the live channel is up, then
/// mount the board (initial fetch plus live events).
pub fn orders_mount(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    state.start_live();
    if state.mount_board() {
        info!("order view mounted");
    }
    Ok(state.board.snapshot())
}

pub async fn orders_unmount(state: &AppState) -> Result<Value, String> {
    let unmounted = state.unmount_board().await;
    Ok(json!({ "unmounted": unmounted }))
}

pub async fn orders_refresh(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    // The board has already toasted and flagged auth failures.
    state.board.load().await.map_err(|e| e.to_string())?;
    Ok(state.board.snapshot())
}

pub fn orders_get_page(state: &AppState) -> Result<Value, String> {
    Ok(state.board.snapshot())
}

pub fn orders_set_query(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let patch = parse_query_patch(&parse_channel_payload(arg0, arg1))?;
    state.board.update(|view| apply_query_patch(view, patch));
    Ok(state.board.snapshot())
}

pub fn orders_sort_by(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let field = parse_sort_payload(arg0)?;
    state.board.update(|view| view.sort_by(field));
    Ok(state.board.snapshot())
}

pub fn orders_set_page(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let page = parse_page_payload(arg0)?;
    state.board.update(|view| view.set_page(page));
    Ok(state.board.snapshot())
}

pub fn orders_get_statuses() -> Result<Value, String> {
    let statuses: Vec<Value> = OrderStatus::SELECTABLE
        .iter()
        .map(|s| {
            json!({
                "value": s.as_str(),
                "label": s.label(),
                "terminal": s.is_terminal(),
                "next": s.next_in_lifecycle().map(|n| n.as_str().to_string()),
            })
        })
        .collect();
    Ok(Value::Array(statuses))
}

pub async fn order_update_status(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (order_id, status) = parse_status_update_payload(arg0, arg1)?;
    require_session(state)?;
    state
        .board
        .change_status(&order_id, status)
        .await
        .map_err(|e| e.to_string())?;
    Ok(state.board.snapshot())
}

// ---------------------------------------------------------------------------
// Histories
// ---------------------------------------------------------------------------

async fn history(
    state: &AppState,
    scope: HistoryScope,
    query: &Value,
) -> Result<Value, String> {
    let patch = parse_query_patch(query)?;
    require_session(state)?;
    let orders = fetch_history(&state.api, &scope)
        .await
        .map_err(|e| toast_error(state, "Failed to load order history", e))?;

    let summary = summarize(&orders);
    let mut view = OrderListView::new(state.config.default_page_size, state.config.utc_offset);
    view.replace(orders);
    apply_query_patch(&mut view, patch);
    Ok(json!({ "summary": summary, "page": view.page() }))
}

fn parse_history_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
    keys: &[&str],
) -> Result<(String, Value), String> {
    let id = payload_arg0_as_string(arg0.clone(), keys)
        .ok_or_else(|| "Missing id".to_string())?;
    let query = match (arg0, arg1) {
        (_, Some(q @ Value::Object(_))) => q,
        (Some(q @ Value::Object(_)), _) => q,
        _ => json!({}),
    };
    Ok((id, query))
}

pub async fn orders_user_history(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (id, query) = parse_history_payload(arg0, arg1, &["userId", "user_id", "id"])?;
    history(state, HistoryScope::User(id), &query).await
}

pub async fn orders_restaurant_history(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (id, query) =
        parse_history_payload(arg0, arg1, &["restaurantId", "restaurant_id", "id"])?;
    history(state, HistoryScope::Restaurant(id), &query).await
}
