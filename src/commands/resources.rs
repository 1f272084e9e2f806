use serde_json::{json, Value};

use super::{require_session, toast_error};
use crate::resources::{self, HomeLayout, ResourceKind};
use crate::{value_bool, value_i64, value_str, AppState};

#[derive(Debug, PartialEq)]
struct ResourcePayload {
    kind: ResourceKind,
    id: Option<String>,
    data: Value,
    is_active: Option<bool>,
}

/// Accepts `(kind, {id?, data?, isActive?})`, `(kind, id)` or a single
/// object carrying `resource` alongside the same fields. When no `data`
/// key is present the remaining object is the form body.
fn parse_resource_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<ResourcePayload, String> {
    let (kind_raw, body) = match (arg0, arg1) {
        (Some(Value::String(kind)), Some(Value::String(id))) => {
            (Some(kind), json!({ "id": id }))
        }
        (Some(Value::String(kind)), body) => (Some(kind), body.unwrap_or_else(|| json!({}))),
        (Some(obj @ Value::Object(_)), _) => {
            (value_str(&obj, &["resource", "kind", "type"]), obj)
        }
        _ => (None, json!({})),
    };
    let kind: ResourceKind = kind_raw
        .ok_or_else(|| "Missing resource type".to_string())?
        .parse()
        .map_err(|e: crate::error::AdminError| e.to_string())?;

    let id = value_str(&body, &["id", "_id"]);
    let is_active = value_bool(&body, &["isActive", "is_active", "active"]);
    let data = match body.get("data") {
        Some(data) => data.clone(),
        None => {
            let mut form = body;
            if let Some(obj) = form.as_object_mut() {
                obj.remove("resource");
                obj.remove("kind");
                obj.remove("id");
            }
            form
        }
    };
    Ok(ResourcePayload {
        kind,
        id,
        data,
        is_active,
    })
}

fn require_id(payload: &ResourcePayload) -> Result<&str, String> {
    payload
        .id
        .as_deref()
        .ok_or_else(|| format!("Missing {} id", payload.kind.singular().to_lowercase()))
}

pub async fn resource_list(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let payload = parse_resource_payload(arg0, None)?;
    require_session(state)?;
    let items = resources::list(&state.api, payload.kind)
        .await
        .map_err(|e| toast_error(state, &format!("Failed to load {}", payload.kind), e))?;
    Ok(Value::Array(items))
}

pub async fn resource_create(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_resource_payload(arg0, arg1)?;
    require_session(state)?;
    let created = resources::create(&state.api, payload.kind, &payload.data)
        .await
        .map_err(|e| toast_error(state, "Save failed", e))?;
    state
        .toasts
        .success(format!("{} created", payload.kind.singular()));
    Ok(created)
}

pub async fn resource_update(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_resource_payload(arg0, arg1)?;
    let id = require_id(&payload)?;
    require_session(state)?;
    let updated = resources::update(&state.api, payload.kind, id, &payload.data)
        .await
        .map_err(|e| toast_error(state, "Save failed", e))?;
    state
        .toasts
        .success(format!("{} updated", payload.kind.singular()));
    Ok(updated)
}

pub async fn resource_toggle_status(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_resource_payload(arg0, arg1)?;
    let id = require_id(&payload)?;
    let current = payload
        .is_active
        .ok_or_else(|| "Missing current isActive value".to_string())?;
    require_session(state)?;
    let next = resources::toggle_status(&state.api, payload.kind, id, current)
        .await
        .map_err(|e| toast_error(state, "Status change failed", e))?;
    Ok(json!({ "id": id, "isActive": next }))
}

pub async fn resource_delete(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_resource_payload(arg0, arg1)?;
    let id = require_id(&payload)?;
    require_session(state)?;
    resources::delete(&state.api, payload.kind, id)
        .await
        .map_err(|e| toast_error(state, "Delete failed", e))?;
    state
        .toasts
        .success(format!("{} deleted", payload.kind.singular()));
    Ok(json!({ "success": true, "id": id }))
}

// ---------------------------------------------------------------------------
// Home layout
// ---------------------------------------------------------------------------

fn layout_json(layout: &HomeLayout) -> Value {
    json!({ "sections": layout.sections() })
}

pub async fn home_layout_load(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    let layout = resources::load_layout(&state.api)
        .await
        .map_err(|e| toast_error(state, "Failed to load home sections", e))?;
    let out = layout_json(&layout);
    *state.home_layout() = layout;
    Ok(out)
}

fn parse_move_payload(arg0: Option<Value>, arg1: Option<Value>) -> Result<(usize, usize), String> {
    let index = |v: i64| usize::try_from(v).map_err(|_| format!("Invalid index: {v}"));
    match (arg0, arg1) {
        (Some(Value::Number(from)), Some(Value::Number(to))) => {
            let from = from.as_i64().ok_or("Invalid source index")?;
            let to = to.as_i64().ok_or("Invalid target index")?;
            Ok((index(from)?, index(to)?))
        }
        (Some(payload @ Value::Object(_)), _) => {
            let from = value_i64(&payload, &["from", "fromIndex", "source"])
                .ok_or("Missing source index")?;
            let to = value_i64(&payload, &["to", "toIndex", "destination"])
                .ok_or("Missing target index")?;
            Ok((index(from)?, index(to)?))
        }
        _ => Err("Missing move payload".to_string()),
    }
}

/// Drag-and-drop a section locally. Nothing is sent until commit.
pub fn home_layout_move(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (from, to) = parse_move_payload(arg0, arg1)?;
    let mut layout = state.home_layout();
    layout.move_section(from, to).map_err(|e| e.to_string())?;
    Ok(layout_json(&layout))
}

pub async fn home_layout_commit(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    let layout = state.home_layout().clone();
    resources::commit_layout(&state.api, &layout)
        .await
        .map_err(|e| toast_error(state, "Failed to save section order", e))?;
    state.toasts.success("Section order saved");
    Ok(layout_json(&layout))
}

fn loaded_section_active(state: &AppState, id: &str) -> Option<bool> {
    let layout = state.home_layout();
    layout.sections().iter().find(|s| s.id == id).map(|s| s.is_active)
}

pub async fn home_layout_toggle_section(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let payload = parse_resource_payload(Some(json!("home_sections")), arg0.or(arg1))?;
    let id = require_id(&payload)?;
    let current = match payload.is_active {
        Some(current) => current,
        None => loaded_section_active(state, id)
            .ok_or_else(|| format!("Home section {id} not loaded"))?,
    };
    require_session(state)?;
    let next = resources::toggle_status(&state.api, ResourceKind::HomeSections, id, current)
        .await
        .map_err(|e| toast_error(state, "Status change failed", e))?;
    let mut layout = state.home_layout();
    layout.set_active(id, next);
    Ok(layout_json(&layout))
}
