//! Dashboard metrics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};
use crate::orders::backend::decode_orders;
use crate::orders::{Order, OrderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    #[serde(rename = "_id")]
    pub status: OrderStatus,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_orders: u64,
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub today_orders: u64,
    #[serde(default)]
    pub status_stats: Vec<StatusCount>,
    #[serde(default, skip_deserializing)]
    pub recent_orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdownRow {
    pub status: OrderStatus,
    pub label: String,
    pub count: u64,
    /// Share of all counted orders, 0..=100.
    pub percent: f64,
}

impl DashboardStats {
    /// One row per selectable status (zero when missing), followed by any
    /// codes the console does not recognise.
    pub fn status_breakdown(&self) -> Vec<StatusBreakdownRow> {
        let total: u64 = self.status_stats.iter().map(|s| s.count).sum();
        let count_of = |status: &OrderStatus| {
            self.status_stats
                .iter()
                .filter(|s| &s.status == status)
                .map(|s| s.count)
                .sum::<u64>()
        };
        let row = |status: OrderStatus, count: u64| StatusBreakdownRow {
            label: status.label().to_string(),
            percent: if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            },
            status,
            count,
        };

        let mut rows: Vec<StatusBreakdownRow> = OrderStatus::SELECTABLE
            .iter()
            .map(|s| row(s.clone(), count_of(s)))
            .collect();
        for stat in self.status_stats.iter().filter(|s| !s.status.is_known()) {
            if !rows.iter().any(|r| r.status == stat.status) {
                rows.push(row(stat.status.clone(), count_of(&stat.status)));
            }
        }
        rows
    }

    pub fn average_order_value(&self) -> f64 {
        if self.total_orders == 0 {
            0.0
        } else {
            self.total_revenue / self.total_orders as f64
        }
    }
}

/// Parse the dashboard payload. Recent orders go through the lenient list
/// decoder so one malformed order does not hide the metrics.
pub fn decode_dashboard(value: Value) -> AdminResult<DashboardStats> {
    let mut data = unwrap_envelope(value);
    let recent = match data.as_object_mut().and_then(|o| o.remove("recentOrders")) {
        Some(list) => decode_orders(list).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring malformed recentOrders");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let mut stats: DashboardStats = serde_json::from_value(data)
        .map_err(|e| AdminError::InvalidResponse(format!("/admin/dashboard: {e}")))?;
    stats.recent_orders = recent;
    Ok(stats)
}

pub async fn fetch_dashboard(api: &ApiClient) -> AdminResult<DashboardStats> {
    decode_dashboard(api.get("/admin/dashboard").await?)
}
