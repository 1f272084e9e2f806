use serde_json::{json, Value};

use super::{require_session, toast_error};
use crate::dashboard::{fetch_dashboard, DashboardStats};
use crate::AppState;

fn dashboard_json(stats: &DashboardStats) -> Value {
    json!({
        "stats": stats,
        "statusBreakdown": stats.status_breakdown(),
        "averageOrderValue": stats.average_order_value(),
    })
}

pub async fn dashboard_get(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    let stats = fetch_dashboard(&state.api)
        .await
        .map_err(|e| toast_error(state, "Failed to load dashboard", e))?;
    Ok(dashboard_json(&stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::StatusCount;
    use crate::orders::OrderStatus;

    #[test]
    fn dashboard_json_carries_derived_fields() {
        let stats = DashboardStats {
            total_orders: 4,
            total_revenue: 1000.0,
            status_stats: vec![StatusCount {
                status: OrderStatus::Delivered,
                count: 4,
            }],
            ..DashboardStats::default()
        };
        let out = dashboard_json(&stats);
        assert_eq!(out["averageOrderValue"], 250.0);
        assert_eq!(out["stats"]["totalOrders"], 4);
        assert_eq!(out["statusBreakdown"].as_array().unwrap().len(), 5);
        assert_eq!(out["statusBreakdown"][3]["percent"], 100.0);
    }

    #[tokio::test]
    async fn dashboard_requires_session() {
        let (state, emitter) = crate::test_support::state_with_token(None);
        assert!(dashboard_get(&state).await.is_err());
        assert_eq!(
            emitter.names(),
            vec![crate::events::EVENT_SESSION_EXPIRED]
        );
    }
}
