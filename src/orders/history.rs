//! Read-only order histories for one customer or one restaurant.
//!
//! Each history page holds its own copy of the orders; nothing here is
//! shared with the live board or touched by live events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backend::decode_orders;
use super::model::{Order, OrderStatus};
use crate::api::ApiClient;
use crate::error::{AdminError, AdminResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    User(String),
    Restaurant(String),
}

impl HistoryScope {
    fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Restaurant(id) => id,
        }
    }

    pub fn path(&self) -> AdminResult<String> {
        let id = self.id().trim();
        if id.is_empty() || id.contains('/') || id.contains('?') {
            return Err(AdminError::Validation(format!("Invalid id: {id:?}")));
        }
        Ok(match self {
            Self::User(_) => format!("/admin/users/{id}/orders"),
            Self::Restaurant(_) => format!("/admin/restaurants/{id}/orders"),
        })
    }
}

pub async fn fetch_history(api: &ApiClient, scope: &HistoryScope) -> AdminResult<Vec<Order>> {
    let path = scope.path()?;
    decode_orders(api.get(&path).await?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub order_count: usize,
    /// Sum of totals, cancelled orders excluded.
    pub total_value: f64,
    pub delivered: usize,
    pub cancelled: usize,
    pub last_order_at: Option<DateTime<Utc>>,
}

pub fn summarize(orders: &[Order]) -> HistorySummary {
    orders.iter().fold(
        HistorySummary {
            order_count: orders.len(),
            ..HistorySummary::default()
        },
        |mut acc, order| {
            match order.status {
                OrderStatus::Cancelled => acc.cancelled += 1,
                OrderStatus::Delivered => {
                    acc.delivered += 1;
                    acc.total_value += order.total;
                }
                _ => acc.total_value += order.total,
            }
            acc.last_order_at = acc.last_order_at.max(Some(order.created_at));
            acc
        },
    )
}
