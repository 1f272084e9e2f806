//! Order endpoints behind a trait so the board can run against a fake.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::model::{Order, OrderStatus};
use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};

#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Full order collection, newest first as the backend returns it.
    async fn fetch_orders(&self) -> AdminResult<Vec<Order>>;

    async fn update_status(&self, order_id: &str, status: &OrderStatus) -> AdminResult<()>;
}

/// Decode a list payload, skipping entries that do not parse so one bad
/// record does not blank the whole table.
pub fn decode_orders(value: Value) -> AdminResult<Vec<Order>> {
    let items = match unwrap_envelope(value) {
        Value::Array(items) => items,
        Value::Object(mut obj) if obj.get("orders").is_some_and(Value::is_array) => {
            match obj.remove("orders") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        Value::Null => Vec::new(),
        other => {
            return Err(AdminError::InvalidResponse(format!(
                "expected an order list, got {}",
                type_name(&other)
            )))
        }
    };

    let mut orders = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value::<Order>(item) {
            Ok(order) => orders.push(order),
            Err(e) => warn!(order_id = %id, error = %e, "skipping undecodable order"),
        }
    }
    Ok(orders)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl OrderBackend for ApiClient {
    async fn fetch_orders(&self) -> AdminResult<Vec<Order>> {
        decode_orders(self.get("/admin/orders").await?)
    }

    async fn update_status(&self, order_id: &str, status: &OrderStatus) -> AdminResult<()> {
        self.patch(
            "/admin/orders/status",
            &json!({ "orderId": order_id, "status": status.as_str() }),
        )
        .await?;
        Ok(())
    }
}
