//! Order wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Delivery lifecycle of an order.
///
/// `Placed -> Packed -> OutForDelivery -> Delivered`, with `Cancelled`
/// reachable from any non-terminal state. Codes the console does not
/// recognise are kept verbatim in `Unknown` so they still display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Placed,
    Packed,
    OutForDelivery,
    Delivered,
    Cancelled,
    Unknown(String),
}

impl OrderStatus {
    /// Statuses an admin can pick from the dropdown.
    pub const SELECTABLE: [OrderStatus; 5] = [
        OrderStatus::Placed,
        OrderStatus::Packed,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn parse(code: &str) -> Self {
        match code {
            "Placed" => Self::Placed,
            "Packed" => Self::Packed,
            "OutForDelivery" => Self::OutForDelivery,
            "Delivered" => Self::Delivered,
            "Cancelled" => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Placed => "Placed",
            Self::Packed => "Packed",
            Self::OutForDelivery => "OutForDelivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Unknown(code) => code,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Next step along the happy path, if any. A UI hint only: the backend
    /// decides which transitions are legal.
    pub fn next_in_lifecycle(&self) -> Option<OrderStatus> {
        match self {
            Self::Placed => Some(Self::Packed),
            Self::Packed => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Human label for tables and notifications.
    pub fn label(&self) -> &str {
        match self {
            Self::OutForDelivery => "Out for delivery",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::parse(&code))
    }
}

/// Denormalised customer reference carried on every order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "qty", default)]
    pub quantity: u32,
    #[serde(rename = "price", default)]
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_addons: Vec<Value>,
}

/// An order as returned by `GET /admin/orders`. `total` is computed by the
/// backend and never recomputed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "user", default, deserialize_with = "null_as_default")]
    pub customer: Customer,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total: f64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Payload of the `order-updated` live event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    #[serde(alias = "order_id", alias = "_id")]
    pub order_id: String,
    pub status: OrderStatus,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Phone numbers show up as strings or bare numbers depending on how the
/// user signed up.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_backend_order_shape() {
        let order: Order = serde_json::from_value(json!({
            "_id": "66a1",
            "user": { "_id": "u1", "name": "Ravi", "phone": 9123456780u64 },
            "items": [
                { "name": "Milk", "qty": 2, "price": 30, "image": "milk.png",
                  "selectedAddons": [{ "name": "chilled" }] }
            ],
            "total": 60,
            "status": "OutForDelivery",
            "paymentMethod": "COD",
            "createdAt": "2024-05-01T10:00:00.000Z"
        }))
        .expect("order decodes");

        assert_eq!(order.id, "66a1");
        assert_eq!(order.customer.phone, "9123456780");
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].selected_addons.len(), 1);
        assert_eq!(order.status, OrderStatus::OutForDelivery);
        assert_eq!(order.payment_method.as_deref(), Some("COD"));
    }

    #[test]
    fn unknown_status_is_kept_verbatim() {
        let order: Order = serde_json::from_value(json!({
            "_id": "x",
            "user": null,
            "status": "Returned",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .expect("order decodes");

        assert_eq!(order.status, OrderStatus::Unknown("Returned".into()));
        assert!(!order.status.is_known());
        assert_eq!(order.customer, Customer::default());
        assert_eq!(serde_json::to_value(&order.status).unwrap(), json!("Returned"));
    }

    #[test]
    fn lifecycle_hints() {
        assert_eq!(
            OrderStatus::Placed.next_in_lifecycle(),
            Some(OrderStatus::Packed)
        );
        assert_eq!(OrderStatus::Delivered.next_in_lifecycle(), None);
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::OutForDelivery.is_terminal());
        assert!(OrderStatus::SELECTABLE.iter().all(OrderStatus::is_known));
    }

    #[test]
    fn status_change_accepts_snake_case_id() {
        let change: StatusChange =
            serde_json::from_value(json!({ "order_id": "a", "status": "Packed" })).unwrap();
        assert_eq!(change.order_id, "a");
        assert_eq!(change.status, OrderStatus::Packed);
    }
}
