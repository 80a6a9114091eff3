//! Records held in the local store and replayed to the remote.
//!
//! Field names serialize in camelCase, which is the document shape the remote
//! collections use. The `synced` flag is local bookkeeping only and is never
//! serialized into a remote payload or a queue entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        f64::from(self.quantity) * self.price
    }
}

/// An order as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_address: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Sum of `quantity * price`, fixed when the order is written.
    pub total: f64,
    /// ISO-8601 creation time. Never changes after creation.
    pub date: String,
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl Order {
    pub fn compute_total(items: &[OrderItem]) -> f64 {
        items.iter().map(OrderItem::line_total).sum()
    }
}

/// Per-client aggregate derived from that client's orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub total_orders: u32,
    pub total_spent: f64,
    pub first_order: String,
    pub last_order: String,
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

/// Shop identity printed on invoices. Stored as a singleton document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopSettings {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub signature: String,
    pub email: String,
    pub logo: String,
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            name: "My Shop".into(),
            phone: String::new(),
            address: String::new(),
            signature: "The Manager".into(),
            email: String::new(),
            logo: String::new(),
        }
    }
}

/// One pending mutation in the change queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned, strictly increasing.
    pub id: i64,
    pub action: String,
    pub data: Value,
    /// Capture time in unix milliseconds.
    pub timestamp: i64,
}

impl QueueEntry {
    /// The `id` field of the payload, when the payload names an entity.
    pub fn entity_id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }
}

/// The closed set of queue actions the sync manager knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    CreateOrder,
    UpdateOrder,
    UpdateOrderStatus,
    DeleteOrder,
    SaveClient,
    SaveSettings,
}

impl SyncAction {
    pub const ALL: [SyncAction; 6] = [
        SyncAction::CreateOrder,
        SyncAction::UpdateOrder,
        SyncAction::UpdateOrderStatus,
        SyncAction::DeleteOrder,
        SyncAction::SaveClient,
        SyncAction::SaveSettings,
    ];

    /// Tag written to the `action` column.
    pub fn tag(&self) -> &'static str {
        match self {
            SyncAction::CreateOrder => "createOrder",
            SyncAction::UpdateOrder => "updateOrder",
            SyncAction::UpdateOrderStatus => "updateOrderStatus",
            SyncAction::DeleteOrder => "deleteOrder",
            SyncAction::SaveClient => "saveClient",
            SyncAction::SaveSettings => "saveSettings",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.tag() == tag)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
