//! Offline write path.
//!
//! Every operation writes the local store and enqueues the matching change
//! for the sync manager in one transaction. Nothing here touches the
//! network.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::LocalStore;
use crate::error::{OrderError, OrderResult, StoreError};
use crate::models::{Client, Order, OrderItem, OrderStatus, ShopSettings, SyncAction};

/// Caller-supplied fields of an order. Id, total and date are filled in by
/// the write path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub client_name: String,
    pub client_phone: String,
    pub client_address: String,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewOrder {
    fn validate(&self) -> OrderResult<()> {
        if self.client_name.trim().is_empty()
            || self.client_phone.trim().is_empty()
            || self.client_address.trim().is_empty()
        {
            return Err(OrderError::Invalid(
                "client name, phone and address are required".into(),
            ));
        }
        if normalize_phone(&self.client_phone).is_empty() {
            return Err(OrderError::Invalid(format!(
                "phone {:?} has no digits",
                self.client_phone
            )));
        }
        if let Some(item) = self
            .items
            .iter()
            .find(|item| item.name.trim().is_empty() || item.quantity < 1 || item.price < 0.0)
        {
            return Err(OrderError::Invalid(format!("invalid item {:?}", item.name)));
        }
        Ok(())
    }

    fn into_order(self, id: String, date: String) -> Order {
        let total = Order::compute_total(&self.items);
        Order {
            id,
            client_name: self.client_name.trim().to_string(),
            client_phone: self.client_phone.trim().to_string(),
            client_address: self.client_address.trim().to_string(),
            items: self.items,
            status: self.status,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            total,
            date,
            synced: false,
        }
    }
}

fn payload<T: Serialize>(value: &T) -> OrderResult<Value> {
    serde_json::to_value(value).map_err(|e| OrderError::Store(StoreError::from(e)))
}

/// Digits only, so "+237 650-00-00-01" and "237650000001" match.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Record a new order under a local placeholder id.
pub fn create_order(store: &LocalStore, new: NewOrder) -> OrderResult<Order> {
    new.validate()?;
    let order = new.into_order(Uuid::new_v4().to_string(), Utc::now().to_rfc3339());

    store.put_and_enqueue(&order, SyncAction::CreateOrder, &payload(&order)?)?;
    refresh_client(store, &order.client_phone)?;

    info!(order_id = %order.id, total = order.total, "Order recorded locally");
    Ok(order)
}

/// Replace the editable fields of an existing order. Id and date are kept.
pub fn update_order(store: &LocalStore, id: &str, new: NewOrder) -> OrderResult<Order> {
    new.validate()?;
    let existing = store
        .get::<Order>(id)?
        .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
    let order = new.into_order(existing.id, existing.date);

    store.put_and_enqueue(&order, SyncAction::UpdateOrder, &payload(&order)?)?;
    refresh_client(store, &order.client_phone)?;
    if normalize_phone(&existing.client_phone) != normalize_phone(&order.client_phone) {
        refresh_client(store, &existing.client_phone)?;
    }

    debug!(order_id = %order.id, "Order updated locally");
    Ok(order)
}

pub fn update_status(store: &LocalStore, id: &str, status: OrderStatus) -> OrderResult<Order> {
    let mut order = store
        .get::<Order>(id)?
        .ok_or_else(|| OrderError::NotFound(id.to_string()))?;
    order.status = status;

    store.put_and_enqueue(
        &order,
        SyncAction::UpdateOrderStatus,
        &json!({ "id": order.id, "status": status }),
    )?;

    debug!(order_id = %order.id, %status, "Order status changed locally");
    Ok(order)
}

/// Delete an order. Returns false when no such order exists.
pub fn delete_order(store: &LocalStore, id: &str) -> OrderResult<bool> {
    let Some(order) = store.get::<Order>(id)? else {
        return Ok(false);
    };

    store.delete_and_enqueue::<Order>(id, SyncAction::DeleteOrder, &json!({ "id": id }))?;
    refresh_client(store, &order.client_phone)?;

    debug!(order_id = id, "Order deleted locally");
    Ok(true)
}

pub fn save_settings(store: &LocalStore, settings: &ShopSettings) -> OrderResult<()> {
    store.put_shop_settings_and_enqueue(settings)?;
    Ok(())
}

/// Recompute the aggregate of the client behind `phone` from the current
/// order set and store it if it changed.
///
/// Running this twice for the same order set writes nothing the second
/// time. Returns the stored client, or `None` when the phone has neither a
/// client row nor any order.
pub fn refresh_client(store: &LocalStore, phone: &str) -> OrderResult<Option<Client>> {
    let key = normalize_phone(phone);
    if key.is_empty() {
        return Ok(None);
    }

    let mut orders: Vec<Order> = store
        .get_all::<Order>()?
        .into_iter()
        .filter(|o| normalize_phone(&o.client_phone) == key)
        .collect();
    orders.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

    let existing = store
        .get_all::<Client>()?
        .into_iter()
        .find(|c| normalize_phone(&c.phone) == key);

    let (first, latest) = match (orders.first(), orders.last()) {
        (Some(first), Some(latest)) => (first, latest),
        _ => match existing {
            // Orders gone: keep the client, zero the aggregate.
            Some(client) => {
                let cleared = Client {
                    total_orders: 0,
                    total_spent: 0.0,
                    ..client.clone()
                };
                return store_if_changed(store, Some(client), cleared);
            }
            None => return Ok(None),
        },
    };

    let computed = Client {
        id: existing
            .as_ref()
            .map(|c| c.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: latest.client_name.clone(),
        phone: latest.client_phone.clone(),
        address: latest.client_address.clone(),
        total_orders: u32::try_from(orders.len()).unwrap_or(u32::MAX),
        total_spent: orders.iter().map(|o| o.total).sum(),
        first_order: first.date.clone(),
        last_order: latest.date.clone(),
        synced: false,
    };
    store_if_changed(store, existing, computed)
}

fn store_if_changed(
    store: &LocalStore,
    existing: Option<Client>,
    computed: Client,
) -> OrderResult<Option<Client>> {
    if let Some(current) = existing {
        let unchanged = Client {
            synced: current.synced,
            ..computed.clone()
        };
        if unchanged == current {
            return Ok(Some(current));
        }
    }

    store.put_and_enqueue(&computed, SyncAction::SaveClient, &payload(&computed)?)?;
    debug!(
        client_id = %computed.id,
        total_orders = computed.total_orders,
        total_spent = computed.total_spent,
        "Client aggregate refreshed"
    );
    Ok(Some(computed))
}
