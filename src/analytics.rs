//! Revenue and client analytics computed from the local store.
//!
//! Works offline: only local records are read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::LocalStore;
use crate::error::StoreResult;
use crate::models::{Client, Order, OrderStatus};

/// How many clients [`Summary::top_clients`] keeps.
pub const TOP_CLIENTS: usize = 5;

/// How many item names [`Summary::top_items`] keeps.
pub const TOP_ITEMS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub paid: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSales {
    pub name: String,
    pub quantity: u64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_orders: usize,
    pub by_status: StatusCounts,
    /// Sum of totals of paid and delivered orders.
    pub revenue: f64,
    /// Revenue of the last seven days.
    pub weekly_revenue: f64,
    /// Revenue keyed by `YYYY-MM`.
    pub revenue_by_month: BTreeMap<String, f64>,
    pub average_order_value: f64,
    /// Share of orders that are paid or delivered, in percent.
    pub conversion_rate: f64,
    pub top_clients: Vec<Client>,
    pub top_items: Vec<ItemSales>,
    /// Records written locally and not yet confirmed by the remote.
    pub unsynced_orders: usize,
}

fn earns_revenue(order: &Order) -> bool {
    matches!(order.status, OrderStatus::Paid | OrderStatus::Delivered)
}

/// Summarize the store as of now.
pub fn summarize(store: &LocalStore) -> StoreResult<Summary> {
    let orders = store.get_all::<Order>()?;
    let clients = store.get_all::<Client>()?;
    Ok(summarize_at(&orders, clients, Utc::now()))
}

fn summarize_at(orders: &[Order], mut clients: Vec<Client>, now: DateTime<Utc>) -> Summary {
    let mut summary = Summary {
        total_orders: orders.len(),
        ..Summary::default()
    };
    let week_ago = now - Duration::days(7);
    let mut items: BTreeMap<String, ItemSales> = BTreeMap::new();

    for order in orders {
        match order.status {
            OrderStatus::Pending => summary.by_status.pending += 1,
            OrderStatus::Paid => summary.by_status.paid += 1,
            OrderStatus::Delivered => summary.by_status.delivered += 1,
        }
        if !order.synced {
            summary.unsynced_orders += 1;
        }

        for item in &order.items {
            let sales = items.entry(item.name.clone()).or_insert_with(|| ItemSales {
                name: item.name.clone(),
                quantity: 0,
                revenue: 0.0,
            });
            sales.quantity += u64::from(item.quantity);
            sales.revenue += item.line_total();
        }

        if !earns_revenue(order) {
            continue;
        }
        summary.revenue += order.total;
        match DateTime::parse_from_rfc3339(&order.date) {
            Ok(date) => {
                let date = date.with_timezone(&Utc);
                if date >= week_ago {
                    summary.weekly_revenue += order.total;
                }
                *summary
                    .revenue_by_month
                    .entry(date.format("%Y-%m").to_string())
                    .or_default() += order.total;
            }
            Err(_) => debug!(order_id = %order.id, "Order date unparseable; skipped in time series"),
        }
    }

    if !orders.is_empty() {
        let count = orders.len() as f64;
        summary.average_order_value = orders.iter().map(|o| o.total).sum::<f64>() / count;
        let converted = (summary.by_status.paid + summary.by_status.delivered) as f64;
        summary.conversion_rate = converted / count * 100.0;
    }

    clients.sort_by(|a, b| b.total_spent.total_cmp(&a.total_spent));
    clients.truncate(TOP_CLIENTS);
    summary.top_clients = clients;

    let mut items: Vec<ItemSales> = items.into_values().collect();
    items.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
    items.truncate(TOP_ITEMS);
    summary.top_items = items;

    summary
}
