//! Order entity model.
//!
//! Pure data plus status transition rules: no I/O, no side effects. Raw
//! statuses arrive in two vocabularies (the owner/cook services speak
//! English, the waiter dashboard speaks German); both are normalized into
//! [`OrderStatus`] at the serde boundary so no predicate ever compares raw
//! strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an order.
///
/// The happy path is monotonic: `Pending → InKitchen → Ready → Served`.
/// `Cancelled` is terminal and reachable from any non-terminal state, but
/// only the backend ever cancels. Statuses the backend introduces later land
/// in `Unknown` with the raw string preserved, so a new vocabulary degrades
/// the display instead of crashing the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    InKitchen,
    Ready,
    Served,
    Cancelled,
    Unknown(String),
}

impl OrderStatus {
    /// Normalize a raw backend status string. Accepts both the English
    /// (cook/owner) and German (waiter) vocabularies, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => OrderStatus::Pending,
            "IN_KITCHEN" | "KUECHE" => OrderStatus::InKitchen,
            "READY" | "BEREIT" => OrderStatus::Ready,
            "SERVED" | "SERVIERT" => OrderStatus::Served,
            "CANCELLED" | "CANCELED" | "STORNIERT" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown(raw.trim().to_string()),
        }
    }

    /// Canonical wire form (the English vocabulary).
    pub fn as_wire(&self) -> &str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InKitchen => "IN_KITCHEN",
            OrderStatus::Ready => "READY",
            OrderStatus::Served => "SERVED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Unknown(raw) => raw,
        }
    }

    /// Waiter-facing presentation label. Unknown statuses pass through
    /// unchanged so new backend statuses still render something.
    pub fn display_label(&self) -> &str {
        match self {
            OrderStatus::Pending | OrderStatus::InKitchen => "In Zubereitung",
            OrderStatus::Ready => "Bereit",
            OrderStatus::Served => "Serviert",
            OrderStatus::Cancelled => "Storniert",
            OrderStatus::Unknown(raw) => raw,
        }
    }

    /// Terminal statuses end the order's life on the floor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Served | OrderStatus::Cancelled)
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        OrderStatus::parse(&raw)
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_wire().to_string()
    }
}

// ---------------------------------------------------------------------------
// Order + items
// ---------------------------------------------------------------------------

/// One item line on an order. `qty` is the legacy wire name still used by
/// the waiter dashboard's create-order form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(alias = "qty")]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: f64,
}

/// Read-mostly projection of a backend order, refreshed every
/// reconciliation tick. `table_id` is immutable after creation; preorders
/// may arrive with `table_id == 0` and only a `reservation_id`, which the
/// snapshot ingestion resolves through the reservation linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub table_id: i64,
    #[serde(default)]
    pub reservation_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_price: Option<f64>,
    pub status: OrderStatus,
    /// Target delivery time for preorders. Urgency display only, never
    /// correctness gating.
    #[serde(default)]
    pub requested_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra_info: Option<String>,
}

impl Order {
    /// Monetary total of the order, full precision.
    ///
    /// Prefers the backend-supplied `total_price` when present and positive;
    /// otherwise sums `unit_price * quantity` over the item lines. Never
    /// negative.
    pub fn total(&self) -> f64 {
        let total = match self.total_price {
            Some(t) if t > 0.0 => t,
            _ => self
                .items
                .iter()
                .map(|i| i.unit_price * f64::from(i.quantity))
                .sum(),
        };
        total.max(0.0)
    }

    /// Total rounded to 2 decimal places for display.
    pub fn display_total(&self) -> f64 {
        (self.total() * 100.0).round() / 100.0
    }

    /// An order is open until it is served or cancelled.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Canonical kitchen ordering
// ---------------------------------------------------------------------------

/// Canonical sort for order lists: earliest `requested_delivery_time` first,
/// orders without one after those with one, ties broken by `order_time` and
/// finally by id. The dashboards historically disagreed on this; every view
/// now sorts the same way.
pub fn kitchen_order(a: &Order, b: &Order) -> Ordering {
    match (a.requested_delivery_time, b.requested_delivery_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| match (a.order_time, b.order_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
    .then_with(|| a.id.cmp(&b.id))
}

// ===========================================================================
// Tests
// ===========================================================================
