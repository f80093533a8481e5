//! Table entity model.
//!
//! A table cycles `Empty → Reserved → Occupied → AwaitingClear → Empty`.
//! The predicates here are pure checks over the current snapshot; the
//! coordinator consults them before issuing any mutating command, even
//! though the backend independently re-checks.

use serde::{Deserialize, Serialize};

use crate::error::FloorError;
use crate::order::{Order, OrderStatus};

// ---------------------------------------------------------------------------
// Status + reservation link
// ---------------------------------------------------------------------------

/// Occupancy status of a table, normalized from both backend vocabularies
/// (owner API `AVAILABLE`/`RESERVED`/`OCCUPIED`/`CLEANING`, waiter dashboard
/// `LEER`/`RESERVIERT`/`BELEGT`/`ABSERVIEREN`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TableStatus {
    Empty,
    Reserved,
    Occupied,
    AwaitingClear,
    Unknown(String),
}

impl TableStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" | "EMPTY" | "LEER" => TableStatus::Empty,
            "RESERVED" | "RESERVIERT" => TableStatus::Reserved,
            "OCCUPIED" | "BELEGT" => TableStatus::Occupied,
            "CLEANING" | "AWAITING_CLEAR" | "ABSERVIEREN" => TableStatus::AwaitingClear,
            _ => TableStatus::Unknown(raw.trim().to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            TableStatus::Empty => "AVAILABLE",
            TableStatus::Reserved => "RESERVED",
            TableStatus::Occupied => "OCCUPIED",
            TableStatus::AwaitingClear => "CLEANING",
            TableStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for TableStatus {
    fn from(raw: String) -> Self {
        TableStatus::parse(&raw)
    }
}

impl From<TableStatus> for String {
    fn from(status: TableStatus) -> Self {
        status.as_wire().to_string()
    }
}

/// Reservation linkage of a table. Replaces the duck-typed
/// `currentReservationId` presence checks scattered through the dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum ReservationLink {
    None,
    Linked(i64),
}

impl ReservationLink {
    pub fn reservation_id(&self) -> Option<i64> {
        match self {
            ReservationLink::None => None,
            ReservationLink::Linked(id) => Some(*id),
        }
    }
}

impl Default for ReservationLink {
    fn default() -> Self {
        ReservationLink::None
    }
}

impl From<Option<i64>> for ReservationLink {
    fn from(id: Option<i64>) -> Self {
        match id {
            Some(id) => ReservationLink::Linked(id),
            None => ReservationLink::None,
        }
    }
}

impl From<ReservationLink> for Option<i64> {
    fn from(link: ReservationLink) -> Self {
        link.reservation_id()
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Read-mostly projection of a backend table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    /// Seating limit, used only to validate walk-in guest counts.
    #[serde(default, alias = "seats")]
    pub capacity: Option<u32>,
    pub status: TableStatus,
    #[serde(default, rename = "currentReservationId")]
    pub reservation_link: ReservationLink,
}

impl Table {
    /// Display name, falling back to "Tisch {id}" like the dashboards do.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Tisch {}", self.id),
        }
    }

    /// Walk-ins seat directly at an empty table.
    pub fn can_accept_walk_in(&self) -> bool {
        self.status == TableStatus::Empty
    }

    /// Check-in is possible iff the table is reserved and linked to its
    /// reservation. A reserved table without a link is a backend data bug,
    /// reported as `MissingReservationLink` instead of a silent `false`.
    pub fn can_check_in(&self) -> Result<bool, FloorError> {
        match (&self.status, self.reservation_link) {
            (TableStatus::Reserved, ReservationLink::Linked(_)) => Ok(true),
            (TableStatus::Reserved, ReservationLink::None) => {
                Err(FloorError::MissingReservationLink { table_id: self.id })
            }
            _ => Ok(false),
        }
    }

    pub fn can_take_order(&self) -> bool {
        self.status == TableStatus::Occupied
    }

    /// Payment may be requested once every order at the table is served
    /// (or cancelled), i.e. the open set is empty.
    pub fn can_request_payment(&self, open_orders: &[&Order]) -> bool {
        self.status == TableStatus::Occupied && open_orders.is_empty()
    }

    /// The "collect finished food" gesture: every open order is ready and
    /// there is at least one. Distinct from payment-driven clearing.
    pub fn can_clear_for_cleaning(&self, open_orders: &[&Order]) -> bool {
        self.status == TableStatus::Occupied
            && !open_orders.is_empty()
            && open_orders.iter().all(|o| o.status == OrderStatus::Ready)
    }

    /// Leaving `AwaitingClear` requires the explicit finished-cleaning
    /// command; walk-in and check-in never touch such a table.
    pub fn can_finish_cleaning(&self) -> bool {
        self.status == TableStatus::AwaitingClear
    }
}

// ===========================================================================
// Tests
// ===========================================================================
