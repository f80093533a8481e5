//! Error taxonomy for the floor coordinator.
//!
//! Nothing in this crate is fatal: every error leaves the coordinator on its
//! last-known-good snapshot, and the next reconciliation tick self-heals the
//! view. The variants here separate the three recovery strategies: re-render
//! (`PreconditionFailed` via [`Precondition`]), show the backend's reason
//! (`Rejected`), or wait for the next poll (`Connectivity`).

use thiserror::Error;

/// Client-side precondition consulted before a command is allowed to reach
/// the backend. Carried inside `Outcome::PreconditionFailed` so the caller
/// can tell the operator exactly which gate refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The referenced table exists in the current snapshot.
    TableExists,
    /// The referenced order exists in the current snapshot.
    OrderExists,
    /// Walk-ins only seat at an `Empty` table.
    CanAcceptWalkIn,
    /// Walk-in guest count is at least 1 and within table capacity.
    GuestsWithinCapacity,
    /// A reserved table is linked to the reservation being acted on.
    ReservationLinked,
    /// Check-in requires the linked table to still be reserved.
    CanCheckIn,
    /// Orders are only taken at an `Occupied` table.
    CanTakeOrder,
    /// A new order carries at least one item, every quantity >= 1.
    OrderHasItems,
    /// Monetary amounts must be positive.
    PositiveAmount,
    /// Cash received must cover the amount charged.
    CashCoversAmount,
    /// Only orders still in preparation can be marked ready.
    OrderInPreparation,
    /// Only `Ready` orders can be marked served.
    OrderReady,
    /// Collecting finished food requires ready orders and nothing else open.
    CanClearForCleaning,
    /// Payment requires an occupied table with no open orders left.
    CanRequestPayment,
    /// Only a table awaiting clearing can be released by the cleaning crew.
    CanFinishCleaning,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Precondition::TableExists => "table is not part of the current floor state",
            Precondition::OrderExists => "order is not part of the current floor state",
            Precondition::CanAcceptWalkIn => "table is not empty",
            Precondition::GuestsWithinCapacity => "guest count exceeds table capacity",
            Precondition::ReservationLinked => "no table is linked to this reservation",
            Precondition::CanCheckIn => "table is not awaiting check-in",
            Precondition::CanTakeOrder => "table is not occupied",
            Precondition::OrderHasItems => "order has no valid item lines",
            Precondition::PositiveAmount => "amount must be positive",
            Precondition::CashCoversAmount => "cash received does not cover the amount",
            Precondition::OrderInPreparation => "order is no longer in preparation",
            Precondition::OrderReady => "order is not ready to serve",
            Precondition::CanClearForCleaning => "table has no collectable ready orders",
            Precondition::CanRequestPayment => "table still has unserved orders",
            Precondition::CanFinishCleaning => "table is not awaiting clearing",
        };
        f.write_str(msg)
    }
}

/// Snapshot-consistency errors surfaced by queries.
///
/// These indicate backend data problems (not client bugs) and must stay
/// visible to the operator rather than being silently swallowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FloorError {
    /// A table is `Reserved` but carries no reservation link. Check-in is
    /// impossible until the backend repairs the linkage.
    #[error("table {table_id} is reserved but has no reservation linked")]
    MissingReservationLink { table_id: i64 },

    /// A query referenced a table id absent from the snapshot.
    #[error("unknown table {table_id}")]
    UnknownTable { table_id: i64 },

    /// A query referenced an order id absent from the snapshot.
    #[error("unknown order {order_id}")]
    UnknownOrder { order_id: i64 },
}
