//! The composite floor snapshot and its derived queries.
//!
//! One snapshot is the full `{tables, orders}` view fetched from the backend
//! at a single reconciliation tick. Ingestion normalizes statuses (done by
//! the entity models' serde), resolves preorder table linkage through
//! reservations, and stamps the snapshot with its issue-order sequence so a
//! late-arriving older fetch can never overwrite a newer one.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::FloorError;
use crate::order::{kitchen_order, Order, OrderStatus};
use crate::table::{ReservationLink, Table, TableStatus};

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Body of `GET /api/waiter/state`. Both lists are tolerant of omission so
/// a partially-migrated backend still produces a usable snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateDto {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Authoritative client-side view of the floor at one point in time.
#[derive(Debug, Clone, Default)]
pub struct FloorSnapshot {
    pub tables: BTreeMap<i64, Table>,
    pub orders: BTreeMap<i64, Order>,
    seq: u64,
    fetched_at: Option<DateTime<Utc>>,
}

impl FloorSnapshot {
    /// Build a snapshot from a fetched state body.
    ///
    /// `seq` is assigned by the reconciliation loop in fetch-issue order and
    /// decides which of two competing snapshots is newer. Preorders that
    /// carry only a reservation id get their `table_id` resolved through the
    /// reservation linkage, mirroring what the waiter service did on every
    /// refresh.
    pub fn from_state(state: StateDto, seq: u64, fetched_at: DateTime<Utc>) -> Self {
        let tables: BTreeMap<i64, Table> = state.tables.into_iter().map(|t| (t.id, t)).collect();

        let reservation_to_table: HashMap<i64, i64> = tables
            .values()
            .filter_map(|t| t.reservation_link.reservation_id().map(|r| (r, t.id)))
            .collect();

        let mut orders = BTreeMap::new();
        for mut order in state.orders {
            if order.table_id <= 0 {
                match order.reservation_id.and_then(|r| reservation_to_table.get(&r)) {
                    Some(table_id) => order.table_id = *table_id,
                    None => warn!(
                        order_id = order.id,
                        reservation_id = ?order.reservation_id,
                        "order has no resolvable table"
                    ),
                }
            }
            orders.insert(order.id, order);
        }

        let snapshot = FloorSnapshot {
            tables,
            orders,
            seq,
            fetched_at: Some(fetched_at),
        };
        for issue in snapshot.integrity_issues() {
            warn!(%issue, "snapshot integrity issue");
        }
        snapshot
    }

    /// Issue-order sequence of the fetch this snapshot came from.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    // -----------------------------------------------------------------------
    // Derived queries
    // -----------------------------------------------------------------------

    pub fn table(&self, table_id: i64) -> Result<&Table, FloorError> {
        self.tables
            .get(&table_id)
            .ok_or(FloorError::UnknownTable { table_id })
    }

    pub fn order(&self, order_id: i64) -> Result<&Order, FloorError> {
        self.orders
            .get(&order_id)
            .ok_or(FloorError::UnknownOrder { order_id })
    }

    /// All orders belonging to a table's current seating: referencing the
    /// table directly, or logged against its current reservation.
    fn orders_for_table<'a>(&'a self, table: &'a Table) -> impl Iterator<Item = &'a Order> {
        let reservation = table.reservation_link.reservation_id();
        self.orders.values().filter(move |o| {
            o.table_id == table.id
                || (reservation.is_some() && o.reservation_id == reservation)
        })
    }

    /// Open (not served, not cancelled) orders for a table, in canonical
    /// kitchen order.
    pub fn open_orders_for_table(&self, table_id: i64) -> Vec<&Order> {
        let Ok(table) = self.table(table_id) else {
            return Vec::new();
        };
        let mut open: Vec<&Order> = self.orders_for_table(table).filter(|o| o.is_open()).collect();
        open.sort_by(|a, b| kitchen_order(a, b));
        open
    }

    /// Amount due for a table's current seating, full precision.
    ///
    /// Reservation-scoped orders take precedence so preorders logged against
    /// the reservation are neither dropped after a table reassignment nor
    /// double-counted; if the reservation scope sums to zero the table-direct
    /// orders are used instead. Cancelled orders never bill; served ones do.
    pub fn total_due_for_table(&self, table_id: i64) -> f64 {
        let Ok(table) = self.table(table_id) else {
            return 0.0;
        };

        let billable = |o: &&Order| o.status != OrderStatus::Cancelled;

        if let Some(reservation) = table.reservation_link.reservation_id() {
            let scoped: f64 = self
                .orders
                .values()
                .filter(|o| o.reservation_id == Some(reservation))
                .filter(billable)
                .map(|o| o.total())
                .sum();
            if scoped > 0.0 {
                return scoped;
            }
        }

        self.orders
            .values()
            .filter(|o| o.table_id == table.id)
            .filter(billable)
            .map(|o| o.total())
            .sum()
    }

    /// Every open order on the floor, in canonical kitchen order. This is
    /// the cook display's work queue.
    pub fn kitchen_queue(&self) -> Vec<&Order> {
        let mut open: Vec<&Order> = self.orders.values().filter(|o| o.is_open()).collect();
        open.sort_by(|a, b| kitchen_order(a, b));
        open
    }

    /// Detectable backend data bugs in this snapshot, currently reserved
    /// tables without a reservation link. Surfaced to the operator, never
    /// silently swallowed.
    pub fn integrity_issues(&self) -> Vec<FloorError> {
        self.tables
            .values()
            .filter(|t| {
                t.status == TableStatus::Reserved && t.reservation_link == ReservationLink::None
            })
            .map(|t| FloorError::MissingReservationLink { table_id: t.id })
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderItem;
    use chrono::TimeZone;

    fn table(id: i64, status: TableStatus, link: ReservationLink) -> Table {
        Table {
            id,
            name: None,
            capacity: Some(4),
            status,
            reservation_link: link,
        }
    }

    fn order(id: i64, table_id: i64, status: OrderStatus, total: Option<f64>) -> Order {
        Order {
            id,
            table_id,
            reservation_id: None,
            items: vec![],
            total_price: total,
            status,
            requested_delivery_time: None,
            order_time: None,
            extra_info: None,
        }
    }

    fn snapshot(tables: Vec<Table>, orders: Vec<Order>) -> FloorSnapshot {
        FloorSnapshot::from_state(StateDto { tables, orders }, 1, Utc::now())
    }

    #[test]
    fn test_open_orders_excludes_terminal_statuses() {
        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::None)],
            vec![
                order(1, 5, OrderStatus::Ready, Some(10.0)),
                order(2, 5, OrderStatus::Served, Some(5.0)),
                order(3, 5, OrderStatus::Cancelled, Some(7.0)),
                order(4, 6, OrderStatus::Ready, Some(3.0)),
            ],
        );
        let open = snap.open_orders_for_table(5);
        assert_eq!(open.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_reservation_scoped_orders_follow_the_table() {
        // Preorder logged against reservation 42 before any table existed.
        let mut preorder = order(1, 0, OrderStatus::InKitchen, Some(20.0));
        preorder.reservation_id = Some(42);

        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::Linked(42))],
            vec![preorder],
        );

        // Ingestion resolved the table through the reservation linkage.
        assert_eq!(snap.order(1).unwrap().table_id, 5);
        assert_eq!(snap.open_orders_for_table(5).len(), 1);
        assert_eq!(snap.total_due_for_table(5), 20.0);
    }

    #[test]
    fn test_total_due_prefers_reservation_scope_without_double_counting() {
        let mut scoped = order(1, 5, OrderStatus::Served, Some(20.0));
        scoped.reservation_id = Some(42);
        // Stale order from a previous seating, table-scoped only.
        let stale = order(2, 5, OrderStatus::Served, Some(99.0));

        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::Linked(42))],
            vec![scoped, stale],
        );
        assert_eq!(snap.total_due_for_table(5), 20.0);
    }

    #[test]
    fn test_total_due_falls_back_to_item_lines() {
        // Backend omitted totalPrice; the per-order item fallback kicks in
        // rather than billing zero.
        let mut o = order(9, 5, OrderStatus::Served, Some(0.0));
        o.reservation_id = Some(42);
        o.items = vec![OrderItem {
            name: "Pizza".into(),
            quantity: 1,
            unit_price: 12.50,
        }];

        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::Linked(42))],
            vec![o],
        );
        assert_eq!(snap.total_due_for_table(5), 12.50);
    }

    #[test]
    fn test_total_due_excludes_cancelled() {
        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::None)],
            vec![
                order(1, 5, OrderStatus::Served, Some(10.0)),
                order(2, 5, OrderStatus::Cancelled, Some(50.0)),
            ],
        );
        assert_eq!(snap.total_due_for_table(5), 10.0);
    }

    #[test]
    fn test_kitchen_queue_is_open_orders_in_canonical_order() {
        let mut timed = order(7, 5, OrderStatus::Pending, None);
        timed.requested_delivery_time =
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());

        let snap = snapshot(
            vec![table(5, TableStatus::Occupied, ReservationLink::None)],
            vec![
                order(1, 5, OrderStatus::InKitchen, None),
                order(2, 5, OrderStatus::Served, None),
                timed,
            ],
        );
        // Timed preorder first, then the untimed open order; served excluded.
        assert_eq!(
            snap.kitchen_queue().iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![7, 1]
        );
    }

    #[test]
    fn test_integrity_issue_for_reserved_table_without_link() {
        let snap = snapshot(
            vec![
                table(1, TableStatus::Reserved, ReservationLink::None),
                table(2, TableStatus::Reserved, ReservationLink::Linked(7)),
            ],
            vec![],
        );
        assert_eq!(
            snap.integrity_issues(),
            vec![FloorError::MissingReservationLink { table_id: 1 }]
        );
    }

    #[test]
    fn test_state_dto_tolerates_missing_lists() {
        let state: StateDto = serde_json::from_str(r#"{ "tables": [] }"#).expect("parse");
        let snap = FloorSnapshot::from_state(state, 3, Utc::now());
        assert!(snap.orders.is_empty());
        assert_eq!(snap.seq(), 3);
    }
}
