//! Floor State Coordinator.
//!
//! Owns the authoritative in-memory snapshot, answers derived queries for
//! rendering, and turns user gestures into validated backend commands. The
//! client never merges: `replace_snapshot` swaps the whole view atomically,
//! and commands are advisory-validated-then-fire-and-wait. True consistency
//! is the backend's job; the coordinator's job is to never issue a command
//! its own (possibly stale) view would obviously reject.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::backend::{Backend, BackendError, CreateOrderRequest, PaymentRequest};
use crate::error::{FloorError, Precondition};
use crate::order::{Order, OrderItem, OrderStatus};
use crate::snapshot::FloorSnapshot;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Commands + outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Card,
}

/// A user gesture from one of the dashboards.
#[derive(Debug, Clone)]
pub enum Command {
    WalkIn {
        table_id: i64,
        guests: u32,
    },
    CheckIn {
        reservation_id: i64,
    },
    CreateOrder {
        table_id: i64,
        reservation_id: Option<i64>,
        items: Vec<OrderItem>,
        total_price: f64,
    },
    MarkOrderReady {
        order_id: i64,
    },
    MarkOrderServed {
        order_id: i64,
    },
    ClearForCleaning {
        table_id: i64,
    },
    FinishCleaning {
        table_id: i64,
    },
    RequestPayment {
        table_id: i64,
        method: PaymentMethod,
        amount: f64,
        cash_received: Option<f64>,
    },
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::WalkIn { .. } => "walk_in",
            Command::CheckIn { .. } => "check_in",
            Command::CreateOrder { .. } => "create_order",
            Command::MarkOrderReady { .. } => "mark_order_ready",
            Command::MarkOrderServed { .. } => "mark_order_served",
            Command::ClearForCleaning { .. } => "clear_for_cleaning",
            Command::FinishCleaning { .. } => "finish_cleaning",
            Command::RequestPayment { .. } => "request_payment",
        }
    }
}

/// What became of an issued command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Backend confirmed. The snapshot is left untouched on purpose: the
    /// next reconciliation tick reflects the effect, so a backend that
    /// quietly rejected cannot be masked by an optimistic local mutation.
    Accepted,
    /// Backend refused; `reason` carries its message verbatim. No retry.
    Rejected { reason: String },
    /// A client-side gate refused before any network call was made.
    PreconditionFailed(Precondition),
    /// Transport failure; the command is maybe-applied. Rely on the next
    /// reconciliation tick for truth, never blindly re-send.
    ConnectivityError { detail: String },
}

/// Backend call planned while the snapshot lock was held. Parameters are
/// fully resolved here so no lock spans an await point.
enum Planned {
    WalkIn {
        table_id: i64,
        guests: u32,
    },
    CheckIn {
        reservation_id: i64,
    },
    CreateOrder(CreateOrderRequest),
    MarkOrderReady {
        order_id: i64,
    },
    MarkOrderServed {
        order_id: i64,
    },
    ClearTable {
        table_id: i64,
    },
    FinishTable {
        table_id: i64,
    },
    Payment {
        method: PaymentMethod,
        request: PaymentRequest,
    },
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct FloorCoordinator {
    backend: Arc<dyn Backend>,
    snapshot: Mutex<FloorSnapshot>,
    stale: AtomicBool,
}

impl FloorCoordinator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        FloorCoordinator {
            backend,
            snapshot: Mutex::new(FloorSnapshot::default()),
            stale: AtomicBool::new(false),
        }
    }

    pub(crate) fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// The snapshot holds plain state; a panic mid-update cannot leave it
    /// half-written, so a poisoned lock is recovered rather than propagated.
    fn lock_snapshot(&self) -> MutexGuard<'_, FloorSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Snapshot replacement
    // -----------------------------------------------------------------------

    /// Atomically swap in a freshly fetched snapshot.
    ///
    /// Applies only if the candidate was issued no earlier than the current
    /// one (`seq` ordering), so two fetches whose responses arrive inverted
    /// by latency still converge on the later-issued state. Returns whether
    /// the swap happened.
    pub fn replace_snapshot(&self, snapshot: FloorSnapshot) -> bool {
        let mut current = self.lock_snapshot();
        if snapshot.seq() < current.seq() {
            warn!(
                incoming_seq = snapshot.seq(),
                current_seq = current.seq(),
                "discarding stale snapshot that arrived out of order"
            );
            return false;
        }
        info!(
            seq = snapshot.seq(),
            tables = snapshot.tables.len(),
            orders = snapshot.orders.len(),
            "snapshot replaced"
        );
        *current = snapshot;
        drop(current);
        self.stale.store(false, Ordering::SeqCst);
        true
    }

    /// True when the last reconciliation tick failed and the view is the
    /// prior (possibly outdated) snapshot.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Clone of the current snapshot for rendering.
    pub fn snapshot(&self) -> FloorSnapshot {
        self.lock_snapshot().clone()
    }

    pub fn tables(&self) -> Vec<Table> {
        self.lock_snapshot().tables.values().cloned().collect()
    }

    pub fn open_orders_for_table(&self, table_id: i64) -> Vec<Order> {
        self.lock_snapshot()
            .open_orders_for_table(table_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_due_for_table(&self, table_id: i64) -> f64 {
        self.lock_snapshot().total_due_for_table(table_id)
    }

    /// The cook display's work queue: every open order in canonical order.
    pub fn kitchen_queue(&self) -> Vec<Order> {
        self.lock_snapshot()
            .kitchen_queue()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Whether the table is ready for guest check-in; surfaces
    /// `MissingReservationLink` for a reserved table without linkage.
    pub fn check_in_readiness(&self, table_id: i64) -> Result<bool, FloorError> {
        self.lock_snapshot().table(table_id)?.can_check_in()
    }

    pub fn integrity_issues(&self) -> Vec<FloorError> {
        self.lock_snapshot().integrity_issues()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Validate a command against the current snapshot and, if every gate
    /// passes, forward it to the backend.
    pub async fn issue_command(&self, command: Command) -> Outcome {
        let kind = command.kind();
        let planned = {
            let snapshot = self.lock_snapshot();
            match plan(&snapshot, command) {
                Ok(planned) => planned,
                Err(precondition) => {
                    info!(command = kind, %precondition, "command refused client-side");
                    return Outcome::PreconditionFailed(precondition);
                }
            }
        };

        let result = self.dispatch(planned).await;
        match result {
            Ok(()) => {
                info!(command = kind, "command accepted by backend");
                Outcome::Accepted
            }
            Err(BackendError::Rejected { status, reason }) => {
                warn!(command = kind, status, reason = %reason, "command rejected by backend");
                Outcome::Rejected { reason }
            }
            Err(err) => {
                warn!(command = kind, error = %err, "command outcome unknown (transport failure)");
                Outcome::ConnectivityError {
                    detail: err.to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, planned: Planned) -> Result<(), BackendError> {
        match planned {
            Planned::WalkIn { table_id, guests } => {
                self.backend.create_walk_in(table_id, guests).await
            }
            Planned::CheckIn { reservation_id } => self.backend.check_in(reservation_id).await,
            Planned::CreateOrder(request) => self.backend.create_order(&request).await,
            Planned::MarkOrderReady { order_id } => self.backend.mark_order_ready(order_id).await,
            Planned::MarkOrderServed { order_id } => {
                self.backend.mark_order_served(order_id).await
            }
            Planned::ClearTable { table_id } => self.backend.clear_table(table_id).await,
            Planned::FinishTable { table_id } => self.backend.finish_table(table_id).await,
            Planned::Payment { method, request } => match method {
                PaymentMethod::Cash => self.backend.pay_cash(&request).await,
                PaymentMethod::Card => self.backend.pay_card(&request).await,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Precondition gates
// ---------------------------------------------------------------------------

/// Check every client-side gate for `command` against `snapshot` and resolve
/// the backend call parameters. Pure except for one advisory `warn!`.
fn plan(snapshot: &FloorSnapshot, command: Command) -> Result<Planned, Precondition> {
    match command {
        Command::WalkIn { table_id, guests } => {
            let table = snapshot.table(table_id).map_err(|_| Precondition::TableExists)?;
            if !table.can_accept_walk_in() {
                return Err(Precondition::CanAcceptWalkIn);
            }
            if guests == 0 || table.capacity.is_some_and(|cap| guests > cap) {
                return Err(Precondition::GuestsWithinCapacity);
            }
            Ok(Planned::WalkIn { table_id, guests })
        }

        Command::CheckIn { reservation_id } => {
            let table = snapshot
                .tables
                .values()
                .find(|t| t.reservation_link.reservation_id() == Some(reservation_id))
                .ok_or(Precondition::ReservationLinked)?;
            // Linked, so can_check_in can only answer yes or "wrong status".
            match table.can_check_in() {
                Ok(true) => Ok(Planned::CheckIn { reservation_id }),
                _ => Err(Precondition::CanCheckIn),
            }
        }

        Command::CreateOrder {
            table_id,
            reservation_id,
            items,
            total_price,
        } => {
            let table = snapshot.table(table_id).map_err(|_| Precondition::TableExists)?;
            if !table.can_take_order() {
                return Err(Precondition::CanTakeOrder);
            }
            if items.is_empty() || items.iter().any(|i| i.quantity == 0) {
                return Err(Precondition::OrderHasItems);
            }
            if total_price <= 0.0 {
                return Err(Precondition::PositiveAmount);
            }
            Ok(Planned::CreateOrder(CreateOrderRequest {
                table_id,
                reservation_id: reservation_id.or(table.reservation_link.reservation_id()),
                items,
                total_price,
            }))
        }

        Command::MarkOrderReady { order_id } => {
            let order = snapshot.order(order_id).map_err(|_| Precondition::OrderExists)?;
            match order.status {
                OrderStatus::Pending | OrderStatus::InKitchen => {
                    Ok(Planned::MarkOrderReady { order_id })
                }
                _ => Err(Precondition::OrderInPreparation),
            }
        }

        Command::MarkOrderServed { order_id } => {
            let order = snapshot.order(order_id).map_err(|_| Precondition::OrderExists)?;
            if order.status != OrderStatus::Ready {
                return Err(Precondition::OrderReady);
            }
            Ok(Planned::MarkOrderServed { order_id })
        }

        Command::ClearForCleaning { table_id } => {
            let table = snapshot.table(table_id).map_err(|_| Precondition::TableExists)?;
            let open = snapshot.open_orders_for_table(table_id);
            if !table.can_clear_for_cleaning(&open) {
                return Err(Precondition::CanClearForCleaning);
            }
            Ok(Planned::ClearTable { table_id })
        }

        Command::FinishCleaning { table_id } => {
            let table = snapshot.table(table_id).map_err(|_| Precondition::TableExists)?;
            if !table.can_finish_cleaning() {
                return Err(Precondition::CanFinishCleaning);
            }
            Ok(Planned::FinishTable { table_id })
        }

        Command::RequestPayment {
            table_id,
            method,
            amount,
            cash_received,
        } => {
            let table = snapshot.table(table_id).map_err(|_| Precondition::TableExists)?;
            let open = snapshot.open_orders_for_table(table_id);
            if !table.can_request_payment(&open) {
                return Err(Precondition::CanRequestPayment);
            }
            if amount <= 0.0 {
                return Err(Precondition::PositiveAmount);
            }
            if method == PaymentMethod::Cash {
                if let Some(received) = cash_received {
                    if received + 0.005 < amount {
                        return Err(Precondition::CashCoversAmount);
                    }
                }
            }
            let reservation_id = table
                .reservation_link
                .reservation_id()
                .ok_or(Precondition::ReservationLinked)?;

            let due = snapshot.total_due_for_table(table_id);
            if (due - amount).abs() > 0.01 {
                warn!(
                    table_id,
                    amount,
                    due,
                    "payment amount differs from computed total due"
                );
            }

            Ok(Planned::Payment {
                method,
                request: PaymentRequest {
                    reservation_id,
                    amount,
                    token: None,
                    cash_received,
                },
            })
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
