//! floorsync — client-side floor state core for the reserve-and-preorder
//! restaurant dashboards.
//!
//! Every dashboard variant (waiter floor view, cook display, customer
//! pre-order cart) used to re-derive table and order lifecycle rules ad hoc
//! from polled snapshots. This crate centralizes that logic:
//!
//! - [`order`] and [`table`] hold the entity models and pure transition
//!   predicates, with both backend status vocabularies normalized at the
//!   serde boundary.
//! - [`snapshot`] is the composite `{tables, orders}` view fetched per
//!   reconciliation tick, with the derived queries rendering consumes.
//! - [`coordinator`] validates user gestures against the current snapshot
//!   and forwards them to the backend, reporting one of four outcomes.
//! - [`reconcile`] polls the backend on a fixed cadence and swaps fresh
//!   snapshots in, never applying an older fetch over a newer one.
//! - [`backend`] is the HTTP client for the owner/cook services.
//!
//! Rendering, templating, menu catalog storage, and the backend's own
//! persistence stay outside; they interact with this crate only through
//! queries and [`coordinator::Command`]s.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod order;
pub mod reconcile;
pub mod snapshot;
pub mod table;

pub use backend::{Backend, BackendError, HttpBackend};
pub use config::{BackendConfig, ReconcileConfig};
pub use coordinator::{Command, FloorCoordinator, Outcome, PaymentMethod};
pub use error::{FloorError, Precondition};
pub use order::{Order, OrderItem, OrderStatus};
pub use reconcile::{start_reconcile_loop, ReconcileHandle};
pub use snapshot::{FloorSnapshot, StateDto};
pub use table::{ReservationLink, Table, TableStatus};

/// Initialize structured console logging for a dashboard process.
///
/// Honours `RUST_LOG`, defaulting to info with debug detail for this crate.
/// Safe to call once per process; dashboards embedding their own subscriber
/// skip this.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,floorsync=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}
