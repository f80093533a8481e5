//! Reconciliation loop.
//!
//! A single spawned task performs one full-state fetch per tick and swaps
//! the result into the coordinator. Because the task awaits each fetch
//! before sleeping again, ticks can never overlap; a fetch outliving its
//! sibling is impossible within one loop, and the snapshot `seq` guard in
//! the coordinator covers the remaining race with manual refreshes. On a
//! failed tick the prior snapshot stays untouched and the view is flagged
//! stale until a later tick succeeds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::coordinator::FloorCoordinator;
use crate::snapshot::FloorSnapshot;

/// Handle to a running reconciliation loop. Dropping the handle does not
/// stop the loop; teardown is the explicit [`ReconcileHandle::stop`].
#[derive(Clone)]
pub struct ReconcileHandle {
    coordinator: Arc<FloorCoordinator>,
    is_running: Arc<AtomicBool>,
    seq: Arc<AtomicU64>,
    last_refresh: Arc<Mutex<Option<DateTime<Utc>>>>,
}

/// Start the reconciliation loop. Fetches once immediately (the dashboards
/// render on load, not after the first interval), then keeps polling at the
/// configured cadence until stopped.
pub fn start_reconcile_loop(
    coordinator: Arc<FloorCoordinator>,
    config: ReconcileConfig,
) -> ReconcileHandle {
    let handle = ReconcileHandle {
        coordinator,
        is_running: Arc::new(AtomicBool::new(true)),
        seq: Arc::new(AtomicU64::new(0)),
        last_refresh: Arc::new(Mutex::new(None)),
    };

    let loop_handle = handle.clone();
    let interval = config.interval;
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "reconcile loop started");

        loop {
            if !loop_handle.is_running() {
                info!("reconcile loop stopped");
                break;
            }

            loop_handle.tick().await;

            tokio::time::sleep(interval).await;
        }
    });

    handle
}

impl ReconcileHandle {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop the loop. An in-flight fetch completes but no longer mutates
    /// the coordinator.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// When the last successful tick finished, if any.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one immediate tick outside the timer cadence (manual refresh
    /// button). The snapshot `seq` guard keeps this safe alongside the
    /// loop's own fetches. Returns whether a fresh snapshot was applied.
    pub async fn refresh_now(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.tick().await
    }

    /// One fetch-and-replace cycle.
    async fn tick(&self) -> bool {
        // Sequence is assigned when the fetch is issued, so issue order
        // (not response arrival order) decides which snapshot is newer.
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        match self.coordinator.backend().fetch_state().await {
            Ok(state) => {
                if !self.is_running() {
                    // Torn down while the fetch was in flight.
                    return false;
                }
                let snapshot = FloorSnapshot::from_state(state, seq, Utc::now());
                let applied = self.coordinator.replace_snapshot(snapshot);
                if applied {
                    *self
                        .last_refresh
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                }
                applied
            }
            Err(err) => {
                warn!(seq, error = %err, "reconcile tick failed; keeping previous snapshot");
                self.coordinator.mark_stale();
                false
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendError, CreateOrderRequest, PaymentRequest};
    use crate::snapshot::StateDto;
    use crate::table::{ReservationLink, Table, TableStatus};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Backend fake whose `fetch_state` replays a script of responses,
    /// repeating the last one once the script runs out.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<StateDto, BackendError>>>,
        fetches: AtomicU64,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<StateDto, BackendError>>) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                script: Mutex::new(script.into()),
                fetches: AtomicU64::new(0),
            })
        }

        fn fetch_count(&self) -> u64 {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    fn state_with_table(status: TableStatus) -> StateDto {
        StateDto {
            tables: vec![Table {
                id: 5,
                name: None,
                capacity: Some(4),
                status,
                reservation_link: ReservationLink::None,
            }],
            orders: vec![],
        }
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedBackend {
        async fn fetch_state(&self) -> Result<StateDto, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap_or_else(|| Ok(StateDto::default()))
            }
        }
        async fn create_order(&self, _: &CreateOrderRequest) -> Result<(), BackendError> {
            Ok(())
        }
        async fn mark_order_ready(&self, _: i64) -> Result<(), BackendError> {
            Ok(())
        }
        async fn mark_order_served(&self, _: i64) -> Result<(), BackendError> {
            Ok(())
        }
        async fn clear_table(&self, _: i64) -> Result<(), BackendError> {
            Ok(())
        }
        async fn finish_table(&self, _: i64) -> Result<(), BackendError> {
            Ok(())
        }
        async fn check_in(&self, _: i64) -> Result<(), BackendError> {
            Ok(())
        }
        async fn create_walk_in(&self, _: i64, _: u32) -> Result<(), BackendError> {
            Ok(())
        }
        async fn pay_cash(&self, _: &PaymentRequest) -> Result<(), BackendError> {
            Ok(())
        }
        async fn pay_card(&self, _: &PaymentRequest) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn handle_without_loop(coordinator: Arc<FloorCoordinator>) -> ReconcileHandle {
        ReconcileHandle {
            coordinator,
            is_running: Arc::new(AtomicBool::new(true)),
            seq: Arc::new(AtomicU64::new(0)),
            last_refresh: Arc::new(Mutex::new(None)),
        }
    }

    #[tokio::test]
    async fn test_tick_applies_snapshot_and_records_refresh() {
        let backend = ScriptedBackend::new(vec![Ok(state_with_table(TableStatus::Occupied))]);
        let coordinator = Arc::new(FloorCoordinator::new(backend));
        let handle = handle_without_loop(coordinator.clone());

        assert!(handle.refresh_now().await);
        assert_eq!(
            coordinator.snapshot().table(5).unwrap().status,
            TableStatus::Occupied
        );
        assert!(handle.last_refresh().is_some());
        assert!(!coordinator.is_stale());
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_snapshot_and_flags_stale() {
        let backend = ScriptedBackend::new(vec![
            Ok(state_with_table(TableStatus::Occupied)),
            Err(BackendError::Connectivity("Connection timed out".into())),
            Ok(state_with_table(TableStatus::AwaitingClear)),
        ]);
        let coordinator = Arc::new(FloorCoordinator::new(backend));
        let handle = handle_without_loop(coordinator.clone());

        assert!(handle.refresh_now().await);

        // Failure: previous snapshot untouched, view flagged stale.
        assert!(!handle.refresh_now().await);
        assert!(coordinator.is_stale());
        assert_eq!(
            coordinator.snapshot().table(5).unwrap().status,
            TableStatus::Occupied
        );

        // Next success self-heals.
        assert!(handle.refresh_now().await);
        assert!(!coordinator.is_stale());
        assert_eq!(
            coordinator.snapshot().table(5).unwrap().status,
            TableStatus::AwaitingClear
        );
    }

    #[tokio::test]
    async fn test_stopped_handle_never_mutates() {
        let backend = ScriptedBackend::new(vec![Ok(state_with_table(TableStatus::Occupied))]);
        let coordinator = Arc::new(FloorCoordinator::new(backend.clone()));
        let handle = handle_without_loop(coordinator.clone());

        handle.stop();
        assert!(!handle.refresh_now().await);
        assert!(coordinator.snapshot().tables.is_empty());
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_at_interval_and_stops() {
        let backend = ScriptedBackend::new(vec![Ok(state_with_table(TableStatus::Occupied))]);
        let coordinator = Arc::new(FloorCoordinator::new(backend.clone()));

        let handle = start_reconcile_loop(
            coordinator.clone(),
            ReconcileConfig {
                interval: Duration::from_secs(5),
            },
        );

        // Paused time auto-advances whenever the runtime is idle, so a few
        // ticks elapse almost immediately.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(backend.fetch_count() >= 3);
        assert_eq!(
            coordinator.snapshot().table(5).unwrap().status,
            TableStatus::Occupied
        );

        handle.stop();
        let fetched = backend.fetch_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        // At most the already-sleeping iteration wakes once more; after
        // that the loop has exited.
        assert!(backend.fetch_count() <= fetched + 1);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_manual_refresh_cannot_roll_back_loop_snapshot() {
        // Two handles over one coordinator simulate a manual refresh racing
        // the loop: the later-issued fetch wins regardless of arrival order.
        let backend = ScriptedBackend::new(vec![
            Ok(state_with_table(TableStatus::Occupied)),
            Ok(state_with_table(TableStatus::AwaitingClear)),
        ]);
        let coordinator = Arc::new(FloorCoordinator::new(backend));
        let handle = handle_without_loop(coordinator.clone());

        assert!(handle.refresh_now().await);
        assert!(handle.refresh_now().await);

        // A replay of the older fetch's snapshot (seq 1) must be discarded.
        let stale = FloorSnapshot::from_state(state_with_table(TableStatus::Occupied), 1, Utc::now());
        assert!(!coordinator.replace_snapshot(stale));
        assert_eq!(
            coordinator.snapshot().table(5).unwrap().status,
            TableStatus::AwaitingClear
        );
    }
}
