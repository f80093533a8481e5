//! Backend and reconciliation-loop configuration.

use std::time::Duration;

/// Default timeout for backend requests (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection to the owner/cook backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, normalized by the client (scheme added, trailing `/api`
    /// stripped).
    pub base_url: String,
    /// Bound on every command round trip; a timeout means the command is
    /// maybe-applied and the next reconciliation tick decides.
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        BackendConfig {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Reconciliation-loop settings. The presets match the polling cadence the
/// individual dashboards always used.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub interval: Duration,
}

impl ReconcileConfig {
    /// Waiter floor dashboard: live view, 5 s.
    pub fn waiter() -> Self {
        ReconcileConfig {
            interval: Duration::from_secs(5),
        }
    }

    /// Cook display: live view, 5 s.
    pub fn cook() -> Self {
        ReconcileConfig {
            interval: Duration::from_secs(5),
        }
    }

    /// Customer pre-order view: lower urgency, 30 s.
    pub fn customer() -> Self {
        ReconcileConfig {
            interval: Duration::from_secs(30),
        }
    }

    /// Owner overview: lowest urgency, 60 s.
    pub fn owner() -> Self {
        ReconcileConfig {
            interval: Duration::from_secs(60),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig::waiter()
    }
}
