//! Backend API client.
//!
//! The coordinator talks to the owner/cook services only through the
//! [`Backend`] trait; [`HttpBackend`] is the production implementation over
//! reqwest. Exact routes follow the waiter dashboard's API surface. All
//! calls are fire-and-wait with a bounded timeout: a timed-out command is
//! *maybe applied* and the next reconciliation tick tells the truth.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

use crate::config::BackendConfig;
use crate::order::OrderItem;
use crate::snapshot::StateDto;

/// Timeout used specifically for the lightweight connectivity probe.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level result of one backend call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend answered with a non-success status. The reason carries
    /// the backend's own message verbatim where one was provided.
    #[error("{reason} (HTTP {status})")]
    Rejected { status: u16, reason: String },

    /// The request never completed; whether the command was applied is
    /// unknown.
    #[error("{0}")]
    Connectivity(String),

    /// The backend answered 2xx but the body was not what the contract
    /// promises.
    #[error("invalid response from backend: {0}")]
    InvalidResponse(String),
}

/// Convert a `reqwest::Error` into an operator-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into an operator-friendly fallback message,
/// used when the backend body carries no message of its own.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        404 => "Backend endpoint not found".to_string(),
        409 => "Request conflicts with the backend's current state".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment (routes below add it back)
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub table_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<i64>,
    pub items: Vec<OrderItem>,
    pub total_price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub reservation_id: i64,
    pub amount: f64,
    /// Card payments carry the processor token; cash carries none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_received: Option<f64>,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Everything the coordinator needs from the owner/cook services.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the full `{tables, orders}` state. Read-only, safe to retry.
    async fn fetch_state(&self) -> Result<StateDto, BackendError>;

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<(), BackendError>;

    /// Kitchen-side transition. Idempotent on the backend: re-invoking on an
    /// already-ready order no-ops or rejects recoverably.
    async fn mark_order_ready(&self, order_id: i64) -> Result<(), BackendError>;

    async fn mark_order_served(&self, order_id: i64) -> Result<(), BackendError>;

    async fn clear_table(&self, table_id: i64) -> Result<(), BackendError>;

    /// Rejects with a conflict while a ready order still references the
    /// table.
    async fn finish_table(&self, table_id: i64) -> Result<(), BackendError>;

    async fn check_in(&self, reservation_id: i64) -> Result<(), BackendError>;

    async fn create_walk_in(&self, table_id: i64, guests: u32) -> Result<(), BackendError>;

    async fn pay_cash(&self, req: &PaymentRequest) -> Result<(), BackendError>;

    async fn pay_card(&self, req: &PaymentRequest) -> Result<(), BackendError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Result of a connectivity probe, consumed by the dashboards' online badge.
#[derive(Debug, Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Connectivity(format!("Failed to create HTTP client: {e}")))?;
        Ok(HttpBackend {
            base_url: normalize_base_url(&config.base_url),
            client,
        })
    }

    /// Probe `GET /api/health` with a short timeout and measure latency.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let health_url = format!("{}/api/health", self.base_url);
        let start = Instant::now();

        let resp = match self
            .client
            .get(&health_url)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(&self.base_url, &e)),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        if resp.status().is_success() {
            info!(latency_ms = latency, "connectivity test passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_error(resp.status())),
            }
        }
    }

    /// POST `path` with an optional JSON body, mapping non-success statuses
    /// to `Rejected` with the backend's own message preserved.
    async fn post(&self, path: &str, body: Option<&Value>) -> Result<(), BackendError> {
        let full_url = format!("{}{path}", self.base_url);

        let mut req = self.client.post(&full_url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BackendError::Connectivity(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();

        if status.is_success() {
            return Ok(());
        }

        // Preserve the backend's message verbatim where one exists; the
        // services answer either a JSON {error|message} object or plain text.
        let body_text = resp.text().await.unwrap_or_default();
        let reason = if let Ok(json) = serde_json::from_str::<Value>(&body_text) {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| status_error(status))
        } else if !body_text.trim().is_empty() {
            body_text.trim().to_string()
        } else {
            status_error(status)
        };

        Err(BackendError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_state(&self) -> Result<StateDto, BackendError> {
        let url = format!("{}/api/waiter/state", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BackendError::Connectivity(friendly_error(&self.base_url, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                reason: status_error(status),
            });
        }

        resp.json::<StateDto>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<(), BackendError> {
        let body = serde_json::to_value(req)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        self.post("/api/orders", Some(&body)).await
    }

    async fn mark_order_ready(&self, order_id: i64) -> Result<(), BackendError> {
        self.post(&format!("/api/orders/{order_id}/ready"), None).await
    }

    async fn mark_order_served(&self, order_id: i64) -> Result<(), BackendError> {
        self.post(&format!("/api/orders/{order_id}/served"), None).await
    }

    async fn clear_table(&self, table_id: i64) -> Result<(), BackendError> {
        self.post(&format!("/api/tables/{table_id}/clear"), None).await
    }

    async fn finish_table(&self, table_id: i64) -> Result<(), BackendError> {
        self.post(&format!("/api/tables/{table_id}/finish"), None).await
    }

    async fn check_in(&self, reservation_id: i64) -> Result<(), BackendError> {
        self.post(&format!("/api/reservations/{reservation_id}/checkin"), None)
            .await
    }

    async fn create_walk_in(&self, table_id: i64, guests: u32) -> Result<(), BackendError> {
        let body = serde_json::json!({
            "tableId": table_id,
            "numberOfGuests": guests,
        });
        self.post("/api/reservations/walkin", Some(&body)).await
    }

    async fn pay_cash(&self, req: &PaymentRequest) -> Result<(), BackendError> {
        let body = serde_json::to_value(req)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        self.post("/api/payments/cash", Some(&body)).await
    }

    async fn pay_card(&self, req: &PaymentRequest) -> Result<(), BackendError> {
        let body = serde_json::to_value(req)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        self.post("/api/payments/credit-card", Some(&body)).await
    }
}

// ===========================================================================
// Tests
// ===========================================================================
