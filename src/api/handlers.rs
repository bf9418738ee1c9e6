//! API route handlers
//!
//! Read-only views of the delivery session:
//! - liveness
//! - last delivered caption, last error, and delivery counters

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{mask_endpoint, SharedDeliveryConfig};
use crate::types::{SessionState, SharedStatus};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Debug, Clone)]
pub struct StatusState {
    /// Status written by the delivery worker
    pub status: SharedStatus,
    /// Live delivery config, for showing where captions go
    pub config: SharedDeliveryConfig,
}

impl StatusState {
    pub fn new(status: SharedStatus, config: SharedDeliveryConfig) -> Self {
        Self { status, config }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/v1/health
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
    pub uptime_seconds: u64,
    /// Endpoint with its token masked
    pub endpoint: String,
    pub language: String,
    pub include_speaker_name: bool,
    pub last_message: String,
    pub last_error: String,
    pub next_seq: u64,
    pub received: u64,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub dropped: u64,
    pub last_delivery_time: Option<DateTime<Utc>>,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    let config = state.config.load();
    let status = state.status.read().await;

    Json(StatusResponse {
        state: status.state,
        uptime_seconds: status.started.elapsed().as_secs(),
        endpoint: mask_endpoint(&config.endpoint_base),
        language: config.language.clone(),
        include_speaker_name: config.include_speaker_name,
        last_message: status.last_message.clone(),
        last_error: status.last_error.clone(),
        next_seq: status.next_seq,
        received: status.received,
        attempted: status.attempted,
        delivered: status.delivered,
        failed: status.failed,
        suppressed: status.suppressed,
        dropped: status.dropped,
        last_delivery_time: status.last_delivery_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::types::RelayStatus;

    #[tokio::test]
    async fn status_masks_endpoint_token() {
        let state = StatusState::new(
            RelayStatus::shared(),
            SharedDeliveryConfig::new(DeliveryConfig::with_endpoint(
                "https://cc.example.com/closedcaption?id=1&signature=secret",
            )),
        );
        {
            let mut status = state.status.write().await;
            status.state = SessionState::Running;
            status.delivered = 2;
            status.last_message = "2020-01-01 10:00:00 こんにちは".to_string();
        }

        let Json(response) = get_status(State(state)).await;
        assert_eq!(response.endpoint, "https://cc.example.com/closedcaption?***");
        assert_eq!(response.state, SessionState::Running);
        assert_eq!(response.delivered, 2);
        assert_eq!(response.next_seq, 1);
        assert_eq!(response.language, "ja-JP");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let Json(response) = get_health().await;
        assert_eq!(response.status, "ok");
    }
}
