//! Relay status and failure notifications
//!
//! `RelayStatus` is wrapped in `Arc<RwLock<>>` and shared between the delivery
//! worker (writer), the owning session and the status API (readers).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::defaults::SEQUENCE_START;

/// Shared handle to the relay status.
pub type SharedStatus = Arc<RwLock<RelayStatus>>;

// ============================================================================
// Session State
// ============================================================================

/// Lifecycle of a delivery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// Created, worker not yet running
    #[default]
    Idle,
    /// Worker is draining the queue
    Running,
    /// Worker has exited (cancelled or queue closed)
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::Stopped => write!(f, "STOPPED"),
        }
    }
}

// ============================================================================
// Relay Status
// ============================================================================

/// Observable status surface of a delivery session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStatus {
    /// Current session state
    pub state: SessionState,

    /// Session start (serialized as uptime by the API)
    #[serde(skip, default = "Instant::now")]
    pub started: Instant,

    /// `"<timestamp> <display text>"` of the last successfully delivered caption
    pub last_message: String,

    /// Message text of the most recent failure, empty after a success
    pub last_error: String,

    /// Sequence number the next attempt will carry
    pub next_seq: u64,

    /// Lines taken off the queue
    pub received: u64,

    /// Send attempts (one per parsed record)
    pub attempted: u64,

    /// Attempts answered with a 2xx status
    pub delivered: u64,

    /// Attempts that failed (network error, timeout, non-2xx)
    pub failed: u64,

    /// Failures whose notification was withheld as a repeat
    pub suppressed: u64,

    /// Malformed lines dropped before sending
    pub dropped: u64,

    /// Wall-clock time of the last successful delivery
    pub last_delivery_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            started: Instant::now(),
            last_message: String::new(),
            last_error: String::new(),
            next_seq: SEQUENCE_START,
            received: 0,
            attempted: 0,
            delivered: 0,
            failed: 0,
            suppressed: 0,
            dropped: 0,
            last_delivery_time: None,
        }
    }
}

impl RelayStatus {
    /// Create a shared status handle with default values.
    pub fn shared() -> SharedStatus {
        Arc::new(RwLock::new(Self::default()))
    }
}

// ============================================================================
// Failure Notification
// ============================================================================

/// A send failure surfaced to the owner of the session.
///
/// Raised only when the failure text differs from the previous failure, so a
/// persistently broken endpoint yields one notification instead of one per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Sequence number carried by the failed attempt
    pub seq: u64,
    /// Raw failure message
    pub message: String,
    /// Caption text that was not delivered
    pub display_text: String,
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "caption #{} not delivered: {}", self.seq, self.message)
    }
}
