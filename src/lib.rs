//! caption-relay: ordered live-caption delivery
//!
//! Relays caption lines written by a speech-to-text tool into a shared CSV
//! collaboration file to a remote captioning endpoint over HTTP, one line at
//! a time, in arrival order.
//!
//! ## Architecture
//!
//! - **Ingress**: non-blocking enqueue of raw caption lines into a FIFO queue
//! - **Delivery Worker**: single consumer that parses, formats and POSTs each
//!   record, with duplicate-error suppression
//! - **Caption Transport**: HTTP client seam (`reqwest`) used by the worker
//! - **Config**: TOML settings store with hot reload into the live delivery config
//! - **Acquisition**: caption line parser and collaboration file tailer
//! - **API**: optional read-only status endpoints

pub mod acquisition;
pub mod api;
pub mod config;
pub mod delivery;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{DeliveryConfig, RelayConfig, SharedDeliveryConfig};

// Re-export commonly used types
pub use types::{CaptionRecord, DeliveryFailure, RelayStatus, SessionState};

// Re-export pipeline components
pub use pipeline::{DeliverySession, DeliveryWorker, Ingress, IngressError, WorkerStats};

// Re-export transport
pub use delivery::{CaptionRequest, CaptionTransport, DeliveryError, HttpTransport};
