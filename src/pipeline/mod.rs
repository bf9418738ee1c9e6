//! Caption delivery pipeline
//!
//! ```text
//! watcher / CLI ──enqueue──▶ [ FIFO queue ] ──▶ DeliveryWorker ──POST──▶ endpoint
//!                                                    │
//!                                                    ├──▶ RelayStatus (last message, counters)
//!                                                    └──▶ DeliveryFailure channel (deduplicated)
//! ```
//!
//! GUARANTEE: one consumer, one request in flight, records sent in the order
//! they were enqueued, each attempted at most once.

mod ingress;
mod session;
pub mod suppression;
mod worker;

pub use ingress::{Ingress, IngressError};
pub use session::DeliverySession;
pub use suppression::ErrorSuppressor;
pub use worker::{DeliveryWorker, SequenceCounter, WorkerStats};
