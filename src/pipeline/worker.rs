//! Delivery worker: the single consumer of the caption queue.
//!
//! Per line:
//!
//! ```text
//! dequeue -> parse -> (drop if malformed)
//!         -> load live config -> take seq -> format request
//!         -> POST (one attempt, awaited to completion)
//!         -> success: clear error memo, publish last message
//!         -> failure: surface unless identical to the previous failure
//! ```
//!
//! Only one request is ever in flight; the next line is not dequeued until
//! the current attempt has finished. No failure stops the loop.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::suppression::ErrorSuppressor;
use crate::acquisition::parse_caption_line;
use crate::config::defaults::SEQUENCE_START;
use crate::config::SharedDeliveryConfig;
use crate::delivery::{CaptionRequest, CaptionTransport};
use crate::types::{DeliveryFailure, RelayStatus, SessionState, SharedStatus};

// ============================================================================
// Sequence Counter
// ============================================================================

/// Per-attempt sequence number. Starts at 1 and never resets within a worker.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { next: SEQUENCE_START }
    }

    /// Take the number for the next attempt.
    pub fn advance(&mut self) -> u64 {
        let seq = self.next;
        self.next += 1;
        seq
    }

    /// The number the next attempt will carry.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Worker Stats
// ============================================================================

/// Counters returned when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub received: u64,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub dropped: u64,
}

impl WorkerStats {
    fn apply(&self, status: &mut RelayStatus) {
        status.received = self.received;
        status.attempted = self.attempted;
        status.delivered = self.delivered;
        status.failed = self.failed;
        status.suppressed = self.suppressed;
        status.dropped = self.dropped;
    }
}

impl std::fmt::Display for WorkerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} attempted={} delivered={} failed={} suppressed={} dropped={}",
            self.received, self.attempted, self.delivered, self.failed, self.suppressed, self.dropped
        )
    }
}

enum Step {
    Continue,
    Cancelled,
}

// ============================================================================
// Delivery Worker
// ============================================================================

/// Drains the caption queue through a [`CaptionTransport`], one record at a time.
pub struct DeliveryWorker<T: CaptionTransport> {
    rx: mpsc::UnboundedReceiver<String>,
    config: SharedDeliveryConfig,
    transport: T,
    status: SharedStatus,
    failures: mpsc::UnboundedSender<DeliveryFailure>,
    cancel_token: CancellationToken,
    sequence: SequenceCounter,
    suppressor: ErrorSuppressor,
    stats: WorkerStats,
}

impl<T: CaptionTransport> DeliveryWorker<T> {
    pub fn new(
        rx: mpsc::UnboundedReceiver<String>,
        config: SharedDeliveryConfig,
        transport: T,
        status: SharedStatus,
        failures: mpsc::UnboundedSender<DeliveryFailure>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            rx,
            config,
            transport,
            status,
            failures,
            cancel_token,
            sequence: SequenceCounter::new(),
            suppressor: ErrorSuppressor::new(),
            stats: WorkerStats::default(),
        }
    }

    /// Process the queue until cancellation, or until every [`Ingress`]
    /// handle is dropped and the queue is empty.
    ///
    /// On exit the queue is closed, so later enqueues report `Closed`.
    ///
    /// [`Ingress`]: super::Ingress
    pub async fn run(mut self) -> WorkerStats {
        info!(transport = self.transport.transport_name(), "Delivery worker started");
        {
            let mut status = self.status.write().await;
            status.state = SessionState::Running;
            status.next_seq = self.sequence.peek();
        }

        let cancel = self.cancel_token.clone();
        loop {
            let line = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("[DeliveryWorker] Shutdown signal received");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(line) => line,
                    None => {
                        info!("[DeliveryWorker] Queue closed and drained");
                        break;
                    }
                },
            };

            if let Step::Cancelled = self.process_line(&line, &cancel).await {
                info!("[DeliveryWorker] In-flight send aborted by shutdown");
                break;
            }
        }

        self.rx.close();
        {
            let mut status = self.status.write().await;
            self.stats.apply(&mut status);
            status.state = SessionState::Stopped;
        }
        info!(stats = %self.stats, "Delivery worker stopped");
        self.stats
    }

    async fn process_line(&mut self, line: &str, cancel: &CancellationToken) -> Step {
        self.stats.received += 1;

        let record = match parse_caption_line(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.dropped += 1;
                debug!(error = %e, line, "Dropped malformed caption line");
                self.publish(|_| {}).await;
                return Step::Continue;
            }
        };

        // Re-read on every record so edits apply from the next caption on.
        let config = self.config.load();
        let seq = self.sequence.advance();
        let request = CaptionRequest::build(&record, &config, seq);
        self.stats.attempted += 1;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.transport.send(&request, &config) => Some(result),
        };

        let Some(result) = result else {
            self.publish(|_| {}).await;
            return Step::Cancelled;
        };

        match result {
            Ok(()) => {
                self.suppressor.record_success();
                self.stats.delivered += 1;
                debug!(seq, "Caption delivered");

                let last_message = record.status_line();
                self.publish(move |status| {
                    status.last_message = last_message;
                    status.last_error.clear();
                    status.last_delivery_time = Some(chrono::Utc::now());
                })
                .await;
            }
            Err(e) => {
                let message = e.notification_text();
                self.stats.failed += 1;

                if self.suppressor.record_failure(&message) {
                    debug!(seq, error = %message, "Caption delivery failed, notifying owner");
                    let failure = DeliveryFailure {
                        seq,
                        message: message.clone(),
                        display_text: request.display_text.clone(),
                    };
                    if self.failures.send(failure).is_err() {
                        debug!(seq, "No listener for delivery failures");
                    }
                } else {
                    self.stats.suppressed += 1;
                    debug!(seq, error = %message, "Repeated delivery failure suppressed");
                }

                self.publish(move |status| status.last_error = message).await;
            }
        }

        Step::Continue
    }

    /// Mirror counters and the next sequence number into the shared status,
    /// then apply `update`.
    async fn publish<F>(&mut self, update: F)
    where
        F: FnOnce(&mut RelayStatus),
    {
        let mut status = self.status.write().await;
        self.stats.apply(&mut status);
        status.next_seq = self.sequence.peek();
        update(&mut status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::delivery::DeliveryError;
    use crate::pipeline::Ingress;
    use async_trait::async_trait;
    use reqwest::StatusCode;

    /// Fails every request with 401.
    struct Unauthorized {
        seqs: Vec<u64>,
    }

    #[async_trait]
    impl CaptionTransport for Unauthorized {
        async fn send(
            &mut self,
            request: &CaptionRequest,
            _config: &DeliveryConfig,
        ) -> Result<(), DeliveryError> {
            self.seqs.push(request.seq);
            Err(DeliveryError::Status(StatusCode::UNAUTHORIZED))
        }

        fn transport_name(&self) -> &str {
            "unauthorized"
        }
    }

    const LINE: &str = r#""2020-01-01 10:00:00","Alice","Hello","""#;

    #[test]
    fn sequence_starts_at_one() {
        let mut seq = SequenceCounter::new();
        assert_eq!(seq.peek(), 1);
        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);
        assert_eq!(seq.peek(), 3);
    }

    #[tokio::test]
    async fn persistent_failure_is_surfaced_once() {
        let (ingress, rx) = Ingress::channel();
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
        let status = RelayStatus::shared();
        let worker = DeliveryWorker::new(
            rx,
            SharedDeliveryConfig::new(DeliveryConfig::with_endpoint("http://127.0.0.1:9/cc")),
            Unauthorized { seqs: Vec::new() },
            status.clone(),
            failures_tx,
            CancellationToken::new(),
        );

        for _ in 0..3 {
            ingress.enqueue(LINE).unwrap();
        }
        drop(ingress);

        let stats = worker.run().await;
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.suppressed, 2);

        let first = failures_rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.message, "server returned status 401 Unauthorized");
        assert_eq!(first.display_text, "Hello");
        assert!(failures_rx.recv().await.is_none());

        let status = status.read().await;
        assert_eq!(status.state, SessionState::Stopped);
        assert_eq!(status.next_seq, 4);
        assert_eq!(status.last_error, "server returned status 401 Unauthorized");
    }

    #[tokio::test]
    async fn malformed_line_is_counted_not_sent() {
        let (ingress, rx) = Ingress::channel();
        let (failures_tx, _failures_rx) = mpsc::unbounded_channel();
        let worker = DeliveryWorker::new(
            rx,
            SharedDeliveryConfig::new(DeliveryConfig::with_endpoint("http://127.0.0.1:9/cc")),
            Unauthorized { seqs: Vec::new() },
            RelayStatus::shared(),
            failures_tx,
            CancellationToken::new(),
        );

        ingress.enqueue(r#""2020-01-01","Bob","only three""#).unwrap();
        drop(ingress);

        let stats = worker.run().await;
        assert_eq!(stats.received, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.attempted, 0);
    }

    #[tokio::test]
    async fn unquoted_line_never_reaches_transport() {
        let (ingress, rx) = Ingress::channel();
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
        let status = RelayStatus::shared();
        let worker = DeliveryWorker::new(
            rx,
            SharedDeliveryConfig::new(DeliveryConfig::with_endpoint("http://127.0.0.1:9/cc")),
            Unauthorized { seqs: Vec::new() },
            status.clone(),
            failures_tx,
            CancellationToken::new(),
        );

        ingress.enqueue("2020-01-01,Bob,Hi,").unwrap();
        ingress.enqueue(LINE).unwrap();
        drop(ingress);

        let stats = worker.run().await;
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.attempted, 1);

        // Only the quoted line was sent, and it took the first seq.
        let failure = failures_rx.recv().await.unwrap();
        assert_eq!(failure.seq, 1);
        assert_eq!(failure.display_text, "Hello");
        assert_eq!(status.read().await.next_seq, 2);
    }
}
