//! Delivery session: one queue, one worker task, one cancellation token.
//!
//! Each `start` builds everything fresh, so a stopped session can be
//! followed by a new one without leftovers from the previous worker.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{DeliveryWorker, Ingress, IngressError, WorkerStats};
use crate::config::SharedDeliveryConfig;
use crate::delivery::CaptionTransport;
use crate::types::{DeliveryFailure, RelayStatus, SharedStatus};

/// A running delivery worker and the handles to feed and observe it.
#[derive(Debug)]
pub struct DeliverySession {
    ingress: Ingress,
    status: SharedStatus,
    config: SharedDeliveryConfig,
    cancel_token: CancellationToken,
    handle: JoinHandle<WorkerStats>,
}

impl DeliverySession {
    /// Spawn a worker reading `config` live and sending through `transport`.
    ///
    /// Returns the session and the receiver of surfaced delivery failures.
    /// Cancelling `cancel_token` stops the worker; pass a child token to
    /// keep the session's lifetime independent of its parent.
    pub fn start<T: CaptionTransport>(
        config: SharedDeliveryConfig,
        transport: T,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<DeliveryFailure>) {
        let (ingress, rx) = Ingress::channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let status = RelayStatus::shared();

        let worker = DeliveryWorker::new(
            rx,
            config.clone(),
            transport,
            status.clone(),
            failures_tx,
            cancel_token.clone(),
        );
        let handle = tokio::spawn(worker.run());
        info!("Delivery session started");

        let session = Self {
            ingress,
            status,
            config,
            cancel_token,
            handle,
        };
        (session, failures_rx)
    }

    /// A producer handle for this session's queue.
    pub fn ingress(&self) -> Ingress {
        self.ingress.clone()
    }

    /// Queue one raw caption line.
    pub fn enqueue(&self, line: impl Into<String>) -> Result<(), IngressError> {
        self.ingress.enqueue(line)
    }

    /// Shared status written by the worker.
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// Live delivery config read by the worker.
    pub fn config(&self) -> &SharedDeliveryConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Whether the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the worker and wait for it. Queued lines not yet taken are discarded.
    pub async fn stop(self) -> Result<WorkerStats, tokio::task::JoinError> {
        self.cancel_token.cancel();
        let stats = self.handle.await?;
        info!(%stats, "Delivery session stopped");
        Ok(stats)
    }

    /// Close this session's producer handle and wait until the worker has
    /// processed every queued line.
    ///
    /// Returns once all other [`Ingress`] clones are dropped too.
    pub async fn finish(self) -> Result<WorkerStats, tokio::task::JoinError> {
        drop(self.ingress);
        let stats = self.handle.await?;
        info!(%stats, "Delivery session finished");
        Ok(stats)
    }
}
