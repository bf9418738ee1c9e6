//! Ingress adapter: the producer side of the delivery queue.
//!
//! Raw caption lines are queued unchanged; parsing happens in the worker.
//! The queue is unbounded so `enqueue` never waits, which keeps the file
//! watcher's callback cheap.

use tokio::sync::mpsc;

/// Ingress errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    #[error("delivery queue is closed (session stopped)")]
    Closed,
}

/// Cloneable handle for queueing raw caption lines.
///
/// Dropping every handle closes the queue; the worker then drains what is
/// left and finishes.
#[derive(Debug, Clone)]
pub struct Ingress {
    tx: mpsc::UnboundedSender<String>,
}

impl Ingress {
    /// Create a connected ingress handle and the worker's receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Append one raw line to the queue. Never blocks.
    pub fn enqueue(&self, line: impl Into<String>) -> Result<(), IngressError> {
        self.tx.send(line.into()).map_err(|_| IngressError::Closed)
    }

    /// Whether the worker side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_come_out_in_order_and_unchanged() {
        let (ingress, mut rx) = Ingress::channel();
        ingress.enqueue("first").unwrap();
        ingress.enqueue(String::from("not,a,valid,line,at,all")).unwrap();
        ingress.enqueue("third").unwrap();
        drop(ingress);

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("not,a,valid,line,at,all"));
        assert_eq!(rx.recv().await.as_deref(), Some("third"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn enqueue_after_receiver_dropped_is_closed() {
        let (ingress, rx) = Ingress::channel();
        assert!(!ingress.is_closed());
        drop(rx);
        assert!(ingress.is_closed());
        assert_eq!(ingress.enqueue("late"), Err(IngressError::Closed));
    }
}
