//! Caption delivery transport
//!
//! The delivery worker talks to the captioning endpoint through the
//! [`CaptionTransport`] trait. [`HttpTransport`] is the production
//! implementation; tests substitute recording transports.

mod transport;
mod request;

pub use transport::{resolve_proxy_address, HttpTransport};
pub use request::{build_request_url, CaptionRequest};

use std::error::Error as _;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::DeliveryConfig;

/// Something that can deliver one caption request.
///
/// The worker awaits each `send` to completion before dequeuing the next
/// record, so implementations never see overlapping calls.
#[async_trait]
pub trait CaptionTransport: Send + 'static {
    /// Deliver `request`, routing it according to `config`.
    ///
    /// `Ok` means the endpoint accepted the caption (2xx).
    async fn send(
        &mut self,
        request: &CaptionRequest,
        config: &DeliveryConfig,
    ) -> Result<(), DeliveryError>;

    /// Human-readable name for logging.
    fn transport_name(&self) -> &str;
}

/// Delivery errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Connection, TLS, or timeout failure. The URL is stripped so the
    /// message does not vary with the sequence number.
    #[error("request failed")]
    Http(#[source] reqwest::Error),
    #[error("server returned status {0}")]
    Status(StatusCode),
    #[error("invalid proxy settings: {0}")]
    InvalidProxy(String),
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl DeliveryError {
    /// Wrap a reqwest error, dropping the request URL from it.
    pub fn http(error: reqwest::Error) -> Self {
        Self::Http(error.without_url())
    }

    /// Whether the failure was the per-request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Single-line text shown to the operator and compared for suppression.
    ///
    /// The error and its `source()` chain joined with `": "`, skipping a
    /// segment that repeats the one before it.
    pub fn notification_text(&self) -> String {
        let mut segments: Vec<String> = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            let text = err.to_string();
            if segments.last() != Some(&text) {
                segments.push(text);
            }
            source = err.source();
        }
        segments.join(": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_code_and_reason() {
        let err = DeliveryError::Status(StatusCode::UNAUTHORIZED);
        assert_eq!(err.notification_text(), "server returned status 401 Unauthorized");
        assert!(!err.is_timeout());
    }

    #[test]
    fn client_error_has_no_chain() {
        let err = DeliveryError::Client("builder failed".to_string());
        assert_eq!(err.notification_text(), "HTTP client error: builder failed");
    }
}
