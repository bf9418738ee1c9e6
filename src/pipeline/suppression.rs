//! Repeated-failure suppression.
//!
//! Remembers the text of the last failure. A failure is surfaced only when
//! its text differs from that memo; a success clears the memo so the next
//! failure is always surfaced.

/// Last-error memo used to withhold identical consecutive notifications.
#[derive(Debug, Default, Clone)]
pub struct ErrorSuppressor {
    last_error: String,
}

impl ErrorSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A send succeeded.
    pub fn record_success(&mut self) {
        self.last_error.clear();
    }

    /// A send failed with `message`. Returns `true` if it should be surfaced.
    pub fn record_failure(&mut self, message: &str) -> bool {
        if self.last_error == message {
            return false;
        }
        self.last_error = message.to_string();
        true
    }

    /// Text of the last failure, empty after a success.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }
}
