//! Outbound caption request construction

use crate::config::DeliveryConfig;
use crate::types::CaptionRecord;

/// One fully formatted POST, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRequest {
    /// Sequence number carried in the `seq` query parameter
    pub seq: u64,
    pub url: String,
    /// Plain-text body, newline terminated
    pub body: String,
    /// The record's effective display text, kept for failure reports
    pub display_text: String,
}

impl CaptionRequest {
    /// Format `record` under the current `config` as attempt number `seq`.
    pub fn build(record: &CaptionRecord, config: &DeliveryConfig, seq: u64) -> Self {
        Self {
            seq,
            url: build_request_url(&config.endpoint_base, seq, &config.language),
            body: record.format_body(config.include_speaker_name),
            display_text: record.display_text().to_string(),
        }
    }
}

/// Append `seq=<n>&lang=<code>` to the endpoint.
///
/// Endpoints usually carry their token in a query string already, in which
/// case the parameters are joined with `&`.
pub fn build_request_url(endpoint_base: &str, seq: u64, language: &str) -> String {
    let separator = if endpoint_base.contains('?') {
        if endpoint_base.ends_with('?') || endpoint_base.ends_with('&') {
            ""
        } else {
            "&"
        }
    } else {
        "?"
    };
    format!("{endpoint_base}{separator}seq={seq}&lang={language}")
}
