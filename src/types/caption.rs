//! Caption record and outbound message formatting

use chrono::NaiveDateTime;
use serde::Serialize;

/// Display format used for the timestamp in status messages.
const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One caption line parsed from the collaboration file.
///
/// Transient: created when the delivery worker dequeues a line and discarded
/// after a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionRecord {
    /// When the utterance was recognised
    pub timestamp: NaiveDateTime,
    /// Speaker label as written by the speech-to-text tool
    pub speaker_name: String,
    /// Recognised text in the spoken language
    pub original_text: String,
    /// Machine translation, empty when translation is off
    pub translated_text: String,
}

impl CaptionRecord {
    /// Text shown to viewers: the translation when present, else the original.
    pub fn display_text(&self) -> &str {
        if self.translated_text.is_empty() {
            &self.original_text
        } else {
            &self.translated_text
        }
    }

    /// Build the plain-text body POSTed to the captioning endpoint.
    ///
    /// With `include_speaker_name` the body is `[speaker]\n<text>\n`,
    /// otherwise `<text>\n`.
    pub fn format_body(&self, include_speaker_name: bool) -> String {
        let text = self.display_text();
        if include_speaker_name {
            format!("[{}]\n{}\n", self.speaker_name, text)
        } else {
            format!("{text}\n")
        }
    }

    /// Single-line summary used for the "last processed message" status.
    pub fn status_line(&self) -> String {
        format!(
            "{} {}",
            self.timestamp.format(STATUS_TIME_FORMAT),
            self.display_text()
        )
    }
}
