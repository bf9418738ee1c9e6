//! Caption line parser
//!
//! Decodes one collaboration-file line of the form
//!
//! ```text
//! "<timestamp>","<speaker>","<original text>","<translated text>"
//! ```
//!
//! Commas are separators only outside double quotes, so caption text may
//! contain commas. Every field must be quoted. A doubled quote (`""`) inside
//! a field is read as one quote.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::CaptionRecord;

/// Number of fields in a caption line.
pub const CAPTION_FIELD_COUNT: usize = 4;

/// Date-time layouts accepted for the timestamp field, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// Date-only layouts, interpreted as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Caption line parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 4 fields, found {found}")]
    FieldCount { found: usize },
    #[error("field {index} is not enclosed in double quotes")]
    Unquoted { index: usize },
    #[error("unparseable timestamp '{value}'")]
    Timestamp { value: String },
}

/// Parse one raw caption line into a [`CaptionRecord`].
pub fn parse_caption_line(line: &str) -> Result<CaptionRecord, ParseError> {
    let line = line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n']);

    let fields = split_quoted_fields(line);
    if fields.len() != CAPTION_FIELD_COUNT {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }

    let field = |index: usize| unquote(fields[index]).ok_or(ParseError::Unquoted { index });

    let raw_timestamp = field(0)?;
    let timestamp = parse_timestamp(&raw_timestamp).ok_or(ParseError::Timestamp {
        value: raw_timestamp.clone(),
    })?;

    Ok(CaptionRecord {
        timestamp,
        speaker_name: field(1)?,
        original_text: field(2)?,
        translated_text: field(3)?,
    })
}

/// Split a line on commas that are not inside double quotes.
///
/// Fields keep their quotes; see [`unquote`].
pub fn split_quoted_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(CAPTION_FIELD_COUNT);
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(&line[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);

    fields
}

/// Strip the enclosing quotes of a field and collapse doubled quotes.
///
/// Returns `None` when the trimmed field is not wrapped in double quotes.
pub fn unquote(field: &str) -> Option<String> {
    let inner = field.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.replace("\"\"", "\""))
}

/// Parse a caption timestamp.
///
/// Accepts RFC 3339 (offset dropped, local wall time kept), ISO-like and
/// slash-separated date-times, and bare dates.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
