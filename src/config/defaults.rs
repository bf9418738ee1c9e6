//! System-wide default constants.
//!
//! Centralises the fixed values of the delivery protocol and the polling
//! cadences, grouped by subsystem.

// ============================================================================
// Delivery
// ============================================================================

/// Per-request timeout for caption POSTs (seconds).
pub const DELIVERY_TIMEOUT_SECS: u64 = 30;

/// First sequence number sent as `seq=`.
pub const SEQUENCE_START: u64 = 1;

/// Language tag sent as `lang=` when none is configured.
pub const DEFAULT_LANGUAGE: &str = "ja-JP";

/// Content type of the caption body.
pub const CAPTION_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

// ============================================================================
// Collaboration File
// ============================================================================

/// How often the collaboration file is checked for new lines (milliseconds).
pub const COLLAB_POLL_INTERVAL_MS: u64 = 500;

/// File name suggested when no collaboration file is configured.
pub const DEFAULT_COLLAB_FILE_NAME: &str = "Output.csv";

// ============================================================================
// Config File
// ============================================================================

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "caption_relay.toml";

/// Environment variable holding an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "CAPTION_RELAY_CONFIG";

/// Environment variable overriding `delivery.endpoint_base`.
pub const ENDPOINT_ENV: &str = "CAPTION_RELAY_ENDPOINT";

/// Environment variable overriding `source.collaboration_file`.
pub const COLLAB_FILE_ENV: &str = "CAPTION_RELAY_FILE";

/// Interval between config file mtime checks (seconds).
pub const CONFIG_POLL_INTERVAL_SECS: u64 = 2;

/// Debounce after a config change is detected (milliseconds).
pub const CONFIG_DEBOUNCE_MS: u64 = 500;

// ============================================================================
// Status API
// ============================================================================

/// Environment variable listing extra CORS origins for the status API.
pub const CORS_ORIGINS_ENV: &str = "CAPTION_RELAY_CORS_ORIGINS";
