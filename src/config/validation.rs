//! Settings file checks: unknown-key detection with "did you mean"
//! suggestions, and value checks that go beyond what serde enforces.
//!
//! The raw TOML is first walked as a `toml::Value` and every dotted key is
//! compared against the known layout of `RelayConfig`. Unknown keys only
//! produce warnings so a file written by a newer version still loads.

use std::collections::HashSet;

use super::RelayConfig;

/// A non-fatal settings warning (typo, suspicious value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Keys
// ============================================================================

/// Leaf keys accepted by `config set`, in the order `config show` prints them.
pub const SETTABLE_KEYS: &[&str] = &[
    "delivery.endpoint_base",
    "delivery.include_speaker_name",
    "delivery.language",
    "proxy.url",
    "proxy.user",
    "proxy.password",
    "source.collaboration_file",
    "source.poll_interval_ms",
    "source.clear_on_start",
    "server.addr",
];

/// Every valid dotted key path of `RelayConfig`, tables included.
pub fn known_config_keys() -> HashSet<&'static str> {
    let tables: &[&str] = &["delivery", "proxy", "source", "server"];
    tables.iter().chain(SETTABLE_KEYS).copied().collect()
}

/// Recursively collect the dotted key paths of a TOML tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Suggestions
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
///
/// Ties resolve to the alphabetically first key so the hint is stable.
pub fn suggest_correction<'a, I>(unknown: &str, known: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    known
        .into_iter()
        .map(|k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Warn about every key in `raw_toml` that `RelayConfig` does not know.
///
/// Syntax errors are left to the serde pass and yield no warnings here.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, known.iter().copied()),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Value Checks
// ============================================================================

/// Poll intervals above this are accepted but probably a unit mistake.
const SLOW_POLL_WARNING_MS: u64 = 10_000;

/// Check the delivery-related values needed before any caption is sent.
///
/// Returns hard errors; an empty list means a session may start.
pub fn delivery_errors(config: &RelayConfig) -> Vec<String> {
    let mut errors = Vec::new();

    let endpoint = config.delivery.endpoint_base.trim();
    if endpoint.is_empty() {
        errors.push("delivery.endpoint_base is required (the captioning API token URL)".to_string());
    } else if let Err(e) = check_http_url(endpoint) {
        errors.push(format!("delivery.endpoint_base: {e}"));
    }

    if config.delivery.language.trim().is_empty() {
        errors.push("delivery.language must not be empty".to_string());
    }

    if let Some(url) = config.proxy.url.as_deref().filter(|u| !u.is_empty()) {
        if let Err(e) = check_http_url(url) {
            errors.push(format!("proxy.url: {e}"));
        }
    }

    errors
}

/// Non-fatal oddities worth a log line.
pub fn value_warnings(config: &RelayConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if config.source.poll_interval_ms > SLOW_POLL_WARNING_MS {
        warnings.push(ValidationWarning {
            field: "source.poll_interval_ms".to_string(),
            message: format!(
                "source.poll_interval_ms = {} delays every caption by up to {}s",
                config.source.poll_interval_ms,
                config.source.poll_interval_ms / 1000
            ),
            suggestion: None,
        });
    }

    let has_user = config.proxy.user.as_deref().is_some_and(|u| !u.is_empty());
    if !has_user && config.proxy.password.as_deref().is_some_and(|p| !p.is_empty()) {
        warnings.push(ValidationWarning {
            field: "proxy.password".to_string(),
            message: "proxy.password is set without proxy.user and will be ignored".to_string(),
            suggestion: Some("proxy.user".to_string()),
        });
    }

    warnings
}

fn check_http_url(value: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(value).map_err(|e| format!("'{value}' is not a valid URL ({e})"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{other}', expected http or https")),
    }
}

// ============================================================================
// Tests
// ============================================================================
