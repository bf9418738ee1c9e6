//! Relay settings file
//!
//! The persisted key/value settings of the relay: where to send captions,
//! how to reach the endpoint, and which collaboration file to watch. Every
//! field has a default, so an empty or missing file is a valid starting
//! point for `config set`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::defaults::{
    COLLAB_FILE_ENV, COLLAB_POLL_INTERVAL_MS, CONFIG_PATH_ENV, DEFAULT_COLLAB_FILE_NAME,
    DEFAULT_CONFIG_FILE, DEFAULT_LANGUAGE, ENDPOINT_ENV,
};
use super::delivery::DeliveryConfig;
use super::validation;

/// Root of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub delivery: DeliverySettings,
    pub proxy: ProxySettings,
    pub source: SourceSettings,
    pub server: ServerSettings,
}

/// `[delivery]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Captioning endpoint URL, token included
    pub endpoint_base: String,
    pub include_speaker_name: bool,
    pub language: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            endpoint_base: String::new(),
            include_speaker_name: false,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// `[proxy]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// `[source]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// CSV file the speech-to-text tool appends to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration_file: Option<PathBuf>,
    pub poll_interval_ms: u64,
    /// Delete the collaboration file before a session starts watching it
    pub clear_on_start: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            collaboration_file: None,
            poll_interval_ms: COLLAB_POLL_INTERVAL_MS,
            clear_on_start: true,
        }
    }
}

/// `[server]`. The status API only runs when `addr` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
}

impl RelayConfig {
    /// Settings file location:
    /// 1. the explicit `--config` path
    /// 2. `$CAPTION_RELAY_CONFIG`
    /// 3. `./caption_relay.toml`
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load from a specific TOML file.
    ///
    /// Unknown keys are logged as warnings; values are not validated here
    /// because `config show` and `config set` must work on incomplete files.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in validation::validate_unknown_keys(&contents) {
            warn!(path = %path.display(), "{}", w);
        }

        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded relay config");
            Ok(config)
        } else {
            info!(path = %path.display(), "No config file found, using built-in defaults");
            Ok(Self::default())
        }
    }

    /// Apply `CAPTION_RELAY_ENDPOINT` and `CAPTION_RELAY_FILE`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty(ENDPOINT_ENV) {
            info!(var = ENDPOINT_ENV, "Endpoint overridden from environment");
            self.delivery.endpoint_base = endpoint;
        }
        if let Some(file) = non_empty(COLLAB_FILE_ENV) {
            info!(var = COLLAB_FILE_ENV, file = %file, "Collaboration file overridden from environment");
            self.source.collaboration_file = Some(PathBuf::from(file));
        }
        self
    }

    /// Check what a delivery session needs: a usable endpoint and language.
    pub fn validate_delivery(&self) -> Result<(), ConfigError> {
        let errors = validation::delivery_errors(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Check everything `run` needs: delivery settings plus a collaboration
    /// file and a positive poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = validation::delivery_errors(self);

        if self.collaboration_file().is_none() {
            errors.push(format!(
                "source.collaboration_file is required (e.g. \"{DEFAULT_COLLAB_FILE_NAME}\" next to the speech-to-text tool)"
            ));
        }
        if self.source.poll_interval_ms == 0 {
            errors.push("source.poll_interval_ms must be > 0".to_string());
        }

        for w in validation::value_warnings(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Configured collaboration file, ignoring an empty path.
    pub fn collaboration_file(&self) -> Option<&Path> {
        self.source
            .collaboration_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The live-delivery view of these settings.
    pub fn delivery_config(&self) -> DeliveryConfig {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        DeliveryConfig {
            endpoint_base: self.delivery.endpoint_base.trim().to_string(),
            include_speaker_name: self.delivery.include_speaker_name,
            language: self.delivery.language.trim().to_string(),
            proxy_url: non_empty(&self.proxy.url),
            proxy_user: non_empty(&self.proxy.user),
            proxy_password: self.proxy.password.clone(),
        }
    }

    /// Copy with the proxy password masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.proxy.password.is_some() {
            copy.proxy.password = Some("***".to_string());
        }
        copy
    }

    /// Set one dotted key from its string form.
    ///
    /// Booleans and integers are parsed; an empty value clears an optional key.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match key {
            "delivery.endpoint_base" => self.delivery.endpoint_base = value.trim().to_string(),
            "delivery.include_speaker_name" => {
                self.delivery.include_speaker_name = parse_bool(key, value)?;
            }
            "delivery.language" => {
                if value.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: "must not be empty".to_string(),
                    });
                }
                self.delivery.language = value.trim().to_string();
            }
            "proxy.url" => self.proxy.url = optional(value.trim()),
            "proxy.user" => self.proxy.user = optional(value),
            "proxy.password" => self.proxy.password = optional(value),
            "source.collaboration_file" => {
                self.source.collaboration_file = optional(value.trim()).map(PathBuf::from);
            }
            "source.poll_interval_ms" => {
                self.source.poll_interval_ms = match value.trim().parse::<u64>() {
                    Ok(ms) if ms > 0 => ms,
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: format!("expected a positive integer, got '{value}'"),
                        })
                    }
                };
            }
            "source.clear_on_start" => self.source.clear_on_start = parse_bool(key, value)?,
            "server.addr" => self.server.addr = optional(value.trim()),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                    suggestion: validation::suggest_correction(
                        key,
                        validation::SETTABLE_KEYS.iter().copied(),
                    ),
                })
            }
        }
        Ok(())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the settings back, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Relay config saved");
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got '{value}'"),
        }),
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
    UnknownKey {
        key: String,
        suggestion: Option<String>,
    },
    InvalidValue {
        key: String,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            Self::Serialize(e) => write!(f, "Config serialization error: {e}"),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
            Self::UnknownKey { key, suggestion } => {
                write!(f, "Unknown config key '{key}'")?;
                if let Some(s) = suggestion {
                    write!(f, " (did you mean '{s}'?)")?;
                }
                Ok(())
            }
            Self::InvalidValue { key, message } => write!(f, "Invalid value for '{key}': {message}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Parse(_, e) => Some(e),
            Self::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
