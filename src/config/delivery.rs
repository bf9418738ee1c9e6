//! Live delivery configuration
//!
//! `DeliveryConfig` is the subset of settings the delivery worker reads on
//! every iteration. It is published through [`SharedDeliveryConfig`], an
//! atomically swappable snapshot: the owner (CLI, config watcher) stores a
//! new value at any time and the worker picks it up on the next record.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use super::defaults::DEFAULT_LANGUAGE;

/// Settings read by the delivery worker at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Captioning endpoint URL including its token, e.g. the API token URL
    pub endpoint_base: String,
    /// Prefix each caption with `[speaker]` on its own line
    pub include_speaker_name: bool,
    /// Language tag sent as `lang=`
    pub language: String,
    /// Explicit proxy address; the environment proxy is used when unset
    pub proxy_url: Option<String>,
    /// Proxy basic-auth user
    pub proxy_user: Option<String>,
    /// Proxy basic-auth password
    pub proxy_password: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint_base: String::new(),
            include_speaker_name: false,
            language: DEFAULT_LANGUAGE.to_string(),
            proxy_url: None,
            proxy_user: None,
            proxy_password: None,
        }
    }
}

impl DeliveryConfig {
    /// Config pointing at `endpoint_base` with everything else defaulted.
    pub fn with_endpoint(endpoint_base: impl Into<String>) -> Self {
        Self {
            endpoint_base: endpoint_base.into(),
            ..Self::default()
        }
    }

    /// Proxy credentials, when a non-empty user is configured.
    pub fn proxy_credentials(&self) -> Option<(&str, &str)> {
        let user = self.proxy_user.as_deref().filter(|u| !u.is_empty())?;
        Some((user, self.proxy_password.as_deref().unwrap_or("")))
    }

    /// Whether requests should go through a proxy at all.
    pub fn uses_proxy(&self) -> bool {
        self.proxy_credentials().is_some()
            || self.proxy_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// List the fields that differ between `self` (old) and `other` (new).
    ///
    /// Secrets are masked in the reported values.
    pub fn diff(&self, other: &Self) -> Vec<ConfigChange> {
        let mut changes = Vec::new();

        if self.endpoint_base != other.endpoint_base {
            changes.push(ConfigChange::new(
                "delivery.endpoint_base",
                mask_endpoint(&self.endpoint_base),
                mask_endpoint(&other.endpoint_base),
            ));
        }
        if self.include_speaker_name != other.include_speaker_name {
            changes.push(ConfigChange::new(
                "delivery.include_speaker_name",
                self.include_speaker_name.to_string(),
                other.include_speaker_name.to_string(),
            ));
        }
        if self.language != other.language {
            changes.push(ConfigChange::new(
                "delivery.language",
                self.language.clone(),
                other.language.clone(),
            ));
        }
        if self.proxy_url != other.proxy_url {
            changes.push(ConfigChange::new(
                "proxy.url",
                display_opt(self.proxy_url.as_deref()),
                display_opt(other.proxy_url.as_deref()),
            ));
        }
        if self.proxy_user != other.proxy_user {
            changes.push(ConfigChange::new(
                "proxy.user",
                display_opt(self.proxy_user.as_deref()),
                display_opt(other.proxy_user.as_deref()),
            ));
        }
        if self.proxy_password != other.proxy_password {
            changes.push(ConfigChange::new("proxy.password", "***", "***"));
        }

        changes
    }
}

/// One changed setting, as reported by a config reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: String,
    pub old: String,
    pub new: String,
}

impl ConfigChange {
    fn new(key: &str, old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            old: old.into(),
            new: new.into(),
        }
    }
}

impl std::fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.key, self.old, self.new)
    }
}

/// Hide the query string of an endpoint URL; it carries the API token.
pub fn mask_endpoint(endpoint: &str) -> String {
    match endpoint.split_once('?') {
        Some((base, _)) => format!("{base}?***"),
        None => endpoint.to_string(),
    }
}

fn display_opt(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

// ============================================================================
// Shared Handle
// ============================================================================

/// Cloneable handle to the live [`DeliveryConfig`].
///
/// Readers get a consistent snapshot without locking; writers replace the
/// whole snapshot.
#[derive(Debug, Clone)]
pub struct SharedDeliveryConfig {
    inner: Arc<ArcSwap<DeliveryConfig>>,
}

impl SharedDeliveryConfig {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<DeliveryConfig> {
        self.inner.load_full()
    }

    /// Replace the snapshot, returning the changes relative to the previous one.
    pub fn store(&self, config: DeliveryConfig) -> Vec<ConfigChange> {
        let next = Arc::new(config);
        let previous = self.inner.swap(Arc::clone(&next));
        previous.diff(&next)
    }

    /// Apply an in-place edit to a copy of the current snapshot and publish it.
    pub fn update<F>(&self, mut edit: F)
    where
        F: FnMut(&mut DeliveryConfig),
    {
        self.inner.rcu(|current| {
            let mut next = DeliveryConfig::clone(current);
            edit(&mut next);
            next
        });
    }
}

impl Default for SharedDeliveryConfig {
    fn default() -> Self {
        Self::new(DeliveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_japanese() {
        assert_eq!(DeliveryConfig::default().language, "ja-JP");
    }

    #[test]
    fn proxy_needs_non_empty_user() {
        let mut cfg = DeliveryConfig::with_endpoint("http://x");
        assert!(!cfg.uses_proxy());

        cfg.proxy_user = Some(String::new());
        assert!(cfg.proxy_credentials().is_none());

        cfg.proxy_user = Some("alice".to_string());
        assert_eq!(cfg.proxy_credentials(), Some(("alice", "")));
        assert!(cfg.uses_proxy());
    }

    #[test]
    fn store_reports_changes_and_masks_token() {
        let shared = SharedDeliveryConfig::new(DeliveryConfig::with_endpoint(
            "https://cc.example.com/closedcaption?id=1&signature=abc",
        ));

        let changes = shared.store(DeliveryConfig {
            include_speaker_name: true,
            ..DeliveryConfig::with_endpoint("https://cc.example.com/closedcaption?id=2")
        });

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].key, "delivery.endpoint_base");
        assert!(!changes[0].old.contains("signature"));
        assert_eq!(changes[1].key, "delivery.include_speaker_name");
        assert!(shared.load().include_speaker_name);
    }

    #[test]
    fn update_is_visible_to_clones() {
        let shared = SharedDeliveryConfig::default();
        let reader = shared.clone();
        shared.update(|cfg| cfg.language = "en-US".to_string());
        assert_eq!(reader.load().language, "en-US");
    }
}
