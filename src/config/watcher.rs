//! Polling-based settings file watcher.
//!
//! Checks the settings file's mtime every 2 seconds. When it changes, waits
//! 500ms for the editor to finish writing, reloads the file, and publishes
//! the new delivery settings into the live [`SharedDeliveryConfig`]. The
//! delivery worker picks them up on its next record.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::defaults::{CONFIG_DEBOUNCE_MS, CONFIG_POLL_INTERVAL_SECS};
use super::{ConfigChange, ConfigError, RelayConfig, SharedDeliveryConfig};

/// Events emitted by the settings watcher.
#[derive(Debug)]
pub enum ConfigEvent {
    /// Settings reloaded; the delivery config changed by these entries (may be empty).
    Reloaded(Vec<ConfigChange>),
    /// Reload failed; the previous delivery config stays active.
    Error(String),
}

/// Watch cadence.
#[derive(Debug, Clone, Copy)]
pub struct WatchIntervals {
    pub poll: Duration,
    pub debounce: Duration,
}

impl Default for WatchIntervals {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(CONFIG_POLL_INTERVAL_SECS),
            debounce: Duration::from_millis(CONFIG_DEBOUNCE_MS),
        }
    }
}

/// Reload `path` and publish its delivery settings into `shared`.
///
/// Environment overrides are re-applied so a reload never undoes them.
/// Invalid delivery settings are rejected without touching `shared`.
pub fn reload_into(path: &Path, shared: &SharedDeliveryConfig) -> Result<Vec<ConfigChange>, ConfigError> {
    let config = RelayConfig::load_from_file(path)?.with_env_overrides();
    config.validate_delivery()?;
    Ok(shared.store(config.delivery_config()))
}

/// Run the settings watcher with the default cadence until `cancel_token`
/// fires or `tx` is closed.
pub async fn run_config_watcher(
    path: PathBuf,
    shared: SharedDeliveryConfig,
    tx: mpsc::Sender<ConfigEvent>,
    cancel_token: CancellationToken,
) {
    watch(path, shared, tx, cancel_token, WatchIntervals::default()).await;
}

/// Run the settings watcher with an explicit cadence.
pub async fn watch(
    path: PathBuf,
    shared: SharedDeliveryConfig,
    tx: mpsc::Sender<ConfigEvent>,
    cancel_token: CancellationToken,
    intervals: WatchIntervals,
) {
    tracing::info!(path = %path.display(), poll_secs = intervals.poll.as_secs_f32(), "Config watcher started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!("[ConfigWatcher] Shutdown signal received");
                return;
            }
            () = tokio::time::sleep(intervals.poll) => {}
        }

        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not accessible, keeping current settings"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(intervals.debounce).await;
        if get_mtime(&path) != Some(current) {
            // Still being written; pick it up on the next poll.
            continue;
        }
        last_mtime = Some(current);

        let event = match reload_into(&path, &shared) {
            Ok(changes) => {
                if changes.is_empty() {
                    tracing::info!(path = %path.display(), "Config reloaded, delivery settings unchanged");
                }
                for change in &changes {
                    tracing::info!(%change, "Delivery setting updated");
                }
                ConfigEvent::Reloaded(changes)
            }
            Err(e) => {
                tracing::error!(error = %e, "Config hot-reload failed, keeping previous settings");
                ConfigEvent::Error(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("Config watcher channel closed, stopping");
            return;
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
