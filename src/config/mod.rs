//! Relay configuration
//!
//! Two layers:
//!
//! - [`RelayConfig`]: the persisted TOML settings file (endpoint, proxy,
//!   collaboration file, status server).
//! - [`DeliveryConfig`]: the live subset the delivery worker reads before
//!   every send, published through [`SharedDeliveryConfig`].
//!
//! ## Loading Order
//!
//! 1. `--config <PATH>` on the command line
//! 2. `CAPTION_RELAY_CONFIG` environment variable
//! 3. `caption_relay.toml` in the current working directory
//! 4. Built-in defaults
//!
//! `CAPTION_RELAY_ENDPOINT` and `CAPTION_RELAY_FILE` override the matching
//! file values.

pub mod defaults;
mod delivery;
mod relay_config;
pub mod validation;
pub mod watcher;

pub use delivery::{mask_endpoint, ConfigChange, DeliveryConfig, SharedDeliveryConfig};
pub use relay_config::{
    ConfigError, DeliverySettings, ProxySettings, RelayConfig, ServerSettings, SourceSettings,
};
pub use watcher::{run_config_watcher, ConfigEvent};
