//! HTTP transport for caption requests
//!
//! Each caption is one `POST` with a plain-text body, a 30 second timeout and
//! `Connection: close`. Requests go direct unless a proxy is configured:
//! either an explicit `proxy.url`, or proxy credentials, in which case the
//! system proxy from the environment is used with those credentials. With
//! credentials but no system proxy, requests go direct.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use tracing::debug;

use super::{CaptionRequest, CaptionTransport, DeliveryError};
use crate::config::defaults::{CAPTION_CONTENT_TYPE, DELIVERY_TIMEOUT_SECS};
use crate::config::DeliveryConfig;

/// Environment variables consulted for the system proxy, in order.
const PROXY_ENV_VARS: &[&str] = &[
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "ALL_PROXY",
    "all_proxy",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProxyKey {
    address: String,
    credentials: Option<(String, String)>,
}

/// `reqwest`-backed [`CaptionTransport`].
///
/// Clients are built lazily and reused until the proxy settings change.
#[derive(Debug)]
pub struct HttpTransport {
    timeout: Duration,
    direct: Option<reqwest::Client>,
    proxied: Option<(ProxyKey, reqwest::Client)>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
    }

    /// Transport with a non-default per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            direct: None,
            proxied: None,
        }
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client_for(&mut self, config: &DeliveryConfig) -> Result<reqwest::Client, DeliveryError> {
        self.client_with_env(config, |key| std::env::var(key).ok())
    }

    fn client_with_env<F>(
        &mut self,
        config: &DeliveryConfig,
        lookup: F,
    ) -> Result<reqwest::Client, DeliveryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !config.uses_proxy() {
            return self.direct_client();
        }

        // Credentials with no proxy to present them to are unused; go direct.
        let Some(address) = resolve_proxy_address(config, lookup) else {
            debug!("Proxy credentials set but no proxy address found, sending directly");
            return self.direct_client();
        };
        let key = ProxyKey {
            address,
            credentials: config
                .proxy_credentials()
                .map(|(user, password)| (user.to_string(), password.to_string())),
        };

        if let Some((cached, client)) = &self.proxied {
            if *cached == key {
                return Ok(client.clone());
            }
        }

        let mut proxy = reqwest::Proxy::all(key.address.as_str())
            .map_err(|e| DeliveryError::InvalidProxy(format!("{}: {e}", key.address)))?;
        if let Some((user, password)) = &key.credentials {
            proxy = proxy.basic_auth(user, password);
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(proxy)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        debug!(proxy = %key.address, authenticated = key.credentials.is_some(), "Built proxied HTTP client");
        self.proxied = Some((key, client.clone()));
        Ok(client)
    }

    fn direct_client(&mut self) -> Result<reqwest::Client, DeliveryError> {
        if let Some(client) = &self.direct {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        self.direct = Some(client.clone());
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionTransport for HttpTransport {
    async fn send(
        &mut self,
        request: &CaptionRequest,
        config: &DeliveryConfig,
    ) -> Result<(), DeliveryError> {
        let client = self.client_for(config)?;

        let response = client
            .post(&request.url)
            .header(CONNECTION, "close")
            .header(CONTENT_TYPE, CAPTION_CONTENT_TYPE)
            .body(request.body.clone())
            .send()
            .await
            .map_err(DeliveryError::http)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status))
        }
    }

    fn transport_name(&self) -> &str {
        "HTTP"
    }
}

/// Proxy address for `config`: the explicit `proxy_url`, else the first
/// non-empty proxy variable found through `lookup`.
pub fn resolve_proxy_address<F>(config: &DeliveryConfig, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = config.proxy_url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Some(url.trim().to_string());
    }
    PROXY_ENV_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .find(|value| !value.trim().is_empty())
}
