//! The outbound HTTP transport shared by all providers.
//!
//! Built once at startup and handed to every adapter; adapters clone the
//! inner client but never reconfigure it.

use std::time::Duration;

use reqwest::{Client, Proxy};
use serde::Deserialize;

use crate::error::ProviderError;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Proxy URL applied to all outbound requests (e.g. `http://127.0.0.1:7890`).
    pub proxy: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 2,
        }
    }
}

/// Shared, read-only HTTP client.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new(config: &TransportConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy)
                .map_err(|e| ProviderError::config(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
