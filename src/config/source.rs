//! Where configuration snapshots come from.

use super::parse::parse_client_config;
use super::ClientConfig;
use crate::WarpstashError;
use async_trait::async_trait;
use std::time::Duration;

/// A source of [`ClientConfig`] snapshots.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch a fresh snapshot. `current` supplies values the source omits.
    async fn fetch(&self, current: &ClientConfig) -> Result<ClientConfig, WarpstashError>;
}

/// Serves the same snapshot every time.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    config: ClientConfig,
}

impl StaticConfigSource {
    /// Wrap a fixed snapshot.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch(&self, _current: &ClientConfig) -> Result<ClientConfig, WarpstashError> {
        Ok(self.config.clone())
    }
}

/// Fetches a plain-text `Key=Value` document over HTTP.
pub struct RemoteConfigSource {
    client: reqwest::Client,
    url: String,
}

impl RemoteConfigSource {
    /// Create a source for the given document URL.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WarpstashError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WarpstashError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The document URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConfigSource for RemoteConfigSource {
    async fn fetch(&self, current: &ClientConfig) -> Result<ClientConfig, WarpstashError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| WarpstashError::ConfigFetch(format!("error loading config from {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WarpstashError::ConfigFetch(format!(
                "config source {} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| WarpstashError::ConfigFetch(format!("Failed to read config body: {}", e)))?;

        parse_client_config(&text, current)
    }
}
