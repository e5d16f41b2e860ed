//! Outbound proxy lookup.
//!
//! Candidates come from a public proxy directory. Unusable ones are skipped
//! until the attempt budget runs out.

use crate::WarpstashError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default directory endpoint, returns one random proxy per call.
pub const DEFAULT_DIRECTORY_URL: &str = "https://public.freeproxyapi.com/api/Proxy/Medium";

/// Proxy schemes reqwest can connect through. SOCKS4 is not among them.
pub const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

/// One proxy as described by the directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCandidate {
    /// Hostname or IP.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Protocol, e.g. `http`, `socks5`.
    #[serde(rename = "type")]
    pub protocol: String,

    /// Average response time in milliseconds.
    #[serde(default)]
    pub average_time: u64,

    /// Country, informational.
    #[serde(default)]
    pub country_name: Option<String>,
}

impl ProxyCandidate {
    /// Whether this candidate is worth trying.
    ///
    /// Only schemes the HTTP client can tunnel through are accepted. Slow
    /// proxies stall the whole sequence.
    pub fn is_usable(&self, max_latency: Duration) -> bool {
        let supported = SUPPORTED_SCHEMES
            .iter()
            .any(|scheme| self.protocol.eq_ignore_ascii_case(scheme));
        supported && u128::from(self.average_time) <= max_latency.as_millis()
    }

    /// Proxy URL in `scheme://host:port` form.
    pub fn to_url(&self) -> Result<Url, WarpstashError> {
        let raw = format!("{}://{}:{}", self.protocol.to_ascii_lowercase(), self.host, self.port);
        Url::parse(&raw).map_err(|e| WarpstashError::Decode(format!("bad proxy address {}: {}", raw, e)))
    }
}

/// Source of proxy candidates.
#[async_trait]
pub trait ProxyDirectory: Send + Sync {
    /// Fetch one candidate.
    async fn fetch_candidate(&self) -> Result<ProxyCandidate, WarpstashError>;
}

/// Reqwest client for the public proxy directory.
pub struct FreeProxyDirectory {
    client: reqwest::Client,
    endpoint: String,
}

impl FreeProxyDirectory {
    /// Directory at [`DEFAULT_DIRECTORY_URL`].
    pub fn new(timeout: Duration) -> Result<Self, WarpstashError> {
        Self::with_endpoint(DEFAULT_DIRECTORY_URL, timeout)
    }

    /// Directory at a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, WarpstashError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WarpstashError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ProxyDirectory for FreeProxyDirectory {
    async fn fetch_candidate(&self) -> Result<ProxyCandidate, WarpstashError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| WarpstashError::Transport(format!("proxy directory request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WarpstashError::RemoteStatus {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<ProxyCandidate>()
            .await
            .map_err(|e| WarpstashError::Decode(format!("unexpected proxy body: {}", e)))
    }
}

/// Find a usable proxy within `attempts` candidates.
///
/// A directory error ends the search immediately.
pub async fn acquire_proxy(
    directory: &dyn ProxyDirectory,
    attempts: usize,
    max_latency: Duration,
) -> Result<Url, WarpstashError> {
    for attempt in 0..attempts {
        let candidate = directory.fetch_candidate().await?;

        if !candidate.is_usable(max_latency) {
            tracing::debug!(
                attempt,
                protocol = %candidate.protocol,
                average_time = candidate.average_time,
                "skipping proxy candidate"
            );
            continue;
        }

        return candidate.to_url();
    }

    Err(WarpstashError::NoSuitableProxy)
}
