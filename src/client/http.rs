//! Reqwest-based gateway for the registration API.
//!
//! Every call carries the client headers from the active [`ClientConfig`].
//! The transport is pinned to TLS 1.2 over HTTP/1.1; the API refuses the
//! default reqwest fingerprint.

use super::proxy::{acquire_proxy, ProxyDirectory};
use crate::config::ClientConfig;
use crate::WarpstashError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE, HOST, USER_AGENT};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Header carrying the mobile client version.
pub const CLIENT_VERSION_HEADER: &str = "CF-Client-Version";

/// Content type for calls with a JSON body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// A request against the registration API.
///
/// The caller picks method, path, auth and body; the gateway adds the
/// client headers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,

    /// Path below the configured base URL, e.g. `/reg/{id}`.
    pub path: String,

    /// `Authorization` header value, if any.
    pub authorization: Option<String>,

    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a request without auth or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            authorization: None,
            body: None,
        }
    }

    /// Attach an `Authorization` header value.
    pub fn authorization(mut self, value: String) -> Self {
        self.authorization = Some(value);
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, WarpstashError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| WarpstashError::Decode(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(bytes);
        Ok(self)
    }
}

/// Raw response from the registration API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, WarpstashError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| WarpstashError::Decode(format!("Failed to parse response: {}", e)))
    }
}

/// Executes registration API calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send one request and return the raw response.
    ///
    /// Non-success statuses are errors.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, WarpstashError>;
}

/// Gateway backed by a pinned-TLS reqwest client.
pub struct HttpGateway {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpGateway {
    /// Build a gateway for one config snapshot, optionally through `proxy`.
    ///
    /// Without an explicit proxy the client honours the environment proxy
    /// variables.
    pub fn new(
        config: Arc<ClientConfig>,
        proxy: Option<&Url>,
        timeout: Duration,
    ) -> Result<Self, WarpstashError> {
        let mut builder = Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .max_tls_version(reqwest::tls::Version::TLS_1_2)
            .http1_only()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(url) = proxy {
            let proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|e| WarpstashError::ConfigError(format!("Invalid proxy {}: {}", url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| WarpstashError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// The snapshot this gateway was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, WarpstashError> {
        let url = self.config.endpoint(&request.path);

        let mut builder = self
            .client
            .request(request.method, url)
            .header(CLIENT_VERSION_HEADER, &self.config.client_version)
            .header(HOST, &self.config.host)
            .header(USER_AGENT, &self.config.user_agent)
            .header(CONNECTION, "Keep-Alive");

        if let Some(auth) = request.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(body);
        }

        // URLs embed identity IDs; keep them out of error text.
        let response = builder
            .send()
            .await
            .map_err(|e| WarpstashError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| WarpstashError::Transport(format!("Failed to read body: {}", e.without_url())))?
            .to_vec();

        if !status.is_success() {
            return Err(WarpstashError::RemoteStatus {
                status: status.as_u16(),
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Hands out a gateway for one generation attempt.
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    /// Build a gateway for the given snapshot.
    async fn gateway(&self, config: Arc<ClientConfig>) -> Result<Box<dyn Gateway>, WarpstashError>;
}

/// Builds [`HttpGateway`]s, each with a freshly acquired proxy when enabled.
pub struct HttpGatewayProvider {
    timeout: Duration,
    proxies: Option<Arc<dyn ProxyDirectory>>,
    proxy_attempts: usize,
    max_proxy_latency: Duration,
}

impl HttpGatewayProvider {
    /// Direct connections only.
    pub fn direct(timeout: Duration) -> Self {
        Self {
            timeout,
            proxies: None,
            proxy_attempts: 0,
            max_proxy_latency: Duration::ZERO,
        }
    }

    /// Look up a proxy from `directory` for every attempt.
    pub fn with_proxies(
        timeout: Duration,
        directory: Arc<dyn ProxyDirectory>,
        attempts: usize,
        max_latency: Duration,
    ) -> Self {
        Self {
            timeout,
            proxies: Some(directory),
            proxy_attempts: attempts,
            max_proxy_latency: max_latency,
        }
    }
}

#[async_trait]
impl GatewayProvider for HttpGatewayProvider {
    async fn gateway(&self, config: Arc<ClientConfig>) -> Result<Box<dyn Gateway>, WarpstashError> {
        let proxy = match &self.proxies {
            Some(directory) => {
                let found =
                    acquire_proxy(directory.as_ref(), self.proxy_attempts, self.max_proxy_latency).await;
                match found {
                    Ok(url) => {
                        tracing::info!(proxy = %url, "using proxy");
                        Some(url)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "no proxy available, connecting directly");
                        None
                    }
                }
            }
            None => None,
        };

        let gateway = HttpGateway::new(config, proxy.as_ref(), self.timeout)?;
        Ok(Box::new(gateway))
    }
}
