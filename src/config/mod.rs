//! Warpstash configuration.
//!
//! [`ClientConfig`] is the snapshot used to talk to the registration API. It is
//! swapped as a whole through [`shared::SharedConfig`]. [`ServiceSettings`]
//! holds the process-level knobs that do not change at runtime.

pub mod parse;
pub mod shared;
pub mod source;

use crate::WarpstashError;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default `CF-Client-Version` header.
pub const DEFAULT_CLIENT_VERSION: &str = "a-6.15-2405";
/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "okhttp/3.12.1";
/// Default `Host` header.
pub const DEFAULT_HOST: &str = "api.cloudflareclient.com";
/// Default API prefix.
pub const DEFAULT_BASE_URL: &str = "https://api.cloudflareclient.com/v0a2405";
/// Default spacing between background generation attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(45);

/// Runtime parameters for talking to the registration API.
///
/// Treat a value of this type as an immutable snapshot: it is replaced as a
/// whole, never patched field by field while shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `CF-Client-Version` header value.
    pub client_version: String,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// `Host` header value.
    pub host: String,

    /// URL prefix for every API path (no trailing slash).
    pub base_url: String,

    /// Pool keys redeemed onto fresh identities. Must not be empty.
    pub redemption_keys: Vec<String>,

    /// Suggested spacing between background generation attempts.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            host: DEFAULT_HOST.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            redemption_keys: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), WarpstashError> {
        if self.redemption_keys.is_empty() {
            return Err(WarpstashError::ConfigError(
                "redemption_keys cannot be empty".to_string(),
            ));
        }
        // A blank entry would be picked and sent as a license.
        if self.redemption_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(WarpstashError::ConfigError(
                "redemption_keys cannot contain blank entries".to_string(),
            ));
        }
        if self.client_version.is_empty() {
            return Err(WarpstashError::ConfigError(
                "client_version cannot be empty".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(WarpstashError::ConfigError(
                "host cannot be empty".to_string(),
            ));
        }
        Url::parse(&self.base_url).map_err(|e| {
            WarpstashError::ConfigError(format!("base_url '{}' is invalid: {}", self.base_url, e))
        })?;
        if self.poll_interval.is_zero() {
            return Err(WarpstashError::ConfigError(
                "poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a full request URL from an API path such as `/reg`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Tuning for the replenishment cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Maximum number of keys kept warm.
    pub capacity: usize,

    /// How long the fill loop sleeps when the pool is full.
    pub cooldown: Duration,

    /// Upper bound of the random delay added to each inter-attempt sleep.
    pub max_jitter: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 20,
            cooldown: Duration::from_secs(30),
            max_jitter: Duration::from_secs(30),
        }
    }
}

impl CacheSettings {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), WarpstashError> {
        if self.capacity == 0 {
            return Err(WarpstashError::ConfigError(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if self.cooldown.is_zero() {
            return Err(WarpstashError::ConfigError(
                "cache cooldown must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where generated keys are kept between generation and delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Bounded in-memory queue, lost on restart.
    Memory,

    /// One JSON file per key under the given directory.
    Directory(PathBuf),

    /// One JSON file per key under `dirs::data_dir()/<namespace>/`.
    DataDir(String),
}

/// Process-level settings for [`crate::KeyService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Initial client configuration, also the fallback if the first fetch fails.
    pub client: ClientConfig,

    /// Plain-text configuration document to poll, if any.
    pub config_url: Option<String>,

    /// How often the refresher re-reads `config_url`.
    pub config_refresh_interval: Duration,

    /// Cache tuning.
    pub cache: CacheSettings,

    /// Key storage backend.
    pub storage: StorageBackend,

    /// Route generation traffic through a public proxy when one is found.
    pub use_proxy: bool,

    /// Candidates to inspect before giving up on a proxy.
    pub proxy_attempts: usize,

    /// Proxies slower than this are skipped.
    pub max_proxy_latency: Duration,

    /// Timeout for a single HTTP call.
    pub request_timeout: Duration,

    /// Minimum referral count for a generated key to be served.
    pub min_referral_count: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            config_url: None,
            config_refresh_interval: Duration::from_secs(6 * 60 * 60),
            cache: CacheSettings::default(),
            storage: StorageBackend::Memory,
            use_proxy: false,
            proxy_attempts: 15,
            max_proxy_latency: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
            min_referral_count: crate::policy::quality::MIN_REFERRAL_COUNT,
        }
    }
}

impl ServiceSettings {
    /// Validate the settings that can be checked before any network access.
    ///
    /// The client snapshot is checked separately, after the first config fetch.
    pub fn validate(&self) -> Result<(), WarpstashError> {
        self.cache.validate()?;
        if self.config_refresh_interval.is_zero() {
            return Err(WarpstashError::ConfigError(
                "config_refresh_interval must be positive".to_string(),
            ));
        }
        if self.use_proxy && self.proxy_attempts == 0 {
            return Err(WarpstashError::ConfigError(
                "proxy_attempts must be at least 1 when use_proxy is set".to_string(),
            ));
        }
        if let StorageBackend::DataDir(namespace) = &self.storage {
            if namespace.is_empty() {
                return Err(WarpstashError::ConfigError(
                    "storage namespace cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
