//! Key Service - the main public API for Warpstash.
//!
//! The `KeyService` wires every component together:
//! - shared configuration snapshot, optionally refreshed from a remote document
//! - gateway provider (direct or through a public proxy)
//! - generator running the registration sequence and quality gate
//! - key store and the replenishment cache on top of it

use crate::cache::{FileStore, KeyCache, KeyStore, MemoryStore};
use crate::client::http::{GatewayProvider, HttpGatewayProvider};
use crate::client::proxy::FreeProxyDirectory;
use crate::clock::{Clock, SystemClock};
use crate::config::shared::{spawn_refresher, SharedConfig};
use crate::config::source::{ConfigSource, RemoteConfigSource};
use crate::config::{CacheSettings, ClientConfig, ServiceSettings, StorageBackend};
use crate::generator::{Generator, KeyGenerator};
use crate::meter::{CacheStats, StatsSnapshot};
use crate::policy::quality::QualityGate;
use crate::protocol::models::GeneratedAccount;
use crate::protocol::sequence::ProgressListener;
use crate::WarpstashError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Main entry point for Warpstash.
///
/// Create one instance per process, call [`KeyService::start`] once, then
/// call [`KeyService::get_key`] from as many tasks as needed.
pub struct KeyService {
    config: Arc<SharedConfig>,
    source: Option<Arc<dyn ConfigSource>>,
    refresh_every: Duration,
    cache: Arc<KeyCache>,
    shutdown: CancellationToken,
}

impl KeyService {
    /// Build a service from settings.
    ///
    /// When `config_url` is set the document is fetched once here. A failed
    /// fetch falls back to `settings.client`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Settings validation fails
    /// - No redemption keys are available after the initial load
    /// - The key store cannot be opened
    /// - An HTTP client cannot be built
    pub async fn new(settings: ServiceSettings) -> Result<Self, WarpstashError> {
        Self::with_clock(settings, Arc::new(SystemClock)).await
    }

    /// Build a service with a custom clock for stored records.
    #[cfg(any(test, feature = "test-seams"))]
    pub async fn new_with_clock(
        settings: ServiceSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WarpstashError> {
        Self::with_clock(settings, clock).await
    }

    async fn with_clock(
        settings: ServiceSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WarpstashError> {
        settings.validate()?;

        let config = Arc::new(SharedConfig::new(settings.client.clone()));

        let source: Option<Arc<dyn ConfigSource>> = match &settings.config_url {
            Some(url) => Some(Arc::new(RemoteConfigSource::new(
                url.as_str(),
                settings.request_timeout,
            )?)),
            None => None,
        };

        if let Some(source) = &source {
            if let Err(e) = config.refresh(source.as_ref()).await {
                tracing::warn!(error = %e, "initial config fetch failed, using local settings");
            }
        }

        // Without pool keys no attempt can ever succeed.
        config.get().validate()?;

        let store = open_store(&settings, clock).await?;

        let gateways: Arc<dyn GatewayProvider> = if settings.use_proxy {
            let directory = FreeProxyDirectory::new(settings.request_timeout)?;
            Arc::new(HttpGatewayProvider::with_proxies(
                settings.request_timeout,
                Arc::new(directory),
                settings.proxy_attempts,
                settings.max_proxy_latency,
            ))
        } else {
            Arc::new(HttpGatewayProvider::direct(settings.request_timeout))
        };

        let generator = Arc::new(KeyGenerator::new(
            Arc::clone(&config),
            gateways,
            QualityGate::new(settings.min_referral_count),
        ));

        tracing::info!(
            capacity = settings.cache.capacity,
            use_proxy = settings.use_proxy,
            remote_config = source.is_some(),
            keys = config.get().redemption_keys.len(),
            "key service ready"
        );

        Ok(Self::with_parts(
            config,
            source,
            settings.config_refresh_interval,
            generator,
            store,
            settings.cache,
        ))
    }

    /// Assemble a service from pre-built parts.
    ///
    /// No validation or network access happens here.
    pub fn with_parts(
        config: Arc<SharedConfig>,
        source: Option<Arc<dyn ConfigSource>>,
        refresh_every: Duration,
        generator: Arc<dyn Generator>,
        store: Arc<dyn KeyStore>,
        cache_settings: CacheSettings,
    ) -> Self {
        let cache = KeyCache::new(
            generator,
            store,
            Arc::clone(&config),
            cache_settings,
            Arc::new(CacheStats::new()),
        );

        Self {
            config,
            source,
            refresh_every,
            cache: Arc::new(cache),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the Fill worker and, with a config source, the refresher.
    ///
    /// Both tasks end after [`KeyService::shutdown`].
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let cache = Arc::clone(&self.cache);
        let cancel = self.shutdown.child_token();
        handles.push(tokio::spawn(async move { cache.fill(cancel).await }));

        if let Some(source) = &self.source {
            handles.push(spawn_refresher(
                Arc::clone(&self.config),
                Arc::clone(source),
                self.refresh_every,
                self.shutdown.child_token(),
            ));
        }

        handles
    }

    /// Get one key, pooled if possible, generated on demand otherwise.
    ///
    /// `cancel` aborts an on-demand generation. Errors are safe to log but
    /// should be shown to end users through
    /// [`WarpstashError::public_message`].
    pub async fn get_key(&self, cancel: &CancellationToken) -> Result<GeneratedAccount, WarpstashError> {
        self.get_key_inner(cancel, None).await
    }

    /// Like [`KeyService::get_key`], reporting each completed step of an
    /// on-demand generation.
    pub async fn get_key_with_progress(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressListener,
    ) -> Result<GeneratedAccount, WarpstashError> {
        self.get_key_inner(cancel, Some(progress)).await
    }

    async fn get_key_inner(
        &self,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<GeneratedAccount, WarpstashError> {
        // Fires on shutdown; the caller's token is raced below.
        let request = self.shutdown.child_token();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                request.cancel();
                Err(WarpstashError::Cancelled)
            }
            result = self.cache.get_key(&request, progress) => result,
        }
    }

    /// Replace the configuration snapshot.
    ///
    /// Invalid configs are rejected and the current snapshot is kept.
    /// Attempts already running finish with the snapshot they started with.
    pub fn update_config(&self, config: ClientConfig) -> Result<(), WarpstashError> {
        self.config.replace(config)?;
        tracing::info!(
            keys = self.config.get().redemption_keys.len(),
            "configuration updated"
        );
        Ok(())
    }

    /// Re-read the remote config document now.
    ///
    /// # Errors
    /// - `ConfigError` if the service has no config source
    /// - any fetch or validation error; the current snapshot is kept
    pub async fn refresh_config(&self) -> Result<(), WarpstashError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| WarpstashError::ConfigError("no config source configured".to_string()))?;
        self.config.refresh(source.as_ref()).await
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ClientConfig> {
        self.config.get()
    }

    /// Cache counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.cache.stats().snapshot()
    }

    /// Number of keys currently pooled.
    pub async fn stored_keys(&self) -> Result<usize, WarpstashError> {
        self.cache.stored_keys().await
    }

    /// Stop background tasks and abort in-flight on-demand generations.
    pub fn shutdown(&self) {
        tracing::info!("key service shutting down");
        self.shutdown.cancel();
    }
}

async fn open_store(
    settings: &ServiceSettings,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn KeyStore>, WarpstashError> {
    let store: Arc<dyn KeyStore> = match &settings.storage {
        StorageBackend::Memory => Arc::new(MemoryStore::new(settings.cache.capacity, clock)),
        StorageBackend::Directory(path) => Arc::new(FileStore::with_path(path.clone(), clock).await?),
        StorageBackend::DataDir(namespace) => Arc::new(FileStore::new(namespace, clock).await?),
    };
    Ok(store)
}
