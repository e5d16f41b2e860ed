//! The process-wide configuration snapshot.
//!
//! Readers take an `Arc` to an immutable [`ClientConfig`]; writers replace the
//! whole `Arc` under one lock. A reader therefore sees either the old or the
//! new snapshot, never a mix.

use super::source::ConfigSource;
use super::ClientConfig;
use crate::WarpstashError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Holder for the current [`ClientConfig`].
#[derive(Debug)]
pub struct SharedConfig {
    current: Mutex<Arc<ClientConfig>>,
}

impl SharedConfig {
    /// Create a holder around an initial snapshot.
    ///
    /// The snapshot is not validated here so that a service can start from
    /// defaults and fill in keys with the first fetch.
    pub fn new(initial: ClientConfig) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
        }
    }

    // Only whole-Arc swaps happen under the lock, so a poisoned guard still
    // holds a consistent snapshot.
    fn lock(&self) -> MutexGuard<'_, Arc<ClientConfig>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current snapshot. Never waits on network activity.
    pub fn get(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.lock())
    }

    /// Replace the snapshot after validating the new one.
    ///
    /// An invalid config is rejected and the previous snapshot stays in place.
    pub fn replace(&self, config: ClientConfig) -> Result<(), WarpstashError> {
        config.validate()?;
        *self.lock() = Arc::new(config);
        Ok(())
    }

    /// Fetch from `source` and swap in the result.
    ///
    /// On any failure the last-known-good snapshot is kept and the error is
    /// returned for logging.
    pub async fn refresh(&self, source: &dyn ConfigSource) -> Result<(), WarpstashError> {
        let current = self.get();
        let fetched = source.fetch(&current).await?;
        self.replace(fetched)?;

        let snapshot = self.get();
        tracing::info!(
            client_version = %snapshot.client_version,
            host = %snapshot.host,
            keys = snapshot.redemption_keys.len(),
            poll_interval_secs = snapshot.poll_interval.as_secs(),
            "configuration refreshed"
        );
        Ok(())
    }
}

/// Spawn the periodic config refresher.
///
/// The first refresh happens one `every` after spawning. The task ends when
/// `cancel` fires.
pub fn spawn_refresher(
    shared: Arc<SharedConfig>,
    source: Arc<dyn ConfigSource>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(every) => {}
            }

            if let Err(e) = shared.refresh(source.as_ref()).await {
                tracing::warn!(error = %e, "config refresh failed, keeping previous snapshot");
            }
        }
        tracing::debug!("config refresher stopped");
    })
}
