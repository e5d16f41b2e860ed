//! Replenishment cache.
//!
//! A single Fill worker keeps the pool topped up in the background. Consumers
//! call `get_key`, which takes a pooled key when one exists and otherwise
//! generates one on the spot. The pool read never waits on the Fill worker.

use crate::cache::store::KeyStore;
use crate::config::shared::SharedConfig;
use crate::config::CacheSettings;
use crate::generator::Generator;
use crate::meter::CacheStats;
use crate::protocol::models::GeneratedAccount;
use crate::protocol::sequence::ProgressListener;
use crate::WarpstashError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pool of pre-generated keys plus the on-demand fallback.
pub struct KeyCache {
    generator: Arc<dyn Generator>,
    store: Arc<dyn KeyStore>,
    config: Arc<SharedConfig>,
    settings: CacheSettings,
    stats: Arc<CacheStats>,
}

impl KeyCache {
    /// Assemble a cache from its parts.
    pub fn new(
        generator: Arc<dyn Generator>,
        store: Arc<dyn KeyStore>,
        config: Arc<SharedConfig>,
        settings: CacheSettings,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            generator,
            store,
            config,
            settings,
            stats,
        }
    }

    /// Counters shared with the owner.
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Number of keys currently pooled.
    pub async fn stored_keys(&self) -> Result<usize, WarpstashError> {
        self.store.count().await
    }

    /// Keep the pool full until `cancel` fires.
    ///
    /// Errors never end the loop. Every attempt, successful or not, is
    /// followed by `poll_interval` plus a random jitter.
    pub async fn fill(&self, cancel: CancellationToken) {
        tracing::info!(capacity = self.settings.capacity, "fill worker started");

        while !cancel.is_cancelled() {
            match self.store.count().await {
                Ok(count) if count >= self.settings.capacity => {
                    tracing::trace!(count, "pool full");
                    if !pause(&cancel, self.settings.cooldown).await {
                        break;
                    }
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "could not read pool size");
                    if !pause(&cancel, self.settings.cooldown).await {
                        break;
                    }
                    continue;
                }
            }

            self.fill_one(&cancel).await;

            if !pause(&cancel, self.next_delay()).await {
                break;
            }
        }

        tracing::info!("fill worker stopped");
    }

    async fn fill_one(&self, cancel: &CancellationToken) {
        match self.generator.generate(cancel, None).await {
            Ok(account) => match self.store.insert(account).await {
                Ok(id) => {
                    self.stats.record_stored();
                    tracing::info!(id = %id, "stored key");
                }
                Err(e) => tracing::warn!(error = %e, "could not store key"),
            },
            Err(e) if e.is_rejection() => {
                self.stats.record_rejected();
                tracing::info!(reason = %e, "discarded generated key");
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("generation cancelled");
            }
            Err(e) => {
                self.stats.record_failed();
                tracing::warn!(error = %e, "generation attempt failed");
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let base = self.config.get().poll_interval;
        let max_jitter = self.settings.max_jitter.as_millis() as u64;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }

    /// Hand out one key.
    ///
    /// Returns a pooled key when available, otherwise runs one generation and
    /// returns its result directly. Slow-path failures are not retried.
    pub async fn get_key(
        &self,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<GeneratedAccount, WarpstashError> {
        match self.store.take().await {
            Ok(Some(record)) => {
                self.stats.record_fast_path();
                tracing::info!(id = %record.id, "served pooled key");
                return Ok(record.account);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "pool read failed, generating on demand"),
        }

        self.stats.record_slow_path();
        match self.generator.generate(cancel, progress).await {
            Ok(account) => Ok(account),
            Err(e) => {
                if e.is_rejection() {
                    self.stats.record_rejected();
                } else if !e.is_cancelled() {
                    self.stats.record_failed();
                }
                Err(e)
            }
        }
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::clock::SystemClock;
    use crate::config::ClientConfig;
    use crate::policy::quality::QualityGate;
    use crate::protocol::sequence::Step;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator returning accounts with a fixed referral count.
    struct FakeGenerator {
        referral_count: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeGenerator {
        fn new(referral_count: &'static str) -> Self {
            Self {
                referral_count,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new("5000")
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(
            &self,
            _cancel: &CancellationToken,
            _progress: Option<&dyn ProgressListener>,
        ) -> Result<GeneratedAccount, WarpstashError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WarpstashError::generation_failed(
                    Step::RegisterPrimary,
                    WarpstashError::RemoteStatus { status: 429 },
                ));
            }
            let account = GeneratedAccount {
                account_type: "limited".to_string(),
                referral_count: self.referral_count.to_string(),
                license: format!("GEN-{}", n),
            };
            QualityGate::default().check(&account)?;
            Ok(account)
        }
    }

    fn pooled(license: &str) -> GeneratedAccount {
        GeneratedAccount {
            account_type: "limited".to_string(),
            referral_count: "24000".to_string(),
            license: license.to_string(),
        }
    }

    fn cache(generator: Arc<FakeGenerator>, capacity: usize) -> (KeyCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(capacity, Arc::new(SystemClock)));
        let config = Arc::new(SharedConfig::new(ClientConfig {
            redemption_keys: vec!["POOL".to_string()],
            poll_interval: Duration::from_secs(45),
            ..ClientConfig::default()
        }));
        let settings = CacheSettings {
            capacity,
            ..CacheSettings::default()
        };
        let cache = KeyCache::new(
            generator,
            store.clone(),
            config,
            settings,
            Arc::new(CacheStats::new()),
        );
        (cache, store)
    }

    #[tokio::test]
    async fn test_fast_path_skips_generator() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, store) = cache(generator.clone(), 4);
        store.insert(pooled("POOLED")).await.unwrap();

        let account = cache.get_key(&CancellationToken::new(), None).await.unwrap();

        assert_eq!(account.license, "POOLED");
        assert_eq!(generator.calls(), 0);
        assert_eq!(cache.stats().snapshot().fast_path, 1);
        assert_eq!(cache.stored_keys().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slow_path_generates_once() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, store) = cache(generator.clone(), 4);

        let account = cache.get_key(&CancellationToken::new(), None).await.unwrap();

        assert_eq!(account.license, "GEN-0");
        assert_eq!(generator.calls(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(cache.stats().snapshot().slow_path, 1);
    }

    #[tokio::test]
    async fn test_slow_path_surfaces_rejection() {
        let generator = Arc::new(FakeGenerator::new("200"));
        let (cache, _) = cache(generator.clone(), 4);

        let err = cache.get_key(&CancellationToken::new(), None).await.unwrap_err();

        assert!(err.is_rejection());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_consumers_share_one_pooled_key() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, store) = cache(generator.clone(), 4);
        store.insert(pooled("POOLED")).await.unwrap();
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(cache.get_key(&cancel, None), cache.get_key(&cancel, None));
        let mut licenses = vec![first.unwrap().license, second.unwrap().license];
        licenses.sort();

        assert_eq!(licenses, vec!["GEN-0", "POOLED"]);
        assert_eq!(generator.calls(), 1);
        let stats = cache.stats().snapshot();
        assert_eq!((stats.fast_path, stats.slow_path), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_stops_at_capacity() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, store) = cache(generator.clone(), 3);
        let cache = Arc::new(cache);
        let cancel = CancellationToken::new();

        let worker = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.fill(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(3600)).await;
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(generator.calls(), 3);
        assert_eq!(cache.stats().snapshot().stored, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_discards_rejected_keys() {
        let generator = Arc::new(FakeGenerator::new("200"));
        let (cache, store) = cache(generator.clone(), 3);
        let cache = Arc::new(cache);
        let cancel = CancellationToken::new();

        let worker = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.fill(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(600)).await;
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(generator.calls() >= 2, "fill should keep trying");
        assert_eq!(cache.stats().snapshot().rejected, generator.calls() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_survives_failures() {
        let generator = Arc::new(FakeGenerator::failing());
        let (cache, store) = cache(generator.clone(), 3);
        let cache = Arc::new(cache);
        let cancel = CancellationToken::new();

        let worker = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.fill(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(600)).await;
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(generator.calls() >= 2);
        assert_eq!(cache.stats().snapshot().failed, generator.calls() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_spaced_by_poll_interval() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, _) = cache(generator.clone(), 100);
        let cache = Arc::new(cache);
        let cancel = CancellationToken::new();

        let worker = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.fill(cancel).await })
        };

        // Base 45s, jitter at most 30s: between 4 and 7 attempts fit in 300s.
        tokio::time::sleep(Duration::from_secs(300)).await;
        cancel.cancel();
        worker.await.unwrap();

        let calls = generator.calls();
        assert!((4..=7).contains(&calls), "calls = {calls}");
    }

    #[test]
    fn test_next_delay_bounds() {
        let generator = Arc::new(FakeGenerator::new("5000"));
        let (cache, _) = cache(generator, 4);
        for _ in 0..200 {
            let delay = cache.next_delay();
            assert!(delay >= Duration::from_secs(45));
            assert!(delay <= Duration::from_secs(75));
        }
    }
}
