//! Cache activity counters.
//!
//! Counters are shared between the Fill worker and every consumer, so each
//! one is an independent atomic. A snapshot is not a consistent cut across
//! counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    fast_path: AtomicU64,
    slow_path: AtomicU64,
    stored: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Keys served from the pool.
    pub fast_path: u64,

    /// Keys generated on demand because the pool was empty.
    pub slow_path: u64,

    /// Keys added to the pool by the Fill worker.
    pub stored: u64,

    /// Generated accounts discarded by the quality gate.
    pub rejected: u64,

    /// Generation attempts that failed before producing an account.
    pub failed: u64,
}

impl CacheStats {
    /// Fresh counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A consumer was served from the pool.
    pub fn record_fast_path(&self) {
        self.fast_path.fetch_add(1, Ordering::Relaxed);
    }

    /// A consumer was served by an on-demand generation.
    pub fn record_slow_path(&self) {
        self.slow_path.fetch_add(1, Ordering::Relaxed);
    }

    /// The Fill worker stored a key.
    pub fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    /// The quality gate discarded an account.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A generation attempt failed.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fast_path: self.fast_path.load(Ordering::Relaxed),
            slow_path: self.slow_path.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
