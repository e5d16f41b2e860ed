//! Pool storage contract and the in-memory backend.

use crate::cache::format::StoredAccount;
use crate::clock::Clock;
use crate::protocol::models::GeneratedAccount;
use crate::WarpstashError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage for pooled accounts.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Add an account, returning its record id.
    async fn insert(&self, account: GeneratedAccount) -> Result<String, WarpstashError>;

    /// Return any stored record without removing it.
    async fn get_any(&self) -> Result<Option<StoredAccount>, WarpstashError>;

    /// Remove a record. `Ok(false)` means it was already gone.
    async fn delete(&self, id: &str) -> Result<bool, WarpstashError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, WarpstashError>;

    /// Remove and return one record.
    ///
    /// A record is only returned by the caller that actually deleted it, so
    /// two concurrent takers never receive the same account.
    async fn take(&self) -> Result<Option<StoredAccount>, WarpstashError> {
        let Some(record) = self.get_any().await? else {
            return Ok(None);
        };

        if self.delete(&record.id).await? {
            Ok(Some(record))
        } else {
            tracing::debug!(id = %record.id, "record taken by another consumer");
            Ok(None)
        }
    }
}

/// Bounded FIFO pool kept in memory.
pub struct MemoryStore {
    records: Mutex<VecDeque<StoredAccount>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store holding at most `capacity` records.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<StoredAccount>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn insert(&self, account: GeneratedAccount) -> Result<String, WarpstashError> {
        let record = StoredAccount::new(account, self.clock.as_ref());
        let id = record.id.clone();

        let mut records = self.records();
        if records.len() >= self.capacity {
            return Err(WarpstashError::StoreFull {
                capacity: self.capacity,
            });
        }
        records.push_back(record);
        Ok(id)
    }

    async fn get_any(&self) -> Result<Option<StoredAccount>, WarpstashError> {
        Ok(self.records().front().cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, WarpstashError> {
        let mut records = self.records();
        match records.iter().position(|r| r.id == id) {
            Some(index) => {
                records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, WarpstashError> {
        Ok(self.records().len())
    }

    async fn take(&self) -> Result<Option<StoredAccount>, WarpstashError> {
        Ok(self.records().pop_front())
    }
}
