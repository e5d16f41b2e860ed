//! File-based key store with atomic writes.
//!
//! Stores one JSON record per account under `dirs::data_dir()/<namespace>/`.
//! Uses temp file + rename for atomic writes, so a reader never sees a
//! half-written record. Records that fail to parse are renamed to
//! `<id>.corrupt` when the store is opened, counted or read, so they never
//! count towards capacity.

use crate::cache::format::StoredAccount;
use crate::cache::store::KeyStore;
use crate::clock::Clock;
use crate::protocol::models::GeneratedAccount;
use crate::WarpstashError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Directory-backed key store.
pub struct FileStore {
    /// Directory for record files.
    store_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Create a store with the given namespace.
    ///
    /// Records are stored under `dirs::data_dir()/<namespace>/`.
    pub async fn new(namespace: &str, clock: Arc<dyn Clock>) -> Result<Self, WarpstashError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| WarpstashError::StoreIO("Could not find data directory".to_string()))?;

        Self::with_path(base_dir.join(namespace), clock).await
    }

    /// Create a store at a specific directory.
    ///
    /// Unreadable records left by an earlier run are quarantined on open.
    pub async fn with_path(store_dir: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, WarpstashError> {
        fs::create_dir_all(&store_dir)
            .await
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to create store dir: {}", e)))?;

        let store = Self { store_dir, clock };
        let quarantined = store.quarantine_unreadable().await?;
        if quarantined > 0 {
            tracing::warn!(quarantined, dir = %store.store_dir.display(), "quarantined unreadable records");
        }
        Ok(store)
    }

    /// Move every record that cannot be parsed out of the pool.
    ///
    /// Returns the number of records moved.
    pub async fn quarantine_unreadable(&self) -> Result<usize, WarpstashError> {
        let mut moved = 0;
        for path in self.record_paths().await? {
            if let ReadOutcome::Unreadable = self.read_record(&path).await? {
                self.quarantine(&path).await?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Directory holding the records.
    pub fn path(&self) -> &PathBuf {
        &self.store_dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.store_dir.join(format!("{}.json", id))
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>, WarpstashError> {
        let mut entries = fs::read_dir(&self.store_dir)
            .await
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to read store dir: {}", e)))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to read entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn read_record(&self, path: &Path) -> Result<ReadOutcome, WarpstashError> {
        let json = match fs::read_to_string(path).await {
            Ok(json) => json,
            // Deleted by a concurrent taker between listing and reading.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Gone),
            Err(e) => {
                return Err(WarpstashError::StoreIO(format!(
                    "Failed to read record file: {}",
                    e
                )))
            }
        };

        match StoredAccount::from_json(&json) {
            Ok(record) => Ok(ReadOutcome::Record(record)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable record");
                Ok(ReadOutcome::Unreadable)
            }
        }
    }

    async fn quarantine(&self, path: &Path) -> Result<(), WarpstashError> {
        match fs::rename(path, path.with_extension("corrupt")).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WarpstashError::StoreIO(format!(
                "Failed to quarantine record: {}",
                e
            ))),
        }
    }
}

enum ReadOutcome {
    Record(StoredAccount),
    Unreadable,
    Gone,
}

#[async_trait]
impl KeyStore for FileStore {
    async fn insert(&self, account: GeneratedAccount) -> Result<String, WarpstashError> {
        let record = StoredAccount::new(account, self.clock.as_ref());
        let target_path = self.record_path(&record.id);
        let temp_path = self.store_dir.join(format!("{}.tmp", record.id));

        let json = record.to_json()?;

        fs::write(&temp_path, &json)
            .await
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .await
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to rename record file: {}", e)))?;

        Ok(record.id)
    }

    async fn get_any(&self) -> Result<Option<StoredAccount>, WarpstashError> {
        for path in self.record_paths().await? {
            match self.read_record(&path).await? {
                ReadOutcome::Record(record) => return Ok(Some(record)),
                ReadOutcome::Unreadable => self.quarantine(&path).await?,
                ReadOutcome::Gone => {}
            }
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<bool, WarpstashError> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(WarpstashError::StoreIO(format!("Failed to delete record: {}", e))),
        }
    }

    /// Counts readable records only; unreadable ones are quarantined on the way.
    async fn count(&self) -> Result<usize, WarpstashError> {
        let mut live = 0;
        for path in self.record_paths().await? {
            match self.read_record(&path).await? {
                ReadOutcome::Record(_) => live += 1,
                ReadOutcome::Unreadable => self.quarantine(&path).await?,
                ReadOutcome::Gone => {}
            }
        }
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use tempfile::TempDir;

    fn account(license: &str) -> GeneratedAccount {
        GeneratedAccount {
            account_type: "limited".to_string(),
            referral_count: "24598562".to_string(),
            license: license.to_string(),
        }
    }

    async fn make_store(dir: &TempDir) -> FileStore {
        FileStore::with_path(
            dir.path().to_path_buf(),
            Arc::new(MockClock::from_rfc3339("2025-01-15T12:00:00Z")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;

        let id = store.insert(account("license-1")).await.unwrap();
        let loaded = store.get_any().await.unwrap().unwrap();

        assert_eq!(loaded.id, id);
        assert_eq!(loaded.account.license, "license-1");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_store_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;

        assert!(store.get_any().await.unwrap().is_none());
        assert!(store.take().await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filename_hides_license() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        store.insert(account("secret-license")).await.unwrap();

        let mut entries = std::fs::read_dir(temp_dir.path()).unwrap();
        let name = entries.next().unwrap().unwrap().file_name();
        let name = name.to_string_lossy();
        assert!(name.ends_with(".json"));
        assert!(!name.contains("secret"));
    }

    #[tokio::test]
    async fn test_delete_twice_reports_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        let id = store.insert(account("license-1")).await.unwrap();

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_take_drains_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        store.insert(account("a")).await.unwrap();
        store.insert(account("b")).await.unwrap();

        let mut taken = vec![
            store.take().await.unwrap().unwrap().account.license,
            store.take().await.unwrap().unwrap().account.license,
        ];
        taken.sort();

        assert_eq!(taken, vec!["a", "b"]);
        assert!(store.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_record_is_quarantined() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        std::fs::write(temp_dir.path().join("0000.json"), "garbage").unwrap();
        store.insert(account("good")).await.unwrap();

        let loaded = store.get_any().await.unwrap().unwrap();
        assert_eq!(loaded.account.license, "good");
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(temp_dir.path().join("0000.corrupt").exists());
    }

    #[tokio::test]
    async fn test_count_skips_records_corrupted_after_open() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        store.insert(account("good")).await.unwrap();
        std::fs::write(temp_dir.path().join("a.json"), "{").unwrap();
        std::fs::write(temp_dir.path().join("b.json"), "").unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert!(temp_dir.path().join("a.corrupt").exists());
        assert!(temp_dir.path().join("b.corrupt").exists());
    }

    #[tokio::test]
    async fn test_corrupt_pool_at_capacity_is_cleared_on_open() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(temp_dir.path().join(format!("{name}.json")), "{").unwrap();
        }

        let store = make_store(&temp_dir).await;
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_any().await.unwrap().is_none());

        store.insert(account("fresh")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_any_drains_corrupt_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        std::fs::write(temp_dir.path().join("a.json"), "garbage").unwrap();
        std::fs::write(temp_dir.path().join("b.json"), "garbage").unwrap();

        assert!(store.get_any().await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.quarantine_unreadable().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_temp_files_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let store = make_store(&temp_dir).await;
        std::fs::write(temp_dir.path().join("partial.tmp"), "{").unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }
}
