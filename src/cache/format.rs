//! Stored account record format.
//!
//! One record per pooled key. The record id is derived from the license so
//! the license itself never shows up in a filename or log line.

use crate::clock::Clock;
use crate::protocol::models::GeneratedAccount;
use crate::WarpstashError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of the hex prefix used as record id.
const ID_LEN: usize = 16;

/// A pooled account together with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    /// Record id, unique per license.
    pub id: String,

    /// The account handed out to consumers.
    pub account: GeneratedAccount,

    /// When the record entered the pool.
    pub stored_at: DateTime<Utc>,
}

impl StoredAccount {
    /// Wrap a freshly generated account, stamping it with `clock`.
    pub fn new(account: GeneratedAccount, clock: &dyn Clock) -> Self {
        let hash = hash_license(&account.license);
        Self {
            id: hash[..ID_LEN].to_string(),
            account,
            stored_at: clock.now_utc(),
        }
    }

    /// Serialize the record to JSON.
    pub fn to_json(&self) -> Result<String, WarpstashError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to serialize record: {}", e)))
    }

    /// Deserialize a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, WarpstashError> {
        serde_json::from_str(json)
            .map_err(|e| WarpstashError::StoreIO(format!("Failed to parse record: {}", e)))
    }
}

/// SHA-256 of a license, hex encoded.
pub fn hash_license(license: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(license.as_bytes()))
}
