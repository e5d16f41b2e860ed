//! Key pool: storage backends and the replenishment cache.

pub mod file;
pub mod format;
pub mod replenish;
pub mod store;

pub use file::FileStore;
pub use format::StoredAccount;
pub use replenish::KeyCache;
pub use store::{KeyStore, MemoryStore};
