//! # Warpstash
//!
//! **A warm pool of WARP+ license keys, with on-demand generation as fallback.**
//!
//! Warpstash drives the Cloudflare WARP client registration API through a
//! fixed eight-call sequence that turns a pool key into a fresh, boosted
//! license. Finished keys are quality checked and kept in a bounded pool so
//! callers normally get one instantly.
//!
//! ## Features
//!
//! - **Strict sequencing**: registration calls run in a fixed order; any failure aborts the attempt
//! - **Quality gate**: keys below the referral threshold are never served
//! - **Replenishment cache**: a background worker keeps the pool full with jittered pacing
//! - **Hot configuration**: client fingerprint and pool keys can be swapped at runtime
//! - **Pinned transport**: TLS 1.2 only, optional rotating public proxy
//!
//! ## Quickstart
//!
//! ```no_run
//! use warpstash::{ClientConfig, KeyService, ServiceSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), warpstash::WarpstashError> {
//!     let settings = ServiceSettings {
//!         client: ClientConfig {
//!             redemption_keys: vec!["POOL-KEY-1".to_string(), "POOL-KEY-2".to_string()],
//!             ..ClientConfig::default()
//!         },
//!         ..ServiceSettings::default()
//!     };
//!
//!     let service = KeyService::new(settings).await?;
//!     let _workers = service.start();
//!
//!     let account = service.get_key(&CancellationToken::new()).await?;
//!     println!("{} ({})", account.license, account.referral_count);
//!
//!     service.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Remote failures are expected and frequent. They are absorbed by the fill
//! worker and surfaced to `get_key` callers as [`WarpstashError`]. Use
//! [`WarpstashError::public_message`] for anything shown to end users: it
//! never contains identity IDs or bearer tokens.
//!
//! ## Configuration
//!
//! - `client`: Client fingerprint, API base URL and pool keys
//! - `config_url`: Optional `Key=Value` document polled for new settings
//! - `cache`: Pool capacity, cooldown and jitter
//! - `storage`: In-memory pool or one JSON file per key
//!
//! See [`ServiceSettings`] for full documentation.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/warpstash/0.1.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Policy layer
pub mod policy;

// Generation
pub mod generator;

// Cache layer
pub mod cache;

// Metering layer
pub mod meter;

// Service (main public API)
pub mod manager;

// Re-exports for public API
pub use cache::{KeyStore, StoredAccount};
pub use clock::{Clock, SystemClock};
pub use config::{CacheSettings, ClientConfig, ServiceSettings, StorageBackend};
pub use errors::WarpstashError;
pub use generator::Generator;
pub use manager::KeyService;
pub use meter::StatsSnapshot;
pub use policy::quality::QualityGate;
pub use protocol::models::GeneratedAccount;
pub use protocol::sequence::{ProgressListener, Step};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
