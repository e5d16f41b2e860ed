//! Cache activity metering.

pub mod stats;

pub use stats::{CacheStats, StatsSnapshot};
