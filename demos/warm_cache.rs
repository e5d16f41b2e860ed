//! Warm-cache example.
//!
//! Starts a key service, lets the fill worker run for a while, then asks for
//! one key and prints the cache counters.
//!
//! # Running
//!
//! ```bash
//! export WARPSTASH_KEYS="pool-key-1,pool-key-2"
//! # optional: remote Key=Value config document
//! export WARPSTASH_CONFIG_URL="https://example.com/warp.txt"
//! RUST_LOG=warpstash=debug cargo run --example warm_cache
//! ```

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use warpstash::{ClientConfig, KeyService, ProgressListener, ServiceSettings, Step, WarpstashError};

struct PrintProgress;

impl ProgressListener for PrintProgress {
    fn on_step(&self, step: Step, completed: usize, total: usize) {
        println!("  [{}/{}] {}", completed, total, step);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let redemption_keys: Vec<String> = std::env::var("WARPSTASH_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    let settings = ServiceSettings {
        client: ClientConfig {
            redemption_keys,
            ..ClientConfig::default()
        },
        config_url: std::env::var("WARPSTASH_CONFIG_URL").ok(),
        ..ServiceSettings::default()
    };

    let service = match KeyService::new(settings).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            std::process::exit(1);
        }
    };

    let workers = service.start();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Falls back to an on-demand generation if the pool is still empty.
    let cancel = CancellationToken::new();
    match service.get_key_with_progress(&cancel, &PrintProgress).await {
        Ok(account) => {
            println!("License: {}", account.license);
            println!("Type: {}", account.account_type);
            println!("Referral count: {}", account.referral_count);
        }
        Err(WarpstashError::QualityRejected(reason)) => {
            println!("Generated key discarded: {}", reason);
        }
        Err(e) => {
            // Full detail for the operator, generic text for end users.
            eprintln!("Generation failed: {}", e);
            println!("{}", e.public_message());
        }
    }

    match serde_json::to_string_pretty(&service.stats()) {
        Ok(json) => println!("Stats: {}", json),
        Err(e) => eprintln!("Could not render stats: {}", e),
    }

    service.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
}
