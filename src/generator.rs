//! One complete, quality-checked generation attempt.

use crate::client::http::GatewayProvider;
use crate::config::shared::SharedConfig;
use crate::policy::quality::QualityGate;
use crate::protocol::models::GeneratedAccount;
use crate::protocol::sequence::{ProgressListener, Sequencer, Step};
use crate::WarpstashError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Produces usable accounts.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one attempt. Only accounts that passed the quality gate are returned.
    ///
    /// Transport and protocol failures, including failing to set up the
    /// gateway, come back as [`WarpstashError::GenerationFailed`].
    async fn generate(
        &self,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<GeneratedAccount, WarpstashError>;
}

/// Generator that runs the registration sequence against the live API.
pub struct KeyGenerator {
    config: Arc<SharedConfig>,
    gateways: Arc<dyn GatewayProvider>,
    gate: QualityGate,
}

impl KeyGenerator {
    /// Create a generator reading the current snapshot from `config` on every attempt.
    pub fn new(config: Arc<SharedConfig>, gateways: Arc<dyn GatewayProvider>, gate: QualityGate) -> Self {
        Self {
            config,
            gateways,
            gate,
        }
    }
}

#[async_trait]
impl Generator for KeyGenerator {
    async fn generate(
        &self,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressListener>,
    ) -> Result<GeneratedAccount, WarpstashError> {
        let started = Instant::now();
        let snapshot = self.config.get();
        // Building the gateway belongs to the first registration call.
        let gateway = self
            .gateways
            .gateway(Arc::clone(&snapshot))
            .await
            .map_err(|e| WarpstashError::generation_failed(Step::RegisterPrimary, e))?;

        let account = Sequencer::new(gateway.as_ref(), cancel)
            .with_progress(progress)
            .run(&snapshot.redemption_keys)
            .await?;

        let units = self.gate.check(&account)?;
        tracing::info!(
            account_type = %account.account_type,
            referral_count = units,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated account"
        );
        Ok(account)
    }
}
