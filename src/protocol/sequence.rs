//! The registration sequence that turns two throwaway identities into one
//! boosted account.
//!
//! The eight calls run strictly in order on one task:
//!
//! 1. register the primary identity
//! 2. register the secondary identity
//! 3. link the secondary as the primary's referrer
//! 4. delete the secondary
//! 5. redeem a random pool key on the primary
//! 6. re-apply the primary's own embedded license
//! 7. fetch the primary's account data
//! 8. delete the primary
//!
//! Identities are single-use. Any failure voids the whole attempt; there is no
//! per-step retry, the caller starts over with fresh registrations.

use crate::client::http::{ApiRequest, Gateway};
use crate::protocol::models::{
    parse_account, parse_identity, GeneratedAccount, LicenseUpdate, ReferrerUpdate,
    RegisteredIdentity,
};
use crate::WarpstashError;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng, TryRngCore};
use reqwest::Method;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// One call of the registration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// `POST /reg` for the primary identity.
    RegisterPrimary,
    /// `POST /reg` for the secondary identity.
    RegisterSecondary,
    /// `PATCH /reg/{primary}` with the secondary as referrer.
    LinkReferrer,
    /// `DELETE /reg/{secondary}`.
    RetireSecondary,
    /// `PUT /reg/{primary}/account` with a pool key.
    RedeemPoolKey,
    /// `PUT /reg/{primary}/account` with the primary's own license.
    ReapplyLicense,
    /// `GET /reg/{primary}/account`.
    FetchAccount,
    /// `DELETE /reg/{primary}`.
    RetirePrimary,
}

impl Step {
    /// Every step in execution order.
    pub const ALL: [Step; 8] = [
        Step::RegisterPrimary,
        Step::RegisterSecondary,
        Step::LinkReferrer,
        Step::RetireSecondary,
        Step::RedeemPoolKey,
        Step::ReapplyLicense,
        Step::FetchAccount,
        Step::RetirePrimary,
    ];

    /// 1-based position in the sequence.
    pub fn number(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).map_or(0, |i| i + 1)
    }

    /// Short human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::RegisterPrimary => "register primary",
            Step::RegisterSecondary => "register secondary",
            Step::LinkReferrer => "link referrer",
            Step::RetireSecondary => "retire secondary",
            Step::RedeemPoolKey => "redeem pool key",
            Step::ReapplyLicense => "re-apply embedded license",
            Step::FetchAccount => "fetch account",
            Step::RetirePrimary => "retire primary",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives a notification after each completed step.
pub trait ProgressListener: Send + Sync {
    /// Called once `step` has succeeded; `completed` of `total` steps are done.
    fn on_step(&self, step: Step, completed: usize, total: usize);
}

impl<F> ProgressListener for F
where
    F: Fn(Step, usize, usize) + Send + Sync,
{
    fn on_step(&self, step: Step, completed: usize, total: usize) {
        self(step, completed, total)
    }
}

/// Runs the registration sequence against one gateway.
pub struct Sequencer<'a> {
    gateway: &'a dyn Gateway,
    cancel: &'a CancellationToken,
    progress: Option<&'a dyn ProgressListener>,
}

impl<'a> Sequencer<'a> {
    /// Create a sequencer. `cancel` aborts the in-flight call when fired.
    pub fn new(gateway: &'a dyn Gateway, cancel: &'a CancellationToken) -> Self {
        Self {
            gateway,
            cancel,
            progress: None,
        }
    }

    /// Attach a progress listener.
    pub fn with_progress(mut self, listener: Option<&'a dyn ProgressListener>) -> Self {
        self.progress = listener;
        self
    }

    /// Run all eight steps and return the primary identity's account data.
    ///
    /// # Errors
    /// - `ConfigError` if `redemption_keys` is empty (no call is made)
    /// - `GenerationFailed` wrapping the first step failure
    pub async fn run(&self, redemption_keys: &[String]) -> Result<GeneratedAccount, WarpstashError> {
        if redemption_keys.is_empty() {
            return Err(WarpstashError::ConfigError(
                "no redemption keys configured".to_string(),
            ));
        }

        let primary = self.step(Step::RegisterPrimary, self.register()).await?;
        let secondary = self.step(Step::RegisterSecondary, self.register()).await?;

        self.step(Step::LinkReferrer, self.link_referrer(&primary, &secondary))
            .await?;
        self.step(Step::RetireSecondary, self.retire(&secondary)).await?;

        let pool_key = choose_redemption_key(redemption_keys);
        self.step(Step::RedeemPoolKey, self.apply_license(&primary, pool_key))
            .await?;
        self.step(
            Step::ReapplyLicense,
            self.apply_license(&primary, primary.embedded_license()),
        )
        .await?;

        let account = self.step(Step::FetchAccount, self.fetch_account(&primary)).await?;
        self.step(Step::RetirePrimary, self.retire(&primary)).await?;

        Ok(account)
    }

    async fn step<T, F>(&self, step: Step, call: F) -> Result<T, WarpstashError>
    where
        F: Future<Output = Result<T, WarpstashError>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WarpstashError::Cancelled),
            result = call => result,
        };

        match outcome {
            Ok(value) => {
                tracing::debug!(step = %step, number = step.number(), "sequence step done");
                if let Some(listener) = self.progress {
                    listener.on_step(step, step.number(), Step::ALL.len());
                }
                Ok(value)
            }
            Err(e) => Err(WarpstashError::generation_failed(step, e)),
        }
    }

    async fn register(&self) -> Result<RegisteredIdentity, WarpstashError> {
        let response = self.gateway.send(ApiRequest::new(Method::POST, "/reg")).await?;
        parse_identity(&response.body)
    }

    async fn link_referrer(
        &self,
        identity: &RegisteredIdentity,
        referrer: &RegisteredIdentity,
    ) -> Result<(), WarpstashError> {
        let request = ApiRequest::new(Method::PATCH, format!("/reg/{}", identity.identity_id))
            .authorization(identity.bearer())
            .json(&ReferrerUpdate {
                referrer: &referrer.identity_id,
            })?;
        self.gateway.send(request).await?;
        Ok(())
    }

    async fn retire(&self, identity: &RegisteredIdentity) -> Result<(), WarpstashError> {
        let request = ApiRequest::new(Method::DELETE, format!("/reg/{}", identity.identity_id))
            .authorization(identity.bearer());
        self.gateway.send(request).await?;
        Ok(())
    }

    async fn apply_license(
        &self,
        identity: &RegisteredIdentity,
        license: &str,
    ) -> Result<(), WarpstashError> {
        let request = ApiRequest::new(
            Method::PUT,
            format!("/reg/{}/account", identity.identity_id),
        )
        .authorization(identity.bearer())
        .json(&LicenseUpdate { license })?;
        self.gateway.send(request).await?;
        Ok(())
    }

    async fn fetch_account(
        &self,
        identity: &RegisteredIdentity,
    ) -> Result<GeneratedAccount, WarpstashError> {
        let request = ApiRequest::new(
            Method::GET,
            format!("/reg/{}/account", identity.identity_id),
        )
        .authorization(identity.bearer());
        let response = self.gateway.send(request).await?;
        parse_account(&response.body)
    }
}

/// Pick one pool key uniformly at random.
///
/// # Panics
/// Panics if `keys` is empty.
pub fn choose_redemption_key(keys: &[String]) -> &str {
    &keys[pick_index(&mut OsRng, keys.len())]
}

/// Uniform index in `0..len`, seeded from `source`.
///
/// Falls back to index 0 when the entropy source fails.
pub(crate) fn pick_index<R: TryRngCore>(source: &mut R, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }

    let mut seed = <StdRng as SeedableRng>::Seed::default();
    match source.try_fill_bytes(&mut seed) {
        Ok(()) => StdRng::from_seed(seed).random_range(0..len),
        Err(e) => {
            tracing::warn!(error = %e, "entropy source failed, using first pool key");
            0
        }
    }
}
