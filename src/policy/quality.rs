//! Quality gate for generated accounts.
//!
//! Some pool keys are nearly drained, so a full registration sequence can end
//! with an account worth next to nothing. Such results are discarded:
//! - `referral_count` must parse as an integer
//! - the parsed value, negative ones included, must reach the configured minimum

use crate::protocol::models::GeneratedAccount;
use crate::WarpstashError;
use std::fmt;

/// Minimum referral count for an account to be served.
pub const MIN_REFERRAL_COUNT: u64 = 1000;

/// Why an account was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityRejection {
    /// `referral_count` is not an integer.
    Malformed {
        /// The raw value received.
        raw: String,
    },

    /// `referral_count` is below the minimum.
    QuotaTooSmall {
        /// Parsed referral count.
        referral_count: i64,
        /// Required minimum.
        minimum: u64,
    },
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { raw } => write!(f, "malformed result (referral_count {:?})", raw),
            Self::QuotaTooSmall {
                referral_count,
                minimum,
            } => write!(f, "quota too small ({} < {})", referral_count, minimum),
        }
    }
}

/// Quality threshold applied to every generated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    /// Smallest acceptable referral count.
    pub min_referral_count: u64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_referral_count: MIN_REFERRAL_COUNT,
        }
    }
}

impl QualityGate {
    /// Gate with a custom threshold.
    pub fn new(min_referral_count: u64) -> Self {
        Self { min_referral_count }
    }

    /// Check an account, returning its parsed referral count.
    ///
    /// # Returns
    /// * `Ok(units)` - account is usable
    /// * `Err(QualityRejected(Malformed))` - referral count is not an integer
    /// * `Err(QualityRejected(QuotaTooSmall))` - referral count below threshold
    pub fn check(&self, account: &GeneratedAccount) -> Result<u64, WarpstashError> {
        let units = account.referral_units().ok_or_else(|| {
            WarpstashError::QualityRejected(QualityRejection::Malformed {
                raw: account.referral_count.clone(),
            })
        })?;

        match u64::try_from(units) {
            Ok(accepted) if accepted >= self.min_referral_count => Ok(accepted),
            _ => Err(WarpstashError::QualityRejected(
                QualityRejection::QuotaTooSmall {
                    referral_count: units,
                    minimum: self.min_referral_count,
                },
            )),
        }
    }
}
