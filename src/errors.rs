//! Warpstash error types.

use crate::policy::quality::QualityRejection;
use crate::protocol::sequence::Step;
use thiserror::Error;

/// Errors that can occur while generating, storing or serving keys.
#[derive(Debug, Error)]
pub enum WarpstashError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The configuration source could not be reached or parsed.
    #[error("Config fetch error: {0}")]
    ConfigFetch(String),

    /// Network, TLS or timeout failure talking to the remote API.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote API answered with a non-success status.
    #[error("Remote API returned HTTP {status}")]
    RemoteStatus {
        /// HTTP status code.
        status: u16,
    },

    /// Response body was not the JSON we expected.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// One step of the registration sequence failed; the attempt is void.
    #[error("Generation failed at {step}: {source}")]
    GenerationFailed {
        /// Step that failed.
        step: Step,
        /// Underlying cause.
        #[source]
        source: Box<WarpstashError>,
    },

    /// Generated account is structurally valid but not worth serving.
    #[error("Quality rejection: {0}")]
    QualityRejected(QualityRejection),

    /// Key store I/O error.
    #[error("Store I/O error: {0}")]
    StoreIO(String),

    /// Bounded store has no room left.
    #[error("Store is full (capacity {capacity})")]
    StoreFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// No usable outbound proxy was found.
    #[error("No suitable proxy found")]
    NoSuitableProxy,
}

impl WarpstashError {
    /// Wrap a step failure into a [`WarpstashError::GenerationFailed`].
    pub fn generation_failed(step: Step, source: WarpstashError) -> Self {
        Self::GenerationFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Whether this error is a quality rejection rather than a hard failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QualityRejected(_))
    }

    /// Whether the caller's cancellation caused this error.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::GenerationFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Message that is safe to show to an end user.
    ///
    /// Never contains identity IDs, tokens or remote payloads.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Cancelled => "Request was cancelled",
            Self::QualityRejected(_) => "Generated key was unusable, please try again",
            Self::ConfigError(_) | Self::ConfigFetch(_) => "Service is misconfigured",
            _ => "Failed to generate a key, please try again later",
        }
    }
}
