//! Error types for store link resolution.
//!
//! This module defines structured errors for every protocol operation,
//! providing context-rich messages for debugging and user feedback.
//!
//! Validation errors are caller bugs and fail fast before any network call.
//! Transport errors inside concurrent fan-out are absorbed locally into
//! placeholder values; in the single-shot steps they propagate with the step
//! name attached. Cancellation is always distinguishable from failure.

use thiserror::Error;

/// Errors that can occur while resolving store links.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A required parameter was missing or empty.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// The parameter that failed validation.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Network-level failure during a protocol round trip.
    #[error("transport failure during {step}: {source}")]
    Transport {
        /// The protocol step that was executing (e.g. `cookie`, `file-list`).
        step: &'static str,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// A response body could not be parsed as XML or JSON.
    #[error("failed to parse {step} response: {reason}")]
    Parse {
        /// The protocol step whose response was malformed.
        step: &'static str,
        /// Parser diagnostic.
        reason: String,
    },

    /// Cooperative cancellation was observed at a suspension point.
    #[error("operation canceled")]
    Canceled,

    /// The shared HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl QueryError {
    /// Creates an `InvalidArgument` error for a missing required parameter.
    #[must_use]
    pub fn missing(name: &'static str) -> Self {
        Self::InvalidArgument {
            name,
            reason: "must not be empty".to_string(),
        }
    }

    /// Creates a `Transport` error for the given protocol step.
    #[must_use]
    pub fn transport(step: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { step, source }
    }

    /// Creates a `Parse` error for the given protocol step.
    pub fn parse(step: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            step,
            reason: reason.into(),
        }
    }

    /// True when this error represents cooperative cancellation.
    ///
    /// Fan-out orchestration uses this to tell "canceled" apart from
    /// transport failures that degrade to placeholder values.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
