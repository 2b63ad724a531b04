//! Error types for join execution.
//!
//! Two conditions abort a strategy: a pre-sized buffer filling up, and an
//! invalid configuration. Validation mismatches are deliberately *not* errors;
//! they are recorded in [`crate::oracle::Validation`] so the run can finish
//! and report every enabled comparison.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// A fixed-capacity region is full. Surfaced instead of truncating,
    /// because silent truncation would corrupt the oracle comparison.
    #[error("{resource} capacity exhausted (limit {limit})")]
    CapacityExceeded { resource: &'static str, limit: usize },

    /// The requested configuration cannot produce a meaningful run.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl JoinError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
