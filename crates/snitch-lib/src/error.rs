//! Error taxonomy for discovery, measurement and publishing
//!
//! None of these abort a run. They are logged where they happen and kept
//! in the outcome values so callers can inspect what went wrong.

use std::fmt::Display;

/// Errors recorded while measuring or publishing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnitchError {
    /// A list/describe/put call to AWS failed
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// The run was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// An outgoing metric batch failed validation and was not submitted
    #[error("invalid metric batch: {0}")]
    InvalidBatch(String),

    /// The metrics backend rejected a batch
    #[error("failed to submit metrics: {0}")]
    Submission(String),

    /// A per-cluster measurement task panicked or was aborted
    #[error("measurement task failed: {0}")]
    Task(String),
}

impl SnitchError {
    /// Wrap a provider error for the named API operation
    pub fn api(operation: &'static str, err: impl Display) -> Self {
        Self::Api {
            operation,
            message: err.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SnitchError>;
