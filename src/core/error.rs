//! Error taxonomy for queue and scheduler operations.

use thiserror::Error;

/// Errors produced by queue engine components.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed identifier or configuration value.
    #[error("validation error: {0}")]
    Validation(String),
    /// Entry, station, or session absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate active booking or precondition mismatch on a conditional update.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Store or network failure; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),
    /// Retries exhausted or unrecoverable failure.
    #[error("permanent error: {0}")]
    Permanent(String),
}

impl QueueError {
    /// Whether a retry may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
