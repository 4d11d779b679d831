//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the local event store contract.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced event does not exist.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// A transactional unit of work was rolled back.
    #[error("transaction rolled back: {0}")]
    RolledBack(String),

    /// Underlying storage failure.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors that can occur during sync operations.
///
/// Every variant is handled inside the worker and poller loops; nothing
/// escapes as an unhandled fault.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote rate-limited the request; transient, slows pacing.
    #[error("rate limited by remote")]
    RateLimited,

    /// The remote answered with an unexpected payload shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No credentials configured; the cycle is skipped before any
    /// network call.
    #[error("missing credentials")]
    MissingCredentials,

    /// Every submission attempt for a batch failed.
    #[error("retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Local event store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The stop signal fired during the operation.
    #[error("sync stopped")]
    Stopped,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error consumes a retry attempt rather than
    /// aborting the batch outright.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::RateLimited => true,
            SyncError::MalformedResponse(_) => true,
            _ => false,
        }
    }
}
