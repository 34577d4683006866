//! Error types for txd core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in transaction manager operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced transaction is not open.
    #[error("transaction {transaction_id} is not in progress (invalidated: {invalidated})")]
    NotInProgress {
        /// Transaction id that was looked up.
        transaction_id: i64,
        /// Whether the transaction is known to be invalid.
        invalidated: bool,
    },

    /// A truncation request would drop history still needed by open transactions.
    #[error("invalid truncate time: {message}")]
    InvalidTruncateTime {
        /// Description of why the cutoff was rejected.
        message: String,
    },

    /// A snapshot could not be produced.
    #[error("could not take snapshot: {message}")]
    SnapshotFailed {
        /// Description of the failure.
        message: String,
    },

    /// Snapshot bytes are corrupted or of an unknown format.
    #[error("snapshot corruption: {message}")]
    SnapshotCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a not-in-progress error.
    pub fn not_in_progress(transaction_id: i64, invalidated: bool) -> Self {
        Self::NotInProgress {
            transaction_id,
            invalidated,
        }
    }

    /// Creates an invalid truncate time error.
    pub fn invalid_truncate_time(message: impl Into<String>) -> Self {
        Self::InvalidTruncateTime {
            message: message.into(),
        }
    }

    /// Creates a snapshot failed error.
    pub fn snapshot_failed(message: impl Into<String>) -> Self {
        Self::SnapshotFailed {
            message: message.into(),
        }
    }

    /// Creates a snapshot corruption error.
    pub fn snapshot_corruption(message: impl Into<String>) -> Self {
        Self::SnapshotCorruption {
            message: message.into(),
        }
    }
}
