//! Error types for txd clients.

use std::io;
use thiserror::Error;
use txd_core::CoreError;
use txd_protocol::{ProtocolError, RemoteError, RemoteErrorKind};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// A failure below the transaction semantics: the call may be retried.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or codec failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The service answered with a response of the wrong kind.
    #[error("unexpected {response} response to {operation}")]
    UnexpectedResponse {
        /// Operation that was called.
        operation: &'static str,
        /// Kind of response received.
        response: &'static str,
    },

    /// No connection could be established.
    #[error("not connected: {0}")]
    NotConnected(String),
}

/// Errors returned to callers of a transaction system client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transaction is not open on the service.
    #[error("transaction {transaction_id} is not in progress: {message}")]
    NotInProgress {
        /// Transaction id the service looked up.
        transaction_id: i64,
        /// Service message.
        message: String,
    },

    /// A truncation would remove ids still needed by open transactions.
    #[error("invalid truncate time: {message}")]
    InvalidTruncateTime {
        /// Service message.
        message: String,
    },

    /// The service could not produce a snapshot.
    #[error("snapshot failed: {message}")]
    SnapshotFailed {
        /// Service message.
        message: String,
    },

    /// Any other failure reported by the service.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// Transport failures used up the retry budget.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Operation that was called.
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },

    /// The call was cancelled before it completed.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation that was called.
        operation: &'static str,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true for failures decided by the transaction manager.
    ///
    /// These are never retried.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            ClientError::NotInProgress { .. }
                | ClientError::InvalidTruncateTime { .. }
                | ClientError::SnapshotFailed { .. }
                | ClientError::Remote(_)
        )
    }
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            RemoteErrorKind::NotInProgress => ClientError::NotInProgress {
                transaction_id: err.transaction_id.unwrap_or_default(),
                message: err.message,
            },
            RemoteErrorKind::InvalidTruncateTime => ClientError::InvalidTruncateTime {
                message: err.message,
            },
            RemoteErrorKind::SnapshotFailed => ClientError::SnapshotFailed {
                message: err.message,
            },
            RemoteErrorKind::Internal => ClientError::Remote(err),
        }
    }
}

// Local calls map exactly like remote ones.
impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        ClientError::from(RemoteError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_and_remote_errors_map_alike() {
        let local = ClientError::from(CoreError::not_in_progress(9, false));
        assert!(matches!(
            local,
            ClientError::NotInProgress {
                transaction_id: 9,
                ..
            }
        ));
        assert!(local.is_domain());

        let local = ClientError::from(CoreError::invalid_truncate_time("early"));
        assert!(matches!(local, ClientError::InvalidTruncateTime { .. }));
    }

    #[test]
    fn exhausted_retries_keep_the_cause() {
        let err = ClientError::RetriesExhausted {
            operation: "commit",
            attempts: 3,
            source: TransportError::NotConnected("refused".into()),
        };
        assert!(!err.is_domain());
        assert_eq!(
            err.to_string(),
            "commit failed after 3 attempts: not connected: refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
