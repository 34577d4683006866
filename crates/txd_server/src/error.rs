//! Error types for the transaction service.

use thiserror::Error;
use txd_core::CoreError;
use txd_protocol::ProtocolError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the transaction service.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Transaction manager or snapshot failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Framing or codec failure on a connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
