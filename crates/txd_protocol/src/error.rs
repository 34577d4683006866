//! Error types for the wire protocol.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded into a message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
