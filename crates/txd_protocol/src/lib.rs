//! # txd Protocol
//!
//! Wire format of the txd transaction service.
//!
//! This crate provides:
//! - [`TxRequest`] / [`TxResponse`] messages, one per service operation
//! - CBOR encoding via serde
//! - Length-prefixed framing over any byte stream
//! - The [`TxRequestHandler`] seam implemented by the server
//!
//! Domain failures travel as [`TxResponse::Error`]; anything that goes wrong
//! below that (I/O, framing, decoding) is a [`ProtocolError`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod handler;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    decode_frame_header, encode_frame_header, read_frame, write_frame, DEFAULT_MAX_FRAME_LEN,
    FRAME_HEADER_LEN,
};
pub use handler::TxRequestHandler;
pub use messages::{RemoteError, RemoteErrorKind, TxRequest, TxResponse};
