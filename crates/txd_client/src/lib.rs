//! # txd Client
//!
//! Clients for the txd transaction service.
//!
//! This crate provides:
//! - The [`TransactionSystemClient`] operation set
//! - [`TransactionServiceClient`], a remote client that retries transport
//!   failures per a [`RetryConfig`] and never retries domain failures
//! - [`LocalClient`], an in-process client with the same failure mapping
//! - Connection providers: a TCP pool and an in-process loopback
//!
//! ## Key Invariants
//!
//! - Each logical call builds a fresh [`RetryStrategy`]
//! - A borrowed connection is always returned or discarded, never leaked
//! - Domain failures (`NotInProgress`, `InvalidTruncateTime`,
//!   `SnapshotFailed`) reach the caller after exactly one attempt

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod local;
mod remote;
mod retry;
mod system;
mod transport;

pub use config::{
    BackoffConfig, ClientConfig, RetryConfig, PROP_BACKOFF_FACTOR, PROP_BACKOFF_INITIAL,
    PROP_BACKOFF_LIMIT, PROP_BACKOFF_MAX_ATTEMPTS, PROP_BACKOFF_MAX_ELAPSED, PROP_CLIENT_TIMEOUT,
    PROP_RETRY_ATTEMPTS, PROP_RETRY_STRATEGY,
};
pub use error::{ClientError, ClientResult, TransportError};
pub use local::LocalClient;
pub use remote::{CancellableClient, TransactionServiceClient};
pub use retry::{CancelToken, RetryStrategy};
pub use system::TransactionSystemClient;
pub use transport::{
    ConnectionProvider, LoopbackProvider, TcpConnection, TcpConnectionProvider, TxConnection,
};
