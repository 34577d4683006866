//! CLI command implementations.

pub mod admin;
pub mod check;
pub mod serve;
pub mod snapshot;

use txd_client::{ClientConfig, TransactionServiceClient};

/// Connects a remote client with the default retry policy.
pub fn connect(address: &str) -> TransactionServiceClient {
    TransactionServiceClient::new(ClientConfig::new(address))
}
