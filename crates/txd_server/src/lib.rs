//! # txd Server
//!
//! TCP front end for the txd transaction manager.
//!
//! The service owns one [`TransactionManager`](txd_core::TransactionManager)
//! and exposes every manager operation over length-prefixed CBOR frames.
//! Background tasks invalidate timed out short transactions and persist
//! snapshots so a restarted service resumes with the same in-progress,
//! invalid and pointer state.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use txd_server::{ServerConfig, TransactionService};
//!
//! # async fn run() -> txd_server::ServerResult<()> {
//! let service = Arc::new(TransactionService::new(ServerConfig::default())?);
//! service.start()?;
//! let listener = service.bind().await?;
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! Arc::clone(&service).run(listener, shutdown_rx).await?;
//! service.stop()?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod service;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use service::TransactionService;
