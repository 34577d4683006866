//! # txd Core
//!
//! Transaction coordination for snapshot-isolation (MVCC) storage.
//!
//! This crate provides:
//! - The immutable [`Transaction`] value and its visibility rules
//! - The [`TransactionManager`] state machine (write pointers, in-progress
//!   and invalid tracking, conflict detection, checkpoints, janitor sweep)
//! - Snapshot encoding and a snapshot directory for recovery
//!
//! ## Key Invariants
//!
//! - Write pointers are unique and strictly increasing, also across restores
//! - A transaction always sees its own writes
//! - Aborted and invalid writes are never visible to other transactions
//! - `commit` is the authoritative conflict check

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod snapshot;
mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ManagerConfig;
pub use error::{CoreError, CoreResult};
pub use snapshot::{SnapshotStore, TransactionSnapshot};
pub use transaction::{
    InProgressKind, InProgressTx, MalformedTransaction, Transaction, TransactionManager,
};
pub use types::{ChangeId, ServiceStatus, TransactionType, MAX_TX_PER_MS, NO_TX_IN_PROGRESS};
