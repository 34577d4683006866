//! Transactions and the manager that coordinates them.
//!
//! The coordinator hands out write pointers, remembers which of them are
//! still open or invalid, and decides at commit time whether a transaction
//! raced with another one over the same change ids.
//!
//! - [`Transaction`] is the immutable value a client carries around
//! - [`TransactionManager`] is the single owner of the mutable state

mod in_progress;
mod manager;
mod state;

pub use in_progress::{InProgressKind, InProgressTx};
pub use manager::TransactionManager;
pub use state::{MalformedTransaction, Transaction};
