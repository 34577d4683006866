//! The operation set shared by every transaction system client.

use crate::error::ClientResult;
use std::io::Read;
use txd_core::{ChangeId, ServiceStatus, Transaction};

/// Operations a caller can issue against the transaction system.
///
/// Implemented by [`crate::LocalClient`] and
/// [`crate::TransactionServiceClient`]; both report the same failure kinds
/// for the same conditions, so callers need not care which one they hold.
pub trait TransactionSystemClient: Send + Sync {
    /// Starts a long-running transaction.
    fn start_long(&self) -> ClientResult<Transaction>;

    /// Starts a short transaction with the service default timeout.
    fn start_short(&self) -> ClientResult<Transaction>;

    /// Starts a short transaction that times out after `timeout_secs`.
    fn start_short_with_timeout(&self, timeout_secs: u32) -> ClientResult<Transaction>;

    /// Gives an open transaction a new write pointer.
    fn checkpoint(&self, tx: &Transaction) -> ClientResult<Transaction>;

    /// Checks `change_ids` for write-write conflicts.
    fn can_commit(&self, tx: &Transaction, change_ids: &[ChangeId]) -> ClientResult<bool>;

    /// Commits a transaction; false means the caller must abort.
    fn commit(&self, tx: &Transaction) -> ClientResult<bool>;

    /// Aborts a transaction.
    fn abort(&self, tx: &Transaction) -> ClientResult<()>;

    /// Moves an open transaction into the invalid set.
    fn invalidate(&self, write_pointer: i64) -> ClientResult<bool>;

    /// Removes ids from the invalid set.
    fn truncate_invalid_tx(&self, ids: &[i64]) -> ClientResult<bool>;

    /// Removes invalid ids started before `time_millis`.
    fn truncate_invalid_tx_before(&self, time_millis: i64) -> ClientResult<bool>;

    /// Returns the size of the invalid set.
    fn invalid_size(&self) -> ClientResult<usize>;

    /// Returns the encoded manager snapshot as a byte stream.
    fn snapshot_stream(&self) -> ClientResult<Box<dyn Read + Send>>;

    /// Returns whether the manager is running.
    fn status(&self) -> ClientResult<ServiceStatus>;

    /// Clears all manager state.
    fn reset_state(&self) -> ClientResult<()>;
}
