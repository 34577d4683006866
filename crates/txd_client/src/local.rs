//! In-process client.

use crate::error::{ClientError, ClientResult};
use crate::system::TransactionSystemClient;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use txd_core::{ChangeId, CoreError, ServiceStatus, Transaction, TransactionManager};

/// Client calling a [`TransactionManager`] in the same process.
///
/// No retries, no pooling. Failures map to the same kinds as with the
/// remote client. `can_commit` with no change ids answers true without
/// consulting the manager.
#[derive(Debug, Clone)]
pub struct LocalClient {
    manager: Arc<TransactionManager>,
}

impl LocalClient {
    /// Creates a client for `manager`.
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self { manager }
    }

    /// Returns the underlying manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }
}

impl TransactionSystemClient for LocalClient {
    fn start_long(&self) -> ClientResult<Transaction> {
        Ok(self.manager.start_long())
    }

    fn start_short(&self) -> ClientResult<Transaction> {
        Ok(self.manager.start_short())
    }

    fn start_short_with_timeout(&self, timeout_secs: u32) -> ClientResult<Transaction> {
        Ok(self
            .manager
            .start_short_with_timeout(Duration::from_secs(u64::from(timeout_secs))))
    }

    fn checkpoint(&self, tx: &Transaction) -> ClientResult<Transaction> {
        Ok(self.manager.checkpoint(tx)?)
    }

    fn can_commit(&self, tx: &Transaction, change_ids: &[ChangeId]) -> ClientResult<bool> {
        if change_ids.is_empty() {
            return Ok(true);
        }
        Ok(self.manager.can_commit(tx, change_ids)?)
    }

    fn commit(&self, tx: &Transaction) -> ClientResult<bool> {
        Ok(self.manager.commit(tx)?)
    }

    fn abort(&self, tx: &Transaction) -> ClientResult<()> {
        self.manager.abort(tx);
        Ok(())
    }

    fn invalidate(&self, write_pointer: i64) -> ClientResult<bool> {
        Ok(self.manager.invalidate(write_pointer))
    }

    fn truncate_invalid_tx(&self, ids: &[i64]) -> ClientResult<bool> {
        Ok(self.manager.truncate_invalid_tx(ids))
    }

    fn truncate_invalid_tx_before(&self, time_millis: i64) -> ClientResult<bool> {
        Ok(self.manager.truncate_invalid_tx_before(time_millis)?)
    }

    fn invalid_size(&self) -> ClientResult<usize> {
        Ok(self.manager.invalid_size())
    }

    fn snapshot_stream(&self) -> ClientResult<Box<dyn Read + Send>> {
        let mut bytes = Vec::new();
        if !self.manager.take_snapshot(&mut bytes)? {
            return Err(ClientError::from(CoreError::snapshot_failed(
                "transaction manager is not running",
            )));
        }
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn status(&self) -> ClientResult<ServiceStatus> {
        Ok(ServiceStatus::from_running(self.manager.is_running()))
    }

    fn reset_state(&self) -> ClientResult<()> {
        self.manager.reset_state();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txd_core::{ManagerConfig, TransactionSnapshot};

    fn client() -> LocalClient {
        let manager = Arc::new(TransactionManager::new(ManagerConfig::default()));
        manager.start();
        LocalClient::new(manager)
    }

    #[test]
    fn commit_cycle() {
        let client = client();
        let tx = client.start_short().unwrap();
        assert!(client
            .can_commit(&tx, &[ChangeId::from("row")])
            .unwrap());
        assert!(client.commit(&tx).unwrap());
        assert!(matches!(
            client.commit(&tx),
            Err(ClientError::NotInProgress { .. })
        ));
    }

    #[test]
    fn empty_can_commit_short_circuits() {
        let client = client();
        let tx = client.start_short().unwrap();
        client.abort(&tx).unwrap();
        // The manager would refuse a closed transaction; the empty check never asks.
        assert!(client.can_commit(&tx, &[]).unwrap());
    }

    #[test]
    fn snapshot_stream_decodes() {
        let client = client();
        let tx = client.start_long().unwrap();
        let snapshot = TransactionSnapshot::decode(client.snapshot_stream().unwrap()).unwrap();
        assert!(snapshot.in_progress.contains_key(&tx.write_pointer()));
    }

    #[test]
    fn stopped_manager_reports_not_ok() {
        let client = client();
        assert_eq!(client.status().unwrap(), ServiceStatus::Ok);
        client.manager().stop();
        assert_eq!(client.status().unwrap(), ServiceStatus::NotOk);
        assert!(matches!(
            client.snapshot_stream(),
            Err(ClientError::SnapshotFailed { .. })
        ));
    }

    #[test]
    fn truncate_before_maps_domain_error() {
        let client = client();
        client.start_short().unwrap();
        let err = client.truncate_invalid_tx_before(i64::MAX / 2_000_000).unwrap_err();
        assert!(matches!(err, ClientError::InvalidTruncateTime { .. }));
        assert!(err.is_domain());
    }
}
