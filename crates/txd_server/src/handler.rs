//! Maps wire requests onto the transaction manager.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use txd_core::{CoreError, ServiceStatus, TransactionManager};
use txd_protocol::{TxRequest, TxRequestHandler, TxResponse};

/// Request handler backed by a [`TransactionManager`].
#[derive(Debug, Clone)]
pub struct RequestHandler {
    manager: Arc<TransactionManager>,
}

impl RequestHandler {
    /// Creates a handler for `manager`.
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self { manager }
    }

    /// Returns the manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    fn snapshot(&self) -> TxResponse {
        let mut bytes = Vec::new();
        match self.manager.take_snapshot(&mut bytes) {
            Ok(true) => TxResponse::Snapshot(bytes),
            Ok(false) => {
                CoreError::snapshot_failed("transaction manager is not running").into()
            }
            Err(e) => CoreError::snapshot_failed(e.to_string()).into(),
        }
    }
}

impl TxRequestHandler for RequestHandler {
    fn handle(&self, request: TxRequest) -> TxResponse {
        debug!(operation = request.operation(), "handling request");
        let manager = &self.manager;
        match request {
            TxRequest::StartLong => TxResponse::Transaction(manager.start_long()),
            TxRequest::StartShort { timeout_secs } => TxResponse::Transaction(match timeout_secs {
                Some(secs) => manager.start_short_with_timeout(Duration::from_secs(u64::from(secs))),
                None => manager.start_short(),
            }),
            TxRequest::Checkpoint { tx } => manager
                .checkpoint(&tx)
                .map_or_else(TxResponse::from, TxResponse::Transaction),
            TxRequest::CanCommit { tx, change_ids } => manager
                .can_commit(&tx, &change_ids)
                .map_or_else(TxResponse::from, TxResponse::Bool),
            TxRequest::Commit { tx } => manager
                .commit(&tx)
                .map_or_else(TxResponse::from, TxResponse::Bool),
            TxRequest::Abort { tx } => {
                manager.abort(&tx);
                TxResponse::Unit
            }
            TxRequest::Invalidate { write_pointer } => {
                TxResponse::Bool(manager.invalidate(write_pointer))
            }
            TxRequest::TruncateInvalidTx { ids } => {
                TxResponse::Bool(manager.truncate_invalid_tx(&ids))
            }
            TxRequest::TruncateInvalidTxBefore { time_millis } => manager
                .truncate_invalid_tx_before(time_millis)
                .map_or_else(TxResponse::from, TxResponse::Bool),
            TxRequest::GetInvalidSize => TxResponse::Size(manager.invalid_size() as u64),
            TxRequest::GetSnapshot => self.snapshot(),
            TxRequest::Status => TxResponse::Status(ServiceStatus::from_running(manager.is_running())),
            TxRequest::ResetState => {
                manager.reset_state();
                TxResponse::Unit
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txd_core::{ChangeId, ManagerConfig, TransactionSnapshot};
    use txd_protocol::RemoteErrorKind;

    fn handler() -> RequestHandler {
        let manager = Arc::new(TransactionManager::new(ManagerConfig::default()));
        manager.start();
        RequestHandler::new(manager)
    }

    fn start(handler: &RequestHandler) -> txd_core::Transaction {
        match handler.handle(TxRequest::StartShort { timeout_secs: Some(5) }) {
            TxResponse::Transaction(tx) => tx,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn commit_flow() {
        let handler = handler();
        let tx = start(&handler);
        let response = handler.handle(TxRequest::CanCommit {
            tx: tx.clone(),
            change_ids: vec![ChangeId::from("a")],
        });
        assert_eq!(response, TxResponse::Bool(true));
        assert_eq!(
            handler.handle(TxRequest::Commit { tx: tx.clone() }),
            TxResponse::Bool(true)
        );

        match handler.handle(TxRequest::Commit { tx }) {
            TxResponse::Error(err) => assert_eq!(err.kind, RemoteErrorKind::NotInProgress),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn invalid_set_operations() {
        let handler = handler();
        let tx = start(&handler);
        assert_eq!(
            handler.handle(TxRequest::Invalidate {
                write_pointer: tx.write_pointer()
            }),
            TxResponse::Bool(true)
        );
        assert_eq!(handler.handle(TxRequest::GetInvalidSize), TxResponse::Size(1));
        assert_eq!(
            handler.handle(TxRequest::TruncateInvalidTx {
                ids: vec![tx.write_pointer()]
            }),
            TxResponse::Bool(true)
        );
        assert_eq!(handler.handle(TxRequest::GetInvalidSize), TxResponse::Size(0));
    }

    #[test]
    fn truncate_before_reports_domain_error() {
        let handler = handler();
        start(&handler);
        match handler.handle(TxRequest::TruncateInvalidTxBefore {
            time_millis: i64::MAX / 2_000_000,
        }) {
            TxResponse::Error(err) => assert_eq!(err.kind, RemoteErrorKind::InvalidTruncateTime),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn snapshot_and_status() {
        let handler = handler();
        let tx = start(&handler);
        match handler.handle(TxRequest::GetSnapshot) {
            TxResponse::Snapshot(bytes) => {
                let snapshot = TransactionSnapshot::from_bytes(&bytes).unwrap();
                assert!(snapshot.in_progress.contains_key(&tx.write_pointer()));
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(
            handler.handle(TxRequest::Status),
            TxResponse::Status(ServiceStatus::Ok)
        );

        handler.manager().stop();
        assert_eq!(
            handler.handle(TxRequest::Status),
            TxResponse::Status(ServiceStatus::NotOk)
        );
        match handler.handle(TxRequest::GetSnapshot) {
            TxResponse::Error(err) => assert_eq!(err.kind, RemoteErrorKind::SnapshotFailed),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn reset_clears_state() {
        let handler = handler();
        start(&handler);
        assert_eq!(handler.handle(TxRequest::ResetState), TxResponse::Unit);
        assert_eq!(handler.manager().in_progress_count(), 0);
    }
}
