//! Shared harness for service tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use txd_client::{ClientError, ClientResult, TransactionSystemClient};
use txd_core::ChangeId;
use txd_server::{ServerConfig, TransactionService};

/// A service running on an ephemeral port.
pub struct RunningService {
    pub service: Arc<TransactionService>,
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    runtime: Runtime,
}

impl RunningService {
    pub fn start(config: ServerConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..config
        };
        let service = Arc::new(TransactionService::new(config).unwrap());
        service.start().unwrap();

        let listener = runtime.block_on(service.bind()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);
        runtime.spawn(Arc::clone(&service).run(listener, shutdown_rx));

        Self {
            service,
            addr,
            shutdown,
            runtime,
        }
    }

    pub fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.service.stop().unwrap();
        self.runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    }
}

/// Summarizes a call outcome without pointer values.
pub fn outcome<T: std::fmt::Debug>(result: ClientResult<T>) -> String {
    match result {
        Ok(value) => format!("ok {value:?}"),
        Err(ClientError::NotInProgress { .. }) => "not_in_progress".into(),
        Err(ClientError::InvalidTruncateTime { .. }) => "invalid_truncate_time".into(),
        Err(ClientError::SnapshotFailed { .. }) => "snapshot_failed".into(),
        Err(other) => format!("error {other}"),
    }
}

fn ids(keys: &[&str]) -> Vec<ChangeId> {
    keys.iter().map(|k| ChangeId::from(*k)).collect()
}

/// Runs a fixed workload and records every outcome.
pub fn run_script(client: &dyn TransactionSystemClient) -> Vec<String> {
    let mut log = Vec::new();

    let tx1 = client.start_short().unwrap();
    let tx2 = client.start_short().unwrap();
    log.push(outcome(client.can_commit(&tx1, &ids(&["a", "b"]))));
    log.push(outcome(client.commit(&tx1)));
    // tx2 started before tx1 committed and touches "b".
    log.push(outcome(client.can_commit(&tx2, &ids(&["b", "c"]))));
    log.push(outcome(client.abort(&tx2)));
    log.push(outcome(client.commit(&tx1)));

    let tx3 = client.start_long().unwrap();
    let checkpoint = client.checkpoint(&tx3).unwrap();
    log.push(format!(
        "checkpoint advances {}",
        checkpoint.write_pointer() > tx3.write_pointer()
    ));
    log.push(outcome(client.can_commit(&checkpoint, &ids(&["d"]))));
    log.push(outcome(client.commit(&checkpoint)));
    log.push(outcome(client.checkpoint(&tx3)));

    let tx4 = client.start_short().unwrap();
    log.push(outcome(client.invalidate(tx4.write_pointer())));
    log.push(outcome(client.invalidate(tx4.write_pointer())));
    log.push(outcome(client.commit(&tx4)));
    log.push(outcome(client.invalid_size()));
    log.push(outcome(client.truncate_invalid_tx(&[tx4.write_pointer()])));
    log.push(outcome(client.invalid_size()));

    let tx5 = client.start_short().unwrap();
    log.push(outcome(client.truncate_invalid_tx_before(i64::MAX / 2_000_000)));
    log.push(outcome(client.abort(&tx5)));
    log.push(outcome(client.truncate_invalid_tx_before(0)));

    log.push(outcome(client.status()));
    log.push(outcome(client.reset_state()));
    log.push(outcome(client.invalid_size()));
    log
}
