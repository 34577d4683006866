//! End-to-end tests of the TCP transaction service.

mod common;

use common::RunningService;
use std::io::Read;
use std::time::Duration;
use txd_client::{
    ClientConfig, ClientError, RetryConfig, TransactionServiceClient, TransactionSystemClient,
};
use txd_core::{ChangeId, ServiceStatus, TransactionSnapshot};
use txd_server::ServerConfig;

fn client(running: &RunningService) -> TransactionServiceClient {
    TransactionServiceClient::new(
        ClientConfig::new(running.addr.to_string())
            .with_retry(RetryConfig::n_times(3))
            .with_timeout(Duration::from_secs(5)),
    )
}

#[test]
fn commit_and_conflict_over_tcp() {
    let running = RunningService::start(ServerConfig::default());
    let client = client(&running);

    assert_eq!(client.status().unwrap(), ServiceStatus::Ok);

    let first = client.start_short().unwrap();
    let second = client.start_short().unwrap();
    assert!(second.write_pointer() > first.write_pointer());
    assert!(second.in_progress().contains(&first.write_pointer()));

    let keys = [ChangeId::from("row-1")];
    assert!(client.can_commit(&first, &keys).unwrap());
    assert!(client.commit(&first).unwrap());
    assert!(!client.can_commit(&second, &keys).unwrap());
    client.abort(&second).unwrap();

    let err = client.commit(&first).unwrap_err();
    assert!(matches!(
        err,
        ClientError::NotInProgress { transaction_id, .. } if transaction_id == first.transaction_id()
    ));

    running.stop();
}

#[test]
fn snapshot_stream_decodes() {
    let running = RunningService::start(ServerConfig::default());
    let client = client(&running);

    let long = client.start_long().unwrap();
    let mut bytes = Vec::new();
    client
        .snapshot_stream()
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    let snapshot = TransactionSnapshot::from_bytes(&bytes).unwrap();
    assert!(snapshot.in_progress.contains_key(&long.write_pointer()));

    running.stop();
}

#[test]
fn janitor_invalidates_timed_out_transactions() {
    let running = RunningService::start(
        ServerConfig::default().with_cleanup_interval(Duration::from_millis(100)),
    );
    let client = client(&running);

    let short = client.start_short_with_timeout(1).unwrap();
    let long = client.start_long().unwrap();
    std::thread::sleep(Duration::from_millis(1600));

    assert_eq!(client.invalid_size().unwrap(), 1);
    assert!(matches!(
        client.commit(&short),
        Err(ClientError::NotInProgress { .. })
    ));
    assert!(client.commit(&long).unwrap());

    let next = client.start_short().unwrap();
    assert!(next.invalids().contains(&short.write_pointer()));

    running.stop();
}

#[test]
fn restarted_service_resumes_from_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::default().with_snapshot_dir(dir.path());

    let running = RunningService::start(config.clone());
    let long = client(&running).start_long().unwrap();
    running.stop();

    let running = RunningService::start(config);
    let client = client(&running);
    let next = client.start_short().unwrap();
    assert!(next.write_pointer() > long.write_pointer());
    assert!(next.in_progress().contains(&long.write_pointer()));
    assert!(client.commit(&long).unwrap());

    running.stop();
}

#[test]
fn unreachable_service_exhausts_retries() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = TransactionServiceClient::new(
        ClientConfig::new(addr.to_string())
            .with_retry(RetryConfig::n_times(2))
            .with_timeout(Duration::from_millis(500)),
    );

    match client.start_long() {
        Err(ClientError::RetriesExhausted {
            operation,
            attempts,
            ..
        }) => {
            assert_eq!(operation, "startLong");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected result {other:?}"),
    }
}
