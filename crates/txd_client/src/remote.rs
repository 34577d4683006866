//! Retrying client for a remote transaction service.

use crate::config::{ClientConfig, RetryConfig};
use crate::error::{ClientError, ClientResult, TransportError};
use crate::retry::CancelToken;
use crate::system::TransactionSystemClient;
use crate::transport::{ConnectionGuard, ConnectionProvider, TcpConnectionProvider};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, error, warn};
use txd_core::{ChangeId, ServiceStatus, Transaction};
use txd_protocol::{TxRequest, TxResponse};

/// Client for a transaction service in another process.
///
/// Every call runs in its own retry loop:
/// - transport failures discard the connection and are retried per the
///   configured [`RetryConfig`]
/// - failures decided by the manager are returned at once, never retried
/// - the borrowed connection goes back to the pool on every other path
///
/// Calls share only the connection pool. To make a call cancellable, go
/// through [`cancellable`](Self::cancellable).
pub struct TransactionServiceClient {
    provider: Arc<dyn ConnectionProvider>,
    retry: RetryConfig,
}

impl TransactionServiceClient {
    /// Creates a client with a TCP connection pool.
    pub fn new(config: ClientConfig) -> Self {
        let provider = TcpConnectionProvider::new(
            config.address,
            config.timeout,
            config.max_frame_len,
            config.max_idle_connections,
        );
        Self::with_provider(Arc::new(provider), config.retry)
    }

    /// Creates a client over any connection provider.
    pub fn with_provider(provider: Arc<dyn ConnectionProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    /// Returns the retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns a view of this client whose calls stop once `token` is cancelled.
    ///
    /// A call waiting between retries wakes up and fails with
    /// [`ClientError::Cancelled`]; no further attempts are made. Other calls
    /// on the same client are unaffected.
    pub fn cancellable<'a>(&'a self, token: &'a CancelToken) -> CancellableClient<'a> {
        CancellableClient {
            client: self,
            cancel: Some(token),
        }
    }

    fn uncancellable(&self) -> CancellableClient<'_> {
        CancellableClient {
            client: self,
            cancel: None,
        }
    }

    /// Runs `request` with retries, turning the response into `T` with `extract`.
    ///
    /// `extract` returns `None` for a response of the wrong kind, which is
    /// handled like a transport failure.
    fn execute<T>(
        &self,
        request: TxRequest,
        cancel: Option<&CancelToken>,
        extract: impl Fn(TxResponse) -> Option<T>,
    ) -> ClientResult<T> {
        let operation = request.operation();
        let cancelled = || cancel.is_some_and(CancelToken::is_cancelled);
        let mut strategy = self.retry.strategy();
        let mut attempts = 0u32;

        loop {
            if cancelled() {
                return Err(ClientError::Cancelled { operation });
            }
            attempts += 1;

            let failure = match self.attempt(operation, &request, &extract) {
                Ok(result) => return result,
                Err(failure) => failure,
            };

            if !strategy.fail_once() {
                error!(operation, attempts, error = %failure, "giving up on transaction service call");
                return Err(ClientError::RetriesExhausted {
                    operation,
                    attempts,
                    source: failure,
                });
            }

            let delay = strategy.next_delay();
            warn!(operation, attempts, ?delay, error = %failure, "transaction service call failed, retrying");
            match cancel {
                Some(token) => {
                    if token.wait(delay) {
                        return Err(ClientError::Cancelled { operation });
                    }
                }
                None if !delay.is_zero() => std::thread::sleep(delay),
                None => {}
            }
        }
    }

    /// Makes one attempt.
    ///
    /// The outer error is a transport failure; the inner result is the
    /// answer of the manager, domain failures included.
    fn attempt<T>(
        &self,
        operation: &'static str,
        request: &TxRequest,
        extract: &impl Fn(TxResponse) -> Option<T>,
    ) -> Result<ClientResult<T>, TransportError> {
        let mut connection = ConnectionGuard::acquire(self.provider.as_ref())?;
        let response = match connection.call(request) {
            Ok(response) => response,
            Err(e) => {
                connection.discard();
                return Err(e);
            }
        };

        if let TxResponse::Error(remote) = response {
            debug!(operation, error = %remote, "transaction service rejected call");
            return Ok(Err(ClientError::from(remote)));
        }

        let kind = response.kind();
        match extract(response) {
            Some(value) => Ok(Ok(value)),
            None => {
                connection.discard();
                Err(TransportError::UnexpectedResponse {
                    operation,
                    response: kind,
                })
            }
        }
    }
}

impl std::fmt::Debug for TransactionServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionServiceClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// A [`TransactionServiceClient`] bound to a [`CancelToken`].
#[derive(Debug, Clone, Copy)]
pub struct CancellableClient<'a> {
    client: &'a TransactionServiceClient,
    cancel: Option<&'a CancelToken>,
}

impl CancellableClient<'_> {
    fn execute<T>(
        &self,
        request: TxRequest,
        extract: impl Fn(TxResponse) -> Option<T>,
    ) -> ClientResult<T> {
        self.client.execute(request, self.cancel, extract)
    }
}

fn transaction(response: TxResponse) -> Option<Transaction> {
    match response {
        TxResponse::Transaction(tx) => Some(tx),
        _ => None,
    }
}

fn boolean(response: TxResponse) -> Option<bool> {
    match response {
        TxResponse::Bool(value) => Some(value),
        _ => None,
    }
}

fn unit(response: TxResponse) -> Option<()> {
    match response {
        TxResponse::Unit => Some(()),
        _ => None,
    }
}

impl TransactionSystemClient for CancellableClient<'_> {
    fn start_long(&self) -> ClientResult<Transaction> {
        self.execute(TxRequest::StartLong, transaction)
    }

    fn start_short(&self) -> ClientResult<Transaction> {
        self.execute(TxRequest::StartShort { timeout_secs: None }, transaction)
    }

    fn start_short_with_timeout(&self, timeout_secs: u32) -> ClientResult<Transaction> {
        self.execute(
            TxRequest::StartShort {
                timeout_secs: Some(timeout_secs),
            },
            transaction,
        )
    }

    fn checkpoint(&self, tx: &Transaction) -> ClientResult<Transaction> {
        self.execute(TxRequest::Checkpoint { tx: tx.clone() }, transaction)
    }

    fn can_commit(&self, tx: &Transaction, change_ids: &[ChangeId]) -> ClientResult<bool> {
        self.execute(
            TxRequest::CanCommit {
                tx: tx.clone(),
                change_ids: change_ids.to_vec(),
            },
            boolean,
        )
    }

    fn commit(&self, tx: &Transaction) -> ClientResult<bool> {
        self.execute(TxRequest::Commit { tx: tx.clone() }, boolean)
    }

    fn abort(&self, tx: &Transaction) -> ClientResult<()> {
        self.execute(TxRequest::Abort { tx: tx.clone() }, unit)
    }

    fn invalidate(&self, write_pointer: i64) -> ClientResult<bool> {
        self.execute(TxRequest::Invalidate { write_pointer }, boolean)
    }

    fn truncate_invalid_tx(&self, ids: &[i64]) -> ClientResult<bool> {
        self.execute(TxRequest::TruncateInvalidTx { ids: ids.to_vec() }, boolean)
    }

    fn truncate_invalid_tx_before(&self, time_millis: i64) -> ClientResult<bool> {
        self.execute(TxRequest::TruncateInvalidTxBefore { time_millis }, boolean)
    }

    fn invalid_size(&self) -> ClientResult<usize> {
        self.execute(TxRequest::GetInvalidSize, |response| match response {
            TxResponse::Size(size) => usize::try_from(size).ok(),
            _ => None,
        })
    }

    fn snapshot_stream(&self) -> ClientResult<Box<dyn Read + Send>> {
        let bytes = self.execute(TxRequest::GetSnapshot, |response| match response {
            TxResponse::Snapshot(bytes) => Some(bytes),
            _ => None,
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn status(&self) -> ClientResult<ServiceStatus> {
        self.execute(TxRequest::Status, |response| match response {
            TxResponse::Status(status) => Some(status),
            _ => None,
        })
    }

    fn reset_state(&self) -> ClientResult<()> {
        self.execute(TxRequest::ResetState, unit)
    }
}

impl TransactionSystemClient for TransactionServiceClient {
    fn start_long(&self) -> ClientResult<Transaction> {
        self.uncancellable().start_long()
    }

    fn start_short(&self) -> ClientResult<Transaction> {
        self.uncancellable().start_short()
    }

    fn start_short_with_timeout(&self, timeout_secs: u32) -> ClientResult<Transaction> {
        self.uncancellable().start_short_with_timeout(timeout_secs)
    }

    fn checkpoint(&self, tx: &Transaction) -> ClientResult<Transaction> {
        self.uncancellable().checkpoint(tx)
    }

    fn can_commit(&self, tx: &Transaction, change_ids: &[ChangeId]) -> ClientResult<bool> {
        self.uncancellable().can_commit(tx, change_ids)
    }

    fn commit(&self, tx: &Transaction) -> ClientResult<bool> {
        self.uncancellable().commit(tx)
    }

    fn abort(&self, tx: &Transaction) -> ClientResult<()> {
        self.uncancellable().abort(tx)
    }

    fn invalidate(&self, write_pointer: i64) -> ClientResult<bool> {
        self.uncancellable().invalidate(write_pointer)
    }

    fn truncate_invalid_tx(&self, ids: &[i64]) -> ClientResult<bool> {
        self.uncancellable().truncate_invalid_tx(ids)
    }

    fn truncate_invalid_tx_before(&self, time_millis: i64) -> ClientResult<bool> {
        self.uncancellable().truncate_invalid_tx_before(time_millis)
    }

    fn invalid_size(&self) -> ClientResult<usize> {
        self.uncancellable().invalid_size()
    }

    fn snapshot_stream(&self) -> ClientResult<Box<dyn Read + Send>> {
        self.uncancellable().snapshot_stream()
    }

    fn status(&self) -> ClientResult<ServiceStatus> {
        self.uncancellable().status()
    }

    fn reset_state(&self) -> ClientResult<()> {
        self.uncancellable().reset_state()
    }
}
