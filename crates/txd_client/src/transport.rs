//! Connections to the transaction service.
//!
//! A [`ConnectionProvider`] hands out [`TxConnection`]s and takes them back.
//! The remote client borrows one per attempt through a guard that gives the
//! connection back when dropped, so a connection is never leaked, even when
//! the call panics. Broken connections are discarded instead.

use crate::error::TransportError;
use parking_lot::Mutex;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use txd_protocol::{read_frame, write_frame, TxRequest, TxRequestHandler, TxResponse};

/// One connection able to carry calls to the service.
pub trait TxConnection: Send {
    /// Sends a request and waits for its response.
    fn call(&mut self, request: &TxRequest) -> Result<TxResponse, TransportError>;
}

/// Source of connections, typically a pool.
///
/// Must be safe for concurrent borrow and return.
pub trait ConnectionProvider: Send + Sync {
    /// Borrows a connection.
    fn get(&self) -> Result<Box<dyn TxConnection>, TransportError>;

    /// Returns a healthy connection.
    ///
    /// Failures are the provider's to handle; they never reach the caller.
    fn release(&self, connection: Box<dyn TxConnection>);

    /// Drops a connection that failed.
    fn discard(&self, connection: Box<dyn TxConnection>) {
        drop(connection);
    }
}

/// A borrowed connection, returned to its provider on drop.
pub(crate) struct ConnectionGuard<'a> {
    provider: &'a dyn ConnectionProvider,
    connection: Option<Box<dyn TxConnection>>,
}

impl<'a> ConnectionGuard<'a> {
    /// Borrows a connection from `provider`.
    pub(crate) fn acquire(provider: &'a dyn ConnectionProvider) -> Result<Self, TransportError> {
        let connection = provider.get()?;
        Ok(Self {
            provider,
            connection: Some(connection),
        })
    }

    pub(crate) fn call(&mut self, request: &TxRequest) -> Result<TxResponse, TransportError> {
        match self.connection.as_mut() {
            Some(connection) => connection.call(request),
            None => Err(TransportError::NotConnected(
                "connection already released".into(),
            )),
        }
    }

    /// Drops the connection instead of returning it.
    pub(crate) fn discard(mut self) {
        if let Some(connection) = self.connection.take() {
            self.provider.discard(connection);
        }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.provider.release(connection);
        }
    }
}

/// A framed TCP connection.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    max_frame_len: usize,
}

impl TcpConnection {
    /// Connects to `address` with `timeout` for connecting, reading and writing.
    pub fn connect(
        address: &str,
        timeout: Duration,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let mut last_error = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected to transaction service");
                    return Ok(Self {
                        stream,
                        max_frame_len,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => TransportError::Io(e),
            None => TransportError::NotConnected(format!("{address} did not resolve")),
        })
    }
}

impl TxConnection for TcpConnection {
    fn call(&mut self, request: &TxRequest) -> Result<TxResponse, TransportError> {
        let body = request.encode()?;
        write_frame(&mut self.stream, &body, self.max_frame_len)?;
        let reply = read_frame(&mut self.stream, self.max_frame_len)?.ok_or_else(|| {
            TransportError::NotConnected("connection closed by transaction service".into())
        })?;
        Ok(TxResponse::decode(&reply)?)
    }
}

/// Pool of TCP connections to one service address.
pub struct TcpConnectionProvider {
    address: String,
    timeout: Duration,
    max_frame_len: usize,
    max_idle: usize,
    idle: Mutex<Vec<Box<dyn TxConnection>>>,
}

impl TcpConnectionProvider {
    /// Creates a pool for `address`.
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
        max_frame_len: usize,
        max_idle: usize,
    ) -> Self {
        Self {
            address: address.into(),
            timeout,
            max_frame_len,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Returns the service address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the number of idle pooled connections.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

impl ConnectionProvider for TcpConnectionProvider {
    fn get(&self) -> Result<Box<dyn TxConnection>, TransportError> {
        if let Some(connection) = self.idle.lock().pop() {
            return Ok(connection);
        }
        let connection = TcpConnection::connect(&self.address, self.timeout, self.max_frame_len)?;
        Ok(Box::new(connection))
    }

    fn release(&self, connection: Box<dyn TxConnection>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(connection);
        } else {
            trace!("idle pool full, closing connection");
        }
    }

    fn discard(&self, connection: Box<dyn TxConnection>) {
        debug!(address = %self.address, "discarding broken connection");
        drop(connection);
    }
}

impl std::fmt::Debug for TcpConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnectionProvider")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// In-process connections straight into a request handler.
///
/// Requests still go through the wire codec, so loopback clients exercise
/// the same encoding as TCP clients.
pub struct LoopbackProvider {
    handler: Arc<dyn TxRequestHandler>,
}

impl LoopbackProvider {
    /// Creates a provider serving calls with `handler`.
    pub fn new(handler: Arc<dyn TxRequestHandler>) -> Self {
        Self { handler }
    }
}

struct LoopbackConnection {
    handler: Arc<dyn TxRequestHandler>,
}

impl TxConnection for LoopbackConnection {
    fn call(&mut self, request: &TxRequest) -> Result<TxResponse, TransportError> {
        let body = request.encode()?;
        let reply = self.handler.handle_frame(&body)?;
        Ok(TxResponse::decode(&reply)?)
    }
}

impl ConnectionProvider for LoopbackProvider {
    fn get(&self) -> Result<Box<dyn TxConnection>, TransportError> {
        Ok(Box::new(LoopbackConnection {
            handler: Arc::clone(&self.handler),
        }))
    }

    fn release(&self, _connection: Box<dyn TxConnection>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        released: AtomicUsize,
        discarded: AtomicUsize,
    }

    struct NoopConnection;

    impl TxConnection for NoopConnection {
        fn call(&mut self, _request: &TxRequest) -> Result<TxResponse, TransportError> {
            Ok(TxResponse::Unit)
        }
    }

    impl ConnectionProvider for CountingProvider {
        fn get(&self) -> Result<Box<dyn TxConnection>, TransportError> {
            Ok(Box::new(NoopConnection))
        }

        fn release(&self, _connection: Box<dyn TxConnection>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn discard(&self, _connection: Box<dyn TxConnection>) {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        let provider = CountingProvider::default();
        {
            let mut guard = ConnectionGuard::acquire(&provider).unwrap();
            assert_eq!(guard.call(&TxRequest::Status).unwrap(), TxResponse::Unit);
        }
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert_eq!(provider.discarded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guard_discard_skips_release() {
        let provider = CountingProvider::default();
        ConnectionGuard::acquire(&provider).unwrap().discard();
        assert_eq!(provider.released.load(Ordering::SeqCst), 0);
        assert_eq!(provider.discarded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_releases_on_panic() {
        let provider = CountingProvider::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ConnectionGuard::acquire(&provider).unwrap();
            panic!("call blew up");
        }));
        assert!(result.is_err());
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tcp_connect_failure_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let provider = TcpConnectionProvider::new(address, Duration::from_millis(200), 1024, 2);
        assert!(provider.get().is_err());
        assert_eq!(provider.idle_count(), 0);
    }
}
