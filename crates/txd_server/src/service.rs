//! Transaction service lifecycle and TCP accept loop.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::RequestHandler;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use txd_core::{SnapshotStore, TransactionManager};
use txd_protocol::{decode_frame_header, encode_frame_header, TxRequestHandler, FRAME_HEADER_LEN};

/// A transaction service: one manager, its snapshot store and a TCP front end.
///
/// Lifecycle: [`start`](Self::start) restores the latest snapshot and opens
/// the manager, [`run`](Self::run) serves connections until shutdown is
/// signalled, and [`stop`](Self::stop) writes a final snapshot.
#[derive(Debug)]
pub struct TransactionService {
    config: ServerConfig,
    manager: Arc<TransactionManager>,
    handler: Arc<RequestHandler>,
    store: Option<SnapshotStore>,
}

impl TransactionService {
    /// Creates a service with a fresh manager.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let manager = Arc::new(TransactionManager::new(config.manager.clone()));
        Self::with_manager(config, manager)
    }

    /// Creates a service around an existing manager.
    pub fn with_manager(
        config: ServerConfig,
        manager: Arc<TransactionManager>,
    ) -> ServerResult<Self> {
        let store = match &config.snapshot_dir {
            Some(dir) => Some(SnapshotStore::open(dir)?),
            None => None,
        };
        Ok(Self {
            handler: Arc::new(RequestHandler::new(Arc::clone(&manager))),
            config,
            manager,
            store,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the manager.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Returns the request handler.
    pub fn handler(&self) -> Arc<RequestHandler> {
        Arc::clone(&self.handler)
    }

    /// Restores the latest snapshot, if any, and starts the manager.
    pub fn start(&self) -> ServerResult<()> {
        if let Some(store) = &self.store {
            if let Some(snapshot) = store.latest()? {
                self.manager.restore(snapshot);
            }
        }
        self.manager.start();
        info!("transaction manager started");
        Ok(())
    }

    /// Writes a final snapshot and stops the manager.
    pub fn stop(&self) -> ServerResult<()> {
        let result = self.write_snapshot();
        self.manager.stop();
        info!("transaction manager stopped");
        result.map(|_| ())
    }

    /// Writes a snapshot and prunes old files.
    ///
    /// Returns `None` when no snapshot directory is configured.
    pub fn write_snapshot(&self) -> ServerResult<Option<PathBuf>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let path = store.write(&self.manager.snapshot())?;
        let removed = store.prune(self.config.snapshots_retained)?;
        debug!(path = %path.display(), removed, "snapshot written");
        Ok(Some(path))
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Serves connections on `listener` until `shutdown` turns true.
    ///
    /// Background tasks invalidate timed out transactions and write periodic
    /// snapshots while the loop runs.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> ServerResult<()> {
        info!(addr = %listener.local_addr()?, "transaction service listening");

        let mut background = JoinSet::new();
        background.spawn(Arc::clone(&self).janitor());
        if self.store.is_some() {
            background.spawn(Arc::clone(&self).snapshotter());
        }

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "connection accepted");
                            let handler = self.handler();
                            let max_frame_len = self.config.max_frame_len;
                            connections.spawn(async move {
                                if let Err(e) = serve_connection(stream, handler, max_frame_len).await {
                                    warn!(%peer, error = %e, "connection closed with error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                // Reap finished connection tasks.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("transaction service shutting down");
        connections.shutdown().await;
        background.shutdown().await;
        Ok(())
    }

    async fn janitor(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.cleanup_interval);
        loop {
            ticker.tick().await;
            self.manager.cleanup_timed_out();
        }
    }

    async fn snapshotter(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.snapshot_interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let service = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || service.write_snapshot()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "periodic snapshot failed"),
                Err(e) => error!(error = %e, "snapshot task panicked"),
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<RequestHandler>,
    max_frame_len: usize,
) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    while let Some(body) = read_frame(&mut stream, max_frame_len).await? {
        let reply = handler.handle_frame(&body)?;
        write_frame(&mut stream, &reply, max_frame_len).await?;
    }
    Ok(())
}

/// Reads one frame; `None` on a clean end of stream.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_len: usize,
) -> ServerResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = decode_frame_header(header, max_frame_len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
    max_frame_len: usize,
) -> ServerResult<()> {
    let header = encode_frame_header(body.len(), max_frame_len)?;
    writer.write_all(&header).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
