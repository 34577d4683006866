//! Serve command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use txd_core::ManagerConfig;
use txd_server::{ServerConfig, TransactionService};

/// Options for `txd serve`.
#[derive(Debug)]
pub struct ServeOptions {
    /// Listen address.
    pub bind: SocketAddr,
    /// Snapshot directory.
    pub snapshot_dir: Option<PathBuf>,
    /// Seconds between snapshots.
    pub snapshot_interval: u64,
    /// Snapshot files to keep.
    pub snapshots_retained: usize,
    /// Seconds between timeout sweeps.
    pub cleanup_interval: u64,
    /// Default short transaction timeout in seconds.
    pub short_timeout: u64,
}

impl ServeOptions {
    fn config(&self) -> ServerConfig {
        let manager =
            ManagerConfig::new().default_short_timeout(Duration::from_secs(self.short_timeout));
        let mut config = ServerConfig::new(self.bind)
            .with_manager(manager)
            .with_snapshot_interval(Duration::from_secs(self.snapshot_interval))
            .with_snapshots_retained(self.snapshots_retained)
            .with_cleanup_interval(Duration::from_secs(self.cleanup_interval.max(1)));
        if let Some(dir) = &self.snapshot_dir {
            config = config.with_snapshot_dir(dir);
        }
        config
    }
}

/// Runs the service until Ctrl-C.
pub fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let service = Arc::new(TransactionService::new(options.config())?);
    service.start()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let listener = service.bind().await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
            let _ = shutdown_tx.send(true);
        });
        Arc::clone(&service).run(listener, shutdown_rx).await
    });

    service.stop()?;
    result?;
    Ok(())
}
