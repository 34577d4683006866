//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use txd_core::ManagerConfig;
use txd_protocol::DEFAULT_MAX_FRAME_LEN;

/// Default service port.
pub const DEFAULT_PORT: u16 = 15165;

/// Configuration for the transaction service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Transaction manager settings.
    pub manager: ManagerConfig,
    /// Directory for snapshot files; no persistence when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// How often a snapshot is written.
    pub snapshot_interval: Duration,
    /// Snapshot files kept after each write.
    pub snapshots_retained: usize,
    /// How often timed out transactions are invalidated.
    pub cleanup_interval: Duration,
    /// Largest accepted request frame.
    pub max_frame_len: usize,
}

impl ServerConfig {
    /// Creates a configuration binding to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            manager: ManagerConfig::default(),
            snapshot_dir: None,
            snapshot_interval: Duration::from_secs(300),
            snapshots_retained: 10,
            cleanup_interval: Duration::from_secs(10),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the transaction manager settings.
    pub fn with_manager(mut self, manager: ManagerConfig) -> Self {
        self.manager = manager;
        self
    }

    /// Enables snapshots in `dir`.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Sets the snapshot interval.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Sets how many snapshot files are kept.
    pub fn with_snapshots_retained(mut self, count: usize) -> Self {
        self.snapshots_retained = count;
        self
    }

    /// Sets the janitor interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets the largest accepted frame.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}
