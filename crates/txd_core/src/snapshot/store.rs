//! Directory of snapshot files.

use super::TransactionSnapshot;
use crate::error::CoreResult;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix of snapshot file names; the suffix is the snapshot timestamp.
const SNAPSHOT_PREFIX: &str = "snapshot.";
/// Temporary file used while a snapshot is being written.
const SNAPSHOT_TEMP: &str = ".snapshot.tmp";

/// Persists snapshots as `snapshot.<timestamp>` files in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Opens (creating if needed) a snapshot directory.
    pub fn open(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a snapshot atomically and returns its path.
    ///
    /// Uses write-then-rename: the body goes to a temporary file which is
    /// synced and then renamed into place.
    pub fn write(&self, snapshot: &TransactionSnapshot) -> CoreResult<PathBuf> {
        let path = self
            .dir
            .join(format!("{SNAPSHOT_PREFIX}{}", snapshot.timestamp));
        let temp_path = self.dir.join(SNAPSHOT_TEMP);

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        snapshot.encode(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_directory()?;

        info!(path = %path.display(), "wrote transaction snapshot");
        Ok(path)
    }

    /// Lists snapshot files, oldest first.
    pub fn list(&self) -> CoreResult<Vec<(i64, PathBuf)>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(timestamp) = name
                .strip_prefix(SNAPSHOT_PREFIX)
                .and_then(|ts| ts.parse::<i64>().ok())
            else {
                continue;
            };
            snapshots.push((timestamp, entry.path()));
        }
        snapshots.sort_by_key(|(timestamp, _)| *timestamp);
        Ok(snapshots)
    }

    /// Loads the newest snapshot, if any.
    pub fn latest(&self) -> CoreResult<Option<TransactionSnapshot>> {
        let Some((_, path)) = self.list()?.pop() else {
            return Ok(None);
        };
        debug!(path = %path.display(), "reading transaction snapshot");
        Self::read(&path).map(Some)
    }

    /// Reads one snapshot file.
    pub fn read(path: &Path) -> CoreResult<TransactionSnapshot> {
        let file = File::open(path)?;
        TransactionSnapshot::decode(BufReader::new(file))
    }

    /// Deletes all but the newest `keep` snapshots, returning how many were removed.
    pub fn prune(&self, keep: usize) -> CoreResult<usize> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);
        let mut removed = 0;
        for (_, path) in snapshots.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old snapshot"),
            }
        }
        Ok(removed)
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}
