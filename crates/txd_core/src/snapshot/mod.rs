//! Point-in-time copies of the transaction manager state.
//!
//! ## Snapshot Format
//!
//! ```text
//! | magic "TXSN" (4) | version (2, big-endian) | CBOR body |
//! ```
//!
//! The body is the CBOR encoding of [`TransactionSnapshot`]. It carries the
//! pointers, the in-progress and invalid sets, and the change set history
//! needed to answer conflict checks for every transaction open at the time.

mod store;

pub use store::SnapshotStore;

use crate::error::{CoreError, CoreResult};
use crate::transaction::InProgressTx;
use crate::types::ChangeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

/// Magic bytes opening every snapshot.
const SNAPSHOT_MAGIC: [u8; 4] = *b"TXSN";
/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;

/// A consistent copy of the manager state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    /// Wall-clock milliseconds when the copy was taken.
    pub timestamp: i64,
    /// Highest committed write pointer.
    pub read_pointer: i64,
    /// Last write pointer handed out.
    pub write_pointer: i64,
    /// Invalid write pointers, ascending.
    pub invalid: Vec<i64>,
    /// Aborted write pointers still hidden from readers, ascending.
    #[serde(default)]
    pub aborted: Vec<i64>,
    /// Open write pointers.
    pub in_progress: BTreeMap<i64, InProgressTx>,
    /// Change sets declared by `can_commit` and not yet committed.
    pub committing_change_sets: BTreeMap<i64, BTreeSet<ChangeId>>,
    /// Committed change sets keyed by commit pointer.
    pub committed_change_sets: BTreeMap<i64, BTreeSet<ChangeId>>,
}

impl TransactionSnapshot {
    /// Returns the write pointer the next allocation must exceed.
    #[must_use]
    pub fn next_write_pointer(&self) -> i64 {
        self.write_pointer + 1
    }

    /// Writes the snapshot to `sink`.
    pub fn encode<W: Write>(&self, mut sink: W) -> CoreResult<()> {
        sink.write_all(&SNAPSHOT_MAGIC)?;
        sink.write_all(&SNAPSHOT_VERSION.to_be_bytes())?;
        ciborium::into_writer(self, &mut sink)
            .map_err(|e| CoreError::snapshot_failed(format!("failed to encode snapshot: {e}")))?;
        sink.flush()?;
        Ok(())
    }

    /// Encodes the snapshot into a byte vector.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Reads a snapshot from `source`.
    pub fn decode<R: Read>(mut source: R) -> CoreResult<Self> {
        let mut magic = [0u8; 4];
        source.read_exact(&mut magic).map_err(|e| {
            CoreError::snapshot_corruption(format!("truncated snapshot header: {e}"))
        })?;
        if magic != SNAPSHOT_MAGIC {
            return Err(CoreError::snapshot_corruption(format!(
                "bad magic {magic:02x?}"
            )));
        }

        let mut version = [0u8; 2];
        source.read_exact(&mut version).map_err(|e| {
            CoreError::snapshot_corruption(format!("truncated snapshot header: {e}"))
        })?;
        let version = u16::from_be_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(CoreError::snapshot_corruption(format!(
                "unsupported snapshot version {version}"
            )));
        }

        ciborium::from_reader(&mut source)
            .map_err(|e| CoreError::snapshot_corruption(format!("failed to decode snapshot: {e}")))
    }

    /// Decodes a snapshot from bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Self::decode(bytes)
    }
}
