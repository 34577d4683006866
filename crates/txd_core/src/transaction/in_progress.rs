//! Bookkeeping for open transactions.

use serde::{Deserialize, Serialize};

/// What an in-progress entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InProgressKind {
    /// A short transaction; it expires.
    Short,
    /// A long-running transaction; it never expires.
    Long,
    /// A write pointer handed out by a checkpoint of `parent`.
    Checkpoint {
        /// Transaction id the checkpoint belongs to.
        parent: i64,
    },
}

/// Manager-side record of one open write pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressTx {
    /// Deadline in epoch milliseconds, `None` when the entry never expires.
    pub expiration: Option<i64>,
    /// Kind of entry.
    pub kind: InProgressKind,
    /// Write pointers added by checkpoints, ascending. Empty for checkpoint entries.
    pub checkpoint_write_pointers: Vec<i64>,
}

impl InProgressTx {
    /// Creates a short transaction entry expiring at `expiration`.
    #[must_use]
    pub fn short(expiration: i64) -> Self {
        Self {
            expiration: Some(expiration),
            kind: InProgressKind::Short,
            checkpoint_write_pointers: Vec::new(),
        }
    }

    /// Creates a long-running transaction entry.
    #[must_use]
    pub fn long() -> Self {
        Self {
            expiration: None,
            kind: InProgressKind::Long,
            checkpoint_write_pointers: Vec::new(),
        }
    }

    /// Creates a checkpoint entry sharing the parent's expiration.
    #[must_use]
    pub fn checkpoint(parent: i64, expiration: Option<i64>) -> Self {
        Self {
            expiration,
            kind: InProgressKind::Checkpoint { parent },
            checkpoint_write_pointers: Vec::new(),
        }
    }

    /// Returns true for short transactions.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.kind == InProgressKind::Short
    }

    /// Returns the parent id of a checkpoint entry.
    #[must_use]
    pub fn parent(&self) -> Option<i64> {
        match self.kind {
            InProgressKind::Checkpoint { parent } => Some(parent),
            _ => None,
        }
    }

    /// Returns true if the entry's deadline passed at `now_millis`.
    #[must_use]
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiration.is_some_and(|deadline| now_millis > deadline)
    }
}
