//! Transaction value and visibility rules.

use crate::types::{TransactionType, NO_TX_IN_PROGRESS};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An immutable description of one transaction's read snapshot and write identity.
///
/// The value carries everything a reader needs to decide whether a version is
/// visible, so storage code can filter versions without talking to the manager.
///
/// ## Invariants
///
/// - `invalids` and `in_progress` are strictly ascending
/// - `checkpoint_write_pointers` is ascending and, when non-empty, ends with
///   `write_pointer`
/// - pointers are never negative
///
/// Decoding rejects values that break these invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTransaction")]
pub struct Transaction {
    transaction_id: i64,
    read_pointer: i64,
    write_pointer: i64,
    invalids: Vec<i64>,
    in_progress: Vec<i64>,
    first_short_in_progress: i64,
    tx_type: TransactionType,
    checkpoint_write_pointers: Vec<i64>,
}

impl Transaction {
    /// A transaction that sees everything ever written.
    ///
    /// Used for non-transactional reads; downstream code branches on it.
    pub const ALL_VISIBLE_LATEST: Transaction = Transaction {
        transaction_id: i64::MAX,
        read_pointer: i64::MAX,
        write_pointer: i64::MAX,
        invalids: Vec::new(),
        in_progress: Vec::new(),
        first_short_in_progress: NO_TX_IN_PROGRESS,
        tx_type: TransactionType::Short,
        checkpoint_write_pointers: Vec::new(),
    };

    /// Creates a transaction whose id equals its write pointer.
    ///
    /// `invalids` and `in_progress` must already be sorted ascending.
    #[must_use]
    pub fn new(
        read_pointer: i64,
        write_pointer: i64,
        invalids: Vec<i64>,
        in_progress: Vec<i64>,
        first_short_in_progress: i64,
        tx_type: TransactionType,
    ) -> Self {
        debug_assert!(is_strictly_ascending(&invalids));
        debug_assert!(is_strictly_ascending(&in_progress));
        Self {
            transaction_id: write_pointer,
            read_pointer,
            write_pointer,
            invalids,
            in_progress,
            first_short_in_progress,
            tx_type,
            checkpoint_write_pointers: Vec::new(),
        }
    }

    /// Creates the checkpointed form of a transaction.
    ///
    /// The id and type stay those of `parent`; the snapshot fields are the
    /// refreshed ones supplied by the manager.
    #[must_use]
    pub(crate) fn checkpointed(
        parent: &Transaction,
        read_pointer: i64,
        invalids: Vec<i64>,
        in_progress: Vec<i64>,
        first_short_in_progress: i64,
        checkpoint_write_pointers: Vec<i64>,
    ) -> Self {
        let write_pointer = checkpoint_write_pointers
            .last()
            .copied()
            .unwrap_or(parent.transaction_id);
        Self {
            transaction_id: parent.transaction_id,
            read_pointer,
            write_pointer,
            invalids,
            in_progress,
            first_short_in_progress,
            tx_type: parent.tx_type,
            checkpoint_write_pointers,
        }
    }

    /// Returns the id the manager tracks this transaction under.
    #[must_use]
    pub fn transaction_id(&self) -> i64 {
        self.transaction_id
    }

    /// Returns the read pointer.
    #[must_use]
    pub fn read_pointer(&self) -> i64 {
        self.read_pointer
    }

    /// Returns the current write pointer.
    #[must_use]
    pub fn write_pointer(&self) -> i64 {
        self.write_pointer
    }

    /// Returns the invalid transaction ids, ascending.
    #[must_use]
    pub fn invalids(&self) -> &[i64] {
        &self.invalids
    }

    /// Returns the ids in progress when the snapshot was taken, ascending.
    #[must_use]
    pub fn in_progress(&self) -> &[i64] {
        &self.in_progress
    }

    /// Returns the write pointers assigned by checkpoints, ascending.
    #[must_use]
    pub fn checkpoint_write_pointers(&self) -> &[i64] {
        &self.checkpoint_write_pointers
    }

    /// Returns the transaction type.
    #[must_use]
    pub fn tx_type(&self) -> TransactionType {
        self.tx_type
    }

    /// Returns the lowest in-progress id, or [`NO_TX_IN_PROGRESS`].
    #[must_use]
    pub fn first_in_progress(&self) -> i64 {
        self.in_progress.first().copied().unwrap_or(NO_TX_IN_PROGRESS)
    }

    /// Returns the lowest short-lived in-progress id at snapshot time.
    #[must_use]
    pub fn first_short_in_progress(&self) -> i64 {
        self.first_short_in_progress
    }

    /// Returns the id below which every version is resolved for this snapshot.
    ///
    /// Anything newer may be invisible to this transaction. The returned id
    /// itself may be invalid.
    #[must_use]
    pub fn visibility_upper_bound(&self) -> i64 {
        match self.in_progress.first() {
            Some(first) => first - 1,
            None => (self.write_pointer - 1).min(self.read_pointer),
        }
    }

    /// Checks whether `version` was in progress at snapshot time.
    #[must_use]
    pub fn is_in_progress(&self, version: i64) -> bool {
        self.in_progress.binary_search(&version).is_ok()
    }

    /// Checks whether `version` must be excluded from reads.
    #[must_use]
    pub fn is_excluded(&self, version: i64) -> bool {
        self.is_in_progress(version) || self.invalids.binary_search(&version).is_ok()
    }

    /// Checks whether `version` was written by this transaction.
    #[must_use]
    pub fn is_current_write(&self, version: i64) -> bool {
        version == self.write_pointer
            || version == self.transaction_id
            || self.checkpoint_write_pointers.binary_search(&version).is_ok()
    }

    /// Checks whether data written at `version` is visible to this transaction.
    #[must_use]
    pub fn is_visible(&self, version: i64) -> bool {
        (version <= self.read_pointer && !self.is_excluded(version)) || self.is_current_write(version)
    }

    /// Returns true if any version must be excluded.
    #[must_use]
    pub fn has_excludes(&self) -> bool {
        !self.invalids.is_empty() || !self.in_progress.is_empty()
    }

    /// Returns the total number of excluded ids.
    #[must_use]
    pub fn excludes_size(&self) -> usize {
        self.invalids.len() + self.in_progress.len()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction{{id: {}, readPointer: {}, writePointer: {}, invalids: {:?}, inProgress: {:?}, type: {}}}",
            self.transaction_id,
            self.read_pointer,
            self.write_pointer,
            self.invalids,
            self.in_progress,
            self.tx_type
        )
    }
}

fn is_strictly_ascending(ids: &[i64]) -> bool {
    ids.windows(2).all(|w| w[0] < w[1])
}

/// Wire form of [`Transaction`] before its invariants are checked.
#[derive(Deserialize)]
struct RawTransaction {
    transaction_id: i64,
    read_pointer: i64,
    write_pointer: i64,
    invalids: Vec<i64>,
    in_progress: Vec<i64>,
    first_short_in_progress: i64,
    tx_type: TransactionType,
    checkpoint_write_pointers: Vec<i64>,
}

/// A decoded transaction that breaks a [`Transaction`] invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedTransaction {
    /// A pointer field is negative.
    #[error("{field} is negative: {value}")]
    NegativePointer {
        /// Name of the field.
        field: &'static str,
        /// The offending value.
        value: i64,
    },
    /// A pointer list is unsorted or has duplicates.
    #[error("{field} is not strictly ascending")]
    Unordered {
        /// Name of the field.
        field: &'static str,
    },
    /// The last checkpoint pointer differs from the write pointer.
    #[error("last checkpoint {last} does not match write pointer {write_pointer}")]
    CheckpointMismatch {
        /// Last checkpoint write pointer.
        last: i64,
        /// The write pointer.
        write_pointer: i64,
    },
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = MalformedTransaction;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let scalars = [
            ("transaction_id", raw.transaction_id),
            ("read_pointer", raw.read_pointer),
            ("write_pointer", raw.write_pointer),
            ("first_short_in_progress", raw.first_short_in_progress),
        ];
        let lists = [
            ("invalids", &raw.invalids),
            ("in_progress", &raw.in_progress),
            ("checkpoint_write_pointers", &raw.checkpoint_write_pointers),
        ];
        for (field, value) in scalars {
            if value < 0 {
                return Err(MalformedTransaction::NegativePointer { field, value });
            }
        }
        for (field, ids) in lists {
            if !is_strictly_ascending(ids) {
                return Err(MalformedTransaction::Unordered { field });
            }
            if let Some(&value) = ids.first().filter(|first| **first < 0) {
                return Err(MalformedTransaction::NegativePointer { field, value });
            }
        }
        if let Some(&last) = raw.checkpoint_write_pointers.last() {
            if last != raw.write_pointer {
                return Err(MalformedTransaction::CheckpointMismatch {
                    last,
                    write_pointer: raw.write_pointer,
                });
            }
        }

        Ok(Self {
            transaction_id: raw.transaction_id,
            read_pointer: raw.read_pointer,
            write_pointer: raw.write_pointer,
            invalids: raw.invalids,
            in_progress: raw.in_progress,
            first_short_in_progress: raw.first_short_in_progress,
            tx_type: raw.tx_type,
            checkpoint_write_pointers: raw.checkpoint_write_pointers,
        })
    }
}
