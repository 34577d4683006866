//! Request and response messages of the transaction service.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use txd_core::{ChangeId, CoreError, ServiceStatus, Transaction};

/// A call to the transaction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxRequest {
    /// Start a long-running transaction.
    StartLong,
    /// Start a short transaction, with the server default timeout if none is given.
    StartShort {
        /// Timeout in seconds.
        timeout_secs: Option<u32>,
    },
    /// Assign a new write pointer to an open transaction.
    Checkpoint {
        /// Transaction to checkpoint.
        tx: Transaction,
    },
    /// Check a change set for conflicts.
    CanCommit {
        /// Committing transaction.
        tx: Transaction,
        /// Change ids the transaction wrote.
        change_ids: Vec<ChangeId>,
    },
    /// Commit a transaction.
    Commit {
        /// Transaction to commit.
        tx: Transaction,
    },
    /// Abort a transaction.
    Abort {
        /// Transaction to abort.
        tx: Transaction,
    },
    /// Move an open transaction to the invalid set.
    Invalidate {
        /// Write pointer to invalidate.
        write_pointer: i64,
    },
    /// Remove ids from the invalid set.
    TruncateInvalidTx {
        /// Ids to remove.
        ids: Vec<i64>,
    },
    /// Remove invalid ids started before a point in time.
    TruncateInvalidTxBefore {
        /// Cutoff in epoch milliseconds.
        time_millis: i64,
    },
    /// Size of the invalid set.
    GetInvalidSize,
    /// Encoded snapshot of the manager state.
    GetSnapshot,
    /// Whether the manager is running.
    Status,
    /// Clear all manager state.
    ResetState,
}

impl TxRequest {
    /// Returns the operation name used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            TxRequest::StartLong => "startLong",
            TxRequest::StartShort { .. } => "startShort",
            TxRequest::Checkpoint { .. } => "checkpoint",
            TxRequest::CanCommit { .. } => "canCommit",
            TxRequest::Commit { .. } => "commit",
            TxRequest::Abort { .. } => "abort",
            TxRequest::Invalidate { .. } => "invalidate",
            TxRequest::TruncateInvalidTx { .. } => "truncateInvalidTx",
            TxRequest::TruncateInvalidTxBefore { .. } => "truncateInvalidTxBefore",
            TxRequest::GetInvalidSize => "getInvalidSize",
            TxRequest::GetSnapshot => "getSnapshot",
            TxRequest::Status => "status",
            TxRequest::ResetState => "resetState",
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// Reply from the transaction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxResponse {
    /// A started or checkpointed transaction.
    Transaction(Transaction),
    /// Outcome of a yes/no operation.
    Bool(bool),
    /// Completion of an operation without a result.
    Unit,
    /// A count.
    Size(u64),
    /// Encoded manager snapshot.
    Snapshot(#[serde(with = "byte_string")] Vec<u8>),
    /// Service status.
    Status(ServiceStatus),
    /// The manager rejected the call.
    Error(RemoteError),
}

impl TxResponse {
    /// Returns the variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            TxResponse::Transaction(_) => "transaction",
            TxResponse::Bool(_) => "bool",
            TxResponse::Unit => "unit",
            TxResponse::Size(_) => "size",
            TxResponse::Snapshot(_) => "snapshot",
            TxResponse::Status(_) => "status",
            TxResponse::Error(_) => "error",
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

impl From<CoreError> for TxResponse {
    fn from(err: CoreError) -> Self {
        TxResponse::Error(RemoteError::from(err))
    }
}

/// Category of a domain failure reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// The transaction is not open.
    NotInProgress,
    /// A truncation would remove ids still needed.
    InvalidTruncateTime,
    /// The snapshot could not be produced.
    SnapshotFailed,
    /// Any other server-side failure.
    Internal,
}

/// A domain failure reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Failure category.
    pub kind: RemoteErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Transaction id for `NotInProgress` failures.
    pub transaction_id: Option<i64>,
}

impl RemoteError {
    /// Creates a remote error without a transaction id.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transaction_id: None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<CoreError> for RemoteError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotInProgress { transaction_id, .. } => Self {
                kind: RemoteErrorKind::NotInProgress,
                message,
                transaction_id: Some(transaction_id),
            },
            CoreError::InvalidTruncateTime { .. } => {
                Self::new(RemoteErrorKind::InvalidTruncateTime, message)
            }
            CoreError::SnapshotFailed { .. } => Self::new(RemoteErrorKind::SnapshotFailed, message),
            CoreError::SnapshotCorruption { .. } | CoreError::Io(_) => {
                Self::new(RemoteErrorKind::Internal, message)
            }
        }
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| ProtocolError::encode(e.to_string()))?;
    Ok(out)
}

fn from_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::decode(e.to_string()))
}

// Snapshot payloads go out as one CBOR byte string.
mod byte_string {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
                let mut out = Vec::new();
                while let Some(byte) = seq.next_element::<u8>()? {
                    out.push(byte);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
