//! Core type definitions for txd.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Sentinel meaning "no transaction is currently unresolved".
pub const NO_TX_IN_PROGRESS: i64 = i64::MAX;

/// Number of write pointers that can be allocated per millisecond.
///
/// Write pointers are derived from wall-clock milliseconds multiplied by this
/// factor, which lets a timestamp be mapped back onto a write pointer range.
pub const MAX_TX_PER_MS: i64 = 1_000_000;

/// Kind of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Short-lived transaction with an expiration deadline.
    Short,
    /// Long-running transaction without expiration.
    Long,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Short => f.write_str("SHORT"),
            TransactionType::Long => f.write_str("LONG"),
        }
    }
}

/// Identifier of a change written by a transaction (a row, cell or key).
///
/// Change ids are opaque byte sequences compared bytewise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeId(Vec<u8>);

impl ChangeId {
    /// Creates a change id from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the change id, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<u8>> for ChangeId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ChangeId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ChangeId {
    fn from(key: &str) -> Self {
        Self(key.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for ChangeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Change ids travel as CBOR byte strings rather than integer arrays.
impl Serialize for ChangeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChangeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChangeIdVisitor;

        impl<'de> Visitor<'de> for ChangeIdVisitor {
            type Value = ChangeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<ChangeId, E> {
                Ok(ChangeId(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<ChangeId, E> {
                Ok(ChangeId(v))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<ChangeId, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Ok(ChangeId(bytes))
            }
        }

        deserializer.deserialize_byte_buf(ChangeIdVisitor)
    }
}

/// Coarse health of the transaction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// The transaction manager is running.
    Ok,
    /// The transaction manager is not running.
    NotOk,
}

impl ServiceStatus {
    /// Status string reported over the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::NotOk => "NOTOK",
        }
    }

    /// Returns the status for a running flag.
    #[must_use]
    pub const fn from_running(running: bool) -> Self {
        if running {
            ServiceStatus::Ok
        } else {
            ServiceStatus::NotOk
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
