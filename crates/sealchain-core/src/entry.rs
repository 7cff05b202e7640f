//! The sealed ledger entry and its hashing view.
//!
//! A [`LedgerEntry`] is the unit of the tamper-evident chain: a record whose
//! `current_hash` seals its own content plus a pointer to the seal of the
//! entry before it. Entries are produced exclusively by the single writer;
//! every other component treats them as immutable values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Length of a hex-encoded seal (HMAC-SHA256 digest).
pub const HASH_HEX_LEN: usize = 64;

/// The genesis anchor used by tests and development deployments: 64 hex
/// zeros, a value that can never be the seal of real data.
pub const ZERO_GENESIS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A single sealed record in the audit chain.
///
/// Wire-level field names are lowerCamelCase (`previousHash`, `eventType`,
/// `currentHash`); the struct is declared in canonical field order so the
/// serde form of an entry reads the same as its canonical bytes.
///
/// # Invariants
///
/// - `sequence` starts at 1 and is contiguous across the ledger.
/// - `previous_hash` equals the `current_hash` of the prior entry, or the
///   configured genesis anchor for sequence 1.
/// - `current_hash` equals the keyed seal over [`EntryDraft`] canonical
///   bytes. It is excluded from its own input.
/// - `id`, `sequence` and `timestamp` never change once sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Position in the chain, assigned by the writer. Starts at 1.
    pub sequence: u64,

    /// Globally unique identifier, assigned by the writer at sealing time.
    pub id: Uuid,

    /// UTC wall-clock instant assigned by the writer at sealing time.
    ///
    /// Sub-second precision is part of the signed content and must survive
    /// storage round trips. Not an ordering key; `sequence` is.
    pub timestamp: DateTime<Utc>,

    /// Seal of the previous entry, or the genesis anchor for sequence 1.
    /// Lowercase hex, 64 characters.
    pub previous_hash: String,

    /// Non-empty classifier supplied by the producer.
    pub event_type: String,

    /// Producer-supplied structured payload. Opaque to the core; mapping
    /// key order is preserved and is part of the signed content.
    pub payload: Value,

    /// The seal: lowercase hex HMAC-SHA256 over this entry's canonical
    /// bytes (which exclude this field).
    pub current_hash: String,
}

impl LedgerEntry {
    /// Borrows the hashing view of this entry: everything except
    /// `current_hash`.
    #[must_use]
    pub fn draft(&self) -> EntryDraft<'_> {
        EntryDraft {
            sequence: self.sequence,
            id: self.id,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            event_type: &self.event_type,
            payload: &self.payload,
        }
    }
}

/// An entry minus its own seal: the exact input to canonical
/// serialization and sealing.
///
/// Borrowed from either a [`LedgerEntry`] (verification path) or the
/// writer's in-flight fields (sealing path), so the two paths cannot
/// diverge on what gets hashed.
#[derive(Debug, Clone, Copy)]
pub struct EntryDraft<'a> {
    /// Position in the chain.
    pub sequence: u64,
    /// Entry identifier.
    pub id: Uuid,
    /// Writer-assigned UTC instant.
    pub timestamp: DateTime<Utc>,
    /// Seal of the prior entry or the genesis anchor.
    pub previous_hash: &'a str,
    /// Event classifier.
    pub event_type: &'a str,
    /// Structured payload.
    pub payload: &'a Value,
}
