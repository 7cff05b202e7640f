//! Storage contract for the audit chain.
//!
//! The core depends on an abstract store; concrete backends are injected
//! at construction and never named here. The trait is object-safe: all
//! methods return [`BoxFuture`], so a ledger can hold a
//! `Arc<dyn LedgerStore>` regardless of backend.
//!
//! # Invariants a store must preserve
//!
//! - [INV-STO-001] Appended entries are durable before `append` resolves.
//! - [INV-STO-002] `sequence` is unique within a ledger; a duplicate MUST
//!   surface as [`StoreError::DuplicateSequence`], never silent
//!   replacement.
//! - [INV-STO-003] `all` returns entries ordered by `(sequence asc,
//!   id asc)` even if insertion order differed.
//! - [INV-STO-004] Lease mutual exclusion holds for the granted duration:
//!   at most one holder per resource at any instant, enforced with
//!   compare-and-set or equivalent.
//!
//! Backends that cannot preserve payload mapping key order natively must
//! store the canonical bytes alongside each entry and reconstruct the
//! payload from them, because key order is signed content.

mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entry::LedgerEntry;

pub use memory::MemoryStore;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors surfaced by a store implementation.
///
/// The writer's retry policy keys off [`StoreError::is_transient`]:
/// transient failures are retried with exponential backoff, everything
/// else fails the in-flight entry, and [`StoreError::DuplicateSequence`]
/// additionally takes the writer down (it means a second writer exists or
/// the store violated uniqueness).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// An entry with this sequence already exists.
    #[error("duplicate sequence {sequence}: the ledger already holds an entry at this position")]
    DuplicateSequence {
        /// The sequence that collided.
        sequence: u64,
    },

    /// The lease is held by another worker.
    #[error("lease on {resource} is held by {holder} until {expires_at}")]
    LeaseHeld {
        /// The contested resource.
        resource: String,
        /// The current holder's worker id.
        holder: String,
        /// When the current lease expires.
        expires_at: DateTime<Utc>,
    },

    /// A recoverable failure: I/O, network, timeout.
    #[error("transient store failure: {message}")]
    Transient {
        /// Backend description of the failure.
        message: String,
    },

    /// An unrecoverable failure: authentication, schema, corruption.
    #[error("fatal store failure: {message}")]
    Fatal {
        /// Backend description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Whether the writer should retry the operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// An exclusive, time-bounded claim on a named resource.
///
/// The single coordination point across process restarts: whoever holds
/// the writer lease owns the chain head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// The resource this lease guards.
    pub resource: String,

    /// Worker id of the holder.
    pub holder: String,

    /// Instant after which the lease may be claimed by another worker.
    pub expires_at: DateTime<Utc>,

    /// Last successful acquisition or renewal.
    pub last_heartbeat: DateTime<Utc>,
}

/// The abstract store the core appends to and verifies against.
///
/// # Object safety
///
/// All methods return [`BoxFuture`], so the trait can be used behind
/// `Arc<dyn LedgerStore>`.
///
/// # Contracts
///
/// - [CTR-STO-001] `append` persists atomically and enforces sequence
///   uniqueness.
/// - [CTR-STO-002] `head` returns the entry with the maximum `sequence`,
///   or `None` when empty.
/// - [CTR-STO-003] `all` returns every entry ordered by `(sequence asc,
///   id asc)`.
/// - [CTR-STO-004] `acquire_or_renew_lease` grants the lease when the
///   resource is unclaimed or expired, renews it for the current holder,
///   and returns [`StoreError::LeaseHeld`] otherwise.
pub trait LedgerStore: Send + Sync {
    /// Persists a sealed entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateSequence`] when the sequence is taken;
    /// backend failures otherwise.
    fn append<'a>(&'a self, entry: &'a LedgerEntry) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Returns the entry with the maximum `sequence`, or `None` if the
    /// ledger is empty.
    ///
    /// # Errors
    ///
    /// Returns backend failures.
    fn head<'a>(&'a self) -> BoxFuture<'a, Result<Option<LedgerEntry>, StoreError>>;

    /// Returns every entry, ordered by `(sequence asc, id asc)`.
    ///
    /// # Errors
    ///
    /// Returns backend failures.
    fn all<'a>(&'a self) -> BoxFuture<'a, Result<Vec<LedgerEntry>, StoreError>>;

    /// Looks up a single entry by id.
    ///
    /// # Errors
    ///
    /// Returns backend failures.
    fn get_by_id<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<LedgerEntry>, StoreError>>;

    /// Grants or extends an exclusive lease on `resource` for `holder`.
    ///
    /// Renewal by the current holder always extends the expiry to
    /// now + `duration`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LeaseHeld`] when another holder's lease is still
    /// live; backend failures otherwise.
    fn acquire_or_renew_lease<'a>(
        &'a self,
        resource: &'a str,
        holder: &'a str,
        duration: Duration,
    ) -> BoxFuture<'a, Result<LeaseRecord, StoreError>>;

    /// Releases the lease on `resource` if it is held by `holder`; a
    /// no-op for any other holder. Called by the writer on clean
    /// shutdown so a successor does not have to wait out the TTL.
    ///
    /// # Errors
    ///
    /// Returns backend failures.
    fn release_lease<'a>(
        &'a self,
        resource: &'a str,
        holder: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

#[cfg(test)]
mod trait_tests {
    use super::*;

    // The trait must stay object-safe.
    fn _assert_object_safety(_: &dyn LedgerStore) {}
}
