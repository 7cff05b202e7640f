//! Error taxonomy of the library surface.

use thiserror::Error;

use crate::store::StoreError;
use crate::writer::WriteError;

/// Errors surfaced by [`AuditLedger`](crate::ledger::AuditLedger)
/// operations.
///
/// A host application layering HTTP on top typically maps:
/// `InvalidInput` to 400, `ShuttingDown` to 503, backpressure (via its own
/// timeout around `add_entry`) to 429/503, `Writer` to 500, and a failed
/// verification verdict to 409 with the reason. Backpressure itself is
/// modeled as suspension inside `add_entry`, not as an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The caller supplied an empty event type or an unsuitable payload.
    /// Not retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The queue is closed; the ledger no longer accepts entries.
    #[error("ledger is shutting down; no further entries are accepted")]
    ShuttingDown,

    /// The caller's cancellation fired. Cancellation after enqueue
    /// detaches the caller; the entry is still persisted.
    #[error("operation cancelled")]
    Cancelled,

    /// Another writer holds the lease; this instance produced no entries.
    #[error("writer lease on {resource} is unavailable: held by {holder}")]
    LeaseUnavailable {
        /// The contested lease resource.
        resource: String,
        /// Worker id of the current holder.
        holder: String,
    },

    /// The writer rejected the intent terminally. Internal retries are
    /// never observable here, only their final outcome.
    #[error("writer error: {0}")]
    Writer(#[from] WriteError),

    /// A read-side store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
