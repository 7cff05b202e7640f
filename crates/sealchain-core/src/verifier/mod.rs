//! Full-chain verification.
//!
//! A read-only traversal that re-derives every seal from the genesis
//! anchor to the tail. Integrity failures are expected outcomes of an
//! integrity check, so they are returned as values
//! ([`Verification::Invalid`]) rather than errors; `Err` is reserved for
//! store failures and cancellation.
//!
//! Verification is safe to run concurrently with the writer: it takes a
//! snapshot via [`LedgerStore::all`] and touches nothing else.

use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::canonical::canonical_bytes;
use crate::seal::Sealer;
use crate::store::{LedgerStore, StoreError};

/// How many entries are processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

/// The verdict of a chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every entry verified; the chain is intact.
    Valid {
        /// Number of entries verified. Zero means the ledger is empty.
        entries: u64,
    },

    /// The chain failed verification.
    Invalid(IntegrityViolation),
}

impl Verification {
    /// Whether the chain verified.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid { entries: 0 } => write!(f, "ledger empty"),
            Self::Valid { entries } => write!(f, "chain intact: {entries} entries verified"),
            Self::Invalid(violation) => write!(f, "{violation}"),
        }
    }
}

/// A specific way the chain failed verification, pointing at the
/// offending entry where one exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntegrityViolation {
    /// Sequences are not exactly {1, …, N}.
    #[error("sequence violation: {detail}")]
    SequenceViolation {
        /// What was found instead.
        detail: String,
    },

    /// An entry's `previous_hash` does not match its predecessor's seal.
    #[error(
        "chain broken at sequence {sequence} (id {id}): previous hash does not match the prior entry's seal"
    )]
    ChainBroken {
        /// Sequence of the offending entry.
        sequence: u64,
        /// Id of the offending entry.
        id: Uuid,
    },

    /// An entry's stored seal does not match its recomputed seal.
    #[error("data tampered at sequence {sequence} (id {id}): stored seal does not match content")]
    DataTampered {
        /// Sequence of the offending entry.
        sequence: u64,
        /// Id of the offending entry.
        id: Uuid,
    },
}

/// Failures that prevented verification from completing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    /// The caller cancelled the traversal.
    #[error("verification cancelled")]
    Cancelled,

    /// The store could not be read.
    #[error("store failure during verification: {0}")]
    Store(#[from] StoreError),
}

/// Verifies the full chain from the genesis anchor to the tail.
///
/// Loads every entry, re-sorts by `(sequence, id)` rather than trusting
/// store order, validates sequence contiguity, then walks the chain
/// re-deriving each seal. The
/// cancellation token is checked every [`CANCEL_CHECK_INTERVAL`] entries
/// so large ledgers stay responsive to shutdown.
///
/// # Errors
///
/// [`VerifyError::Cancelled`] if `cancel` fires mid-traversal;
/// [`VerifyError::Store`] if the snapshot cannot be read. Integrity
/// failures are *not* errors; they arrive as
/// [`Verification::Invalid`].
pub async fn verify_chain(
    store: &dyn LedgerStore,
    genesis_hash: &str,
    sealer: &Sealer,
    cancel: &CancellationToken,
) -> Result<Verification, VerifyError> {
    if cancel.is_cancelled() {
        return Err(VerifyError::Cancelled);
    }

    let mut entries = store.all().await?;
    entries.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));

    if entries.is_empty() {
        return Ok(Verification::Valid { entries: 0 });
    }

    // Sequences must form exactly {1, …, N}.
    for (index, entry) in entries.iter().enumerate() {
        let expected = index as u64 + 1;
        if entry.sequence != expected {
            return Ok(Verification::Invalid(
                IntegrityViolation::SequenceViolation {
                    detail: format!(
                        "expected sequence {expected} at position {index}, found {} (id {})",
                        entry.sequence, entry.id
                    ),
                },
            ));
        }
    }

    let mut expected_hash = genesis_hash.to_ascii_lowercase();
    for (index, entry) in entries.iter().enumerate() {
        if index % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }

        if !bool::from(
            entry
                .previous_hash
                .as_bytes()
                .ct_eq(expected_hash.as_bytes()),
        ) {
            return Ok(Verification::Invalid(IntegrityViolation::ChainBroken {
                sequence: entry.sequence,
                id: entry.id,
            }));
        }

        // A payload the writer could never have sealed (e.g. a float
        // introduced in storage) is tampering by definition.
        let Ok(bytes) = canonical_bytes(&entry.draft()) else {
            return Ok(Verification::Invalid(IntegrityViolation::DataTampered {
                sequence: entry.sequence,
                id: entry.id,
            }));
        };

        let recomputed = sealer.seal(&bytes);
        if !bool::from(recomputed.as_bytes().ct_eq(entry.current_hash.as_bytes())) {
            return Ok(Verification::Invalid(IntegrityViolation::DataTampered {
                sequence: entry.sequence,
                id: entry.id,
            }));
        }

        expected_hash = recomputed;
    }

    let count = entries.len() as u64;
    debug!(entries = count, "chain verified");
    Ok(Verification::Valid { entries: count })
}
