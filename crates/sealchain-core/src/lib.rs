//! # sealchain-core
//!
//! Core library for sealchain, a tamper-evident audit ledger embedded in
//! a host application. A stream of audit events becomes a
//! cryptographically chained sequence of entries: each entry is linked to
//! its predecessor via a keyed hash, so any modification, reordering,
//! insertion, deletion or replay that breaks the chain is detectable by
//! recomputation.
//!
//! ## Architecture
//!
//! - **Single writer**: concurrent producers are linearized through a
//!   bounded queue into one totally-ordered chain; no forks, ever.
//! - **Canonical serialization + HMAC seal**: a deterministic byte form
//!   and an HMAC-SHA256 digest make every entry self-authenticating.
//! - **Storage contract**: append, head lookup, ordered scan and an
//!   exclusive lease, with backends injected at construction.
//! - **Verifier**: read-only recomputation of the whole chain from the
//!   genesis anchor.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sealchain_core::prelude::*;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = LedgerOptions::builder()
//!     .genesis_hash("0000000000000000000000000000000000000000000000000000000000000000")
//!     .secret_key("deployment-hmac-key")
//!     .build()?;
//! let ledger = AuditLedger::start(options, Arc::new(MemoryStore::new())).await?;
//!
//! let cancel = CancellationToken::new();
//! ledger.add_entry("USER_LOGIN", json!({"actorId": "alice"}), &cancel).await?;
//! assert!(ledger.verify(&cancel).await?.is_valid());
//! ledger.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threat model boundaries
//!
//! The core does not prevent wholesale deletion of the persistent store,
//! and does not defend against an adversary who holds both write access
//! to the store *and* the HMAC key (such an adversary can rewrite
//! history consistently). There is no consensus or replication across
//! simultaneous writers; the lease protocol guarantees at most one.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod canonical;
pub mod config;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod seal;
pub mod store;
pub mod verifier;
pub mod writer;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::LedgerOptions;
    pub use crate::entry::LedgerEntry;
    pub use crate::error::LedgerError;
    pub use crate::ledger::AuditLedger;
    pub use crate::store::{LedgerStore, MemoryStore};
    pub use crate::verifier::Verification;
}

/// Re-export commonly used types at the crate root.
pub use config::{LedgerOptions, OptionsError};
pub use entry::LedgerEntry;
pub use error::LedgerError;
pub use ledger::AuditLedger;
pub use store::{LedgerStore, MemoryStore, StoreError};
pub use verifier::{IntegrityViolation, Verification};
pub use writer::WriterState;
