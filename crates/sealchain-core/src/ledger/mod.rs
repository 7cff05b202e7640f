//! The producer facade: the embeddable surface of the audit ledger.
//!
//! An [`AuditLedger`] owns the bounded queue, the single writer task and
//! its lease heartbeat. Producers call [`AuditLedger::add_entry`] from any
//! number of tasks; each call validates its input, enqueues an intent
//! (suspending under backpressure) and awaits the writer's durable
//! acknowledgement. Reads and verification never touch the write path.
//!
//! # Example
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
//!
//! let store = Arc::new(MemoryStore::new());
//! let ledger = AuditLedger::start(options, store).await?;
//!
//! let cancel = CancellationToken::new();
//! let entry = ledger
//!     .add_entry("USER_LOGIN", json!({"actorId": "alice"}), &cancel)
//!     .await?;
//! assert_eq!(entry.sequence, 1);
//!
//! let verdict = ledger.verify(&cancel).await?;
//! assert!(verdict.is_valid());
//!
//! ledger.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Known limitation
//!
//! There is no durable outbox: intents that were enqueued in memory but
//! not yet persisted are lost if the process crashes. A restarting writer
//! resumes at `head.sequence + 1`, so the chain stays contiguous.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::canonical;
use crate::config::LedgerOptions;
use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use crate::seal::Sealer;
use crate::store::LedgerStore;
use crate::verifier::{self, Verification, VerifyError};
use crate::writer::{Intent, WriteError, Writer, WriterStartError, WriterState};

/// A running audit ledger: bounded queue, single writer, lease heartbeat.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct AuditLedger {
    store: Arc<dyn LedgerStore>,
    options: Arc<LedgerOptions>,
    sealer: Sealer,
    /// `None` once shutdown has begun; dropping the sender closes the
    /// queue and lets the writer drain to completion.
    tx: Mutex<Option<mpsc::Sender<Intent>>>,
    writer: Mutex<Option<JoinHandle<WriterState>>>,
    shutdown: CancellationToken,
}

impl AuditLedger {
    /// Validates nothing further (options are pre-validated), acquires
    /// the writer lease, loads the chain head and spawns the writer.
    ///
    /// # Errors
    ///
    /// [`LedgerError::LeaseUnavailable`] when another writer holds the
    /// lease; this instance has produced no entries and can be retired
    /// or retried later. [`LedgerError::Store`] if the store fails during
    /// startup, [`LedgerError::InvalidInput`] if the MAC rejects the key.
    pub async fn start(
        options: LedgerOptions,
        store: Arc<dyn LedgerStore>,
    ) -> Result<Self, LedgerError> {
        let options = Arc::new(options);
        let sealer = Sealer::new(options.secret_key())
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        let (tx, rx) = mpsc::channel(options.queue_capacity());
        let shutdown = CancellationToken::new();

        let writer = Writer::initialize(
            Arc::clone(&store),
            Arc::clone(&options),
            sealer.clone(),
            rx,
            shutdown.clone(),
        )
        .await
        .map_err(|e| match e {
            WriterStartError::LeaseUnavailable { resource, holder } => {
                LedgerError::LeaseUnavailable { resource, holder }
            },
            WriterStartError::Store(err) => LedgerError::Store(err),
        })?;

        info!(worker_id = %writer.worker_id(), "audit ledger started");
        let handle = tokio::spawn(writer.run());

        Ok(Self {
            store,
            options,
            sealer,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(handle)),
            shutdown,
        })
    }

    /// Submits an event for sealing and awaits durable persistence.
    ///
    /// Suspends at up to three points: enqueue under backpressure when
    /// the queue is full, the wait on the writer's acknowledgement, and
    /// the caller's cancellation. Cancellation *before* enqueue cancels
    /// the submission; cancellation *after* enqueue detaches this caller
    /// while the writer still seals and persists the entry. Audit
    /// completeness outweighs per-request abort.
    ///
    /// On success the returned entry is already durable:
    /// `get_by_id(entry.id)` observes it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for an empty event type or a payload
    /// that is not a sealable mapping; [`LedgerError::ShuttingDown`] once
    /// the queue is closed; [`LedgerError::Cancelled`] when `cancel`
    /// fires; [`LedgerError::Writer`] when the writer rejects the intent
    /// terminally.
    pub async fn add_entry(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        cancel: &CancellationToken,
    ) -> Result<LedgerEntry, LedgerError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(LedgerError::InvalidInput(
                "event type must not be empty".to_string(),
            ));
        }
        canonical::validate_payload(&payload)
            .map_err(|e| LedgerError::InvalidInput(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(LedgerError::Cancelled);
        }

        let tx = self
            .tx
            .lock()
            .expect("queue sender mutex poisoned")
            .clone()
            .ok_or(LedgerError::ShuttingDown)?;

        let (ack, promise) = oneshot::channel();
        let intent = Intent {
            event_type,
            payload,
            ack,
        };

        tokio::select! {
            sent = tx.send(intent) => {
                sent.map_err(|_| LedgerError::ShuttingDown)?;
            },
            () = cancel.cancelled() => {
                debug!("submission cancelled before enqueue");
                return Err(LedgerError::Cancelled);
            },
        }

        tokio::select! {
            resolved = promise => match resolved {
                Ok(Ok(entry)) => Ok(entry),
                Ok(Err(err)) => Err(LedgerError::Writer(err)),
                // The writer died without resolving the promise.
                Err(_) => Err(LedgerError::Writer(WriteError::Fatal {
                    message: "writer terminated before acknowledging".to_string(),
                })),
            },
            () = cancel.cancelled() => {
                debug!("caller detached after enqueue; entry will still be persisted");
                Err(LedgerError::Cancelled)
            },
        }
    }

    /// Returns the entry with the highest sequence, or `None` when the
    /// ledger is empty.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] on a read failure,
    /// [`LedgerError::Cancelled`] when `cancel` fires first.
    pub async fn get_head(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        tokio::select! {
            head = self.store.head() => head.map_err(LedgerError::Store),
            () = cancel.cancelled() => Err(LedgerError::Cancelled),
        }
    }

    /// Looks up a single entry by id.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] on a read failure,
    /// [`LedgerError::Cancelled`] when `cancel` fires first.
    pub async fn get_by_id(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        tokio::select! {
            entry = self.store.get_by_id(id) => entry.map_err(LedgerError::Store),
            () = cancel.cancelled() => Err(LedgerError::Cancelled),
        }
    }

    /// Verifies the full chain from the genesis anchor. Safe to run
    /// concurrently with the writer.
    ///
    /// Integrity failures are part of the [`Verification`] verdict, not
    /// errors.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Store`] if the snapshot cannot be read,
    /// [`LedgerError::Cancelled`] when `cancel` fires mid-traversal.
    pub async fn verify(&self, cancel: &CancellationToken) -> Result<Verification, LedgerError> {
        verifier::verify_chain(
            self.store.as_ref(),
            self.options.genesis_hash(),
            &self.sealer,
            cancel,
        )
        .await
        .map_err(|e| match e {
            VerifyError::Cancelled => LedgerError::Cancelled,
            VerifyError::Store(err) => LedgerError::Store(err),
        })
    }

    /// Stops the ledger: closes the queue, lets the writer drain
    /// already-enqueued intents, cancels the heartbeat and joins the
    /// writer task. Idempotent; later calls return `Stopped`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Writer`] if the writer task panicked.
    pub async fn shutdown(&self) -> Result<WriterState, LedgerError> {
        self.shutdown.cancel();
        drop(self.tx.lock().expect("queue sender mutex poisoned").take());

        let handle = self.writer.lock().expect("writer handle mutex poisoned").take();
        match handle {
            Some(handle) => {
                let state = handle.await.map_err(|e| {
                    LedgerError::Writer(WriteError::Fatal {
                        message: format!("writer task panicked: {e}"),
                    })
                })?;
                info!(state = %state, "audit ledger shut down");
                Ok(state)
            },
            None => Ok(WriterState::Stopped),
        }
    }
}
