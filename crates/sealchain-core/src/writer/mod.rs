//! The single writer: the only component that mutates the chain.
//!
//! Producers never read the chain head, compute seals or assign
//! sequences. One long-lived task owns all three, which is what makes
//! forks impossible under concurrency: intents are drained from the
//! bounded queue strictly in arrival order, sealed against the in-memory
//! head, persisted, and only then acknowledged.
//!
//! # Lifecycle
//!
//! ```text
//! Starting --> LeaseAcquired --> Initialized --> Running --> Draining --> Stopped
//!     \              \                \             \
//!      +--------------+----------------+-------------+--> Failed
//! ```
//!
//! The lease is acquired before the task starts; failure there means
//! another writer is active and no entries are produced. A heartbeat task
//! renews the lease on a fixed interval; a failed renewal trips the
//! `lease_lost` token and the writer stops immediately. This is fatal on
//! purpose: it is what prevents a fork when a second writer takes over.
//!
//! # Invariants
//!
//! - [INV-WRT-001] Intents are sealed and persisted in dequeue order,
//!   which equals arrival order at the queue.
//! - [INV-WRT-002] The head (`head_hash`, `head_seq`) advances only after
//!   a successful append; a rejected intent leaves it untouched, so the
//!   next intent reuses the same predecessor.
//! - [INV-WRT-003] The writer never moves on while an intent's
//!   persistence is unresolved.

mod state;


use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::canonical::{self, PayloadError};
use crate::config::LedgerOptions;
use crate::entry::LedgerEntry;
use crate::seal::Sealer;
use crate::store::{LedgerStore, StoreError};

pub use state::WriterState;

/// A producer's pending submission: event classifier, payload and the
/// one-shot promise resolved once the entry is durable (or rejected).
pub(crate) struct Intent {
    pub(crate) event_type: String,
    pub(crate) payload: Value,
    pub(crate) ack: oneshot::Sender<Result<LedgerEntry, WriteError>>,
}

/// Terminal failure of a single write, delivered through the intent's
/// promise. Producers never observe the writer's internal retries, only
/// a sealed entry or one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteError {
    /// Persistence failed after the full retry schedule.
    #[error("entry could not be persisted after {attempts} attempts: {message}")]
    Persist {
        /// Total append attempts made (initial + retries).
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// The writer lost its lease mid-flight.
    #[error("writer lost its lease on {resource}")]
    LeaseLost {
        /// The lease resource that could not be renewed.
        resource: String,
    },

    /// A store-level fatal condition took the writer down.
    #[error("fatal writer condition: {message}")]
    Fatal {
        /// Description of the condition.
        message: String,
    },

    /// The intent's payload could not be canonicalized.
    ///
    /// The facade validates payloads before enqueue, so this only fires
    /// for intents that bypassed it.
    #[error("canonical serialization failed: {0}")]
    Canonical(#[from] PayloadError),
}

impl WriteError {
    /// Whether this failure must take the whole writer down.
    const fn is_fatal(&self) -> bool {
        matches!(self, Self::LeaseLost { .. } | Self::Fatal { .. })
    }
}

/// Failure to bring a writer up. Startup failures happen before any
/// entry is produced.
#[derive(Debug, Error)]
pub(crate) enum WriterStartError {
    /// Another writer holds the lease.
    #[error("writer lease on {resource} is unavailable: held by {holder}")]
    LeaseUnavailable {
        resource: String,
        holder: String,
    },

    /// The store failed during lease acquisition or head read.
    #[error(transparent)]
    Store(StoreError),
}

/// The writer task. Constructed via [`Writer::initialize`], consumed by
/// [`Writer::run`].
pub(crate) struct Writer {
    store: Arc<dyn LedgerStore>,
    options: Arc<LedgerOptions>,
    sealer: Sealer,
    rx: mpsc::Receiver<Intent>,
    shutdown: CancellationToken,
    lease_lost: CancellationToken,
    worker_id: String,
    head_hash: String,
    head_seq: u64,
    state: WriterState,
}

impl Writer {
    /// Acquires the writer lease and loads the chain head.
    ///
    /// Covers `Starting -> LeaseAcquired -> Initialized`. On an empty
    /// ledger the head is the genesis anchor at sequence 0, so the first
    /// sealed entry gets sequence 1.
    pub(crate) async fn initialize(
        store: Arc<dyn LedgerStore>,
        options: Arc<LedgerOptions>,
        sealer: Sealer,
        rx: mpsc::Receiver<Intent>,
        shutdown: CancellationToken,
    ) -> Result<Self, WriterStartError> {
        let worker_id = Uuid::new_v4().to_string();
        trace!(worker_id = %worker_id, state = %WriterState::Starting, "writer starting");

        match store
            .acquire_or_renew_lease(
                options.lock_resource_name(),
                &worker_id,
                options.lease_duration(),
            )
            .await
        {
            Ok(lease) => {
                debug!(
                    worker_id = %worker_id,
                    resource = %lease.resource,
                    expires_at = %lease.expires_at,
                    state = %WriterState::LeaseAcquired,
                    "writer lease acquired"
                );
            },
            Err(StoreError::LeaseHeld {
                resource, holder, ..
            }) => {
                return Err(WriterStartError::LeaseUnavailable { resource, holder });
            },
            Err(other) => return Err(WriterStartError::Store(other)),
        }

        let head = store.head().await.map_err(WriterStartError::Store)?;
        let (head_hash, head_seq) = match head {
            Some(entry) => (entry.current_hash, entry.sequence),
            None => (options.genesis_hash().to_ascii_lowercase(), 0),
        };
        info!(
            worker_id = %worker_id,
            head_seq,
            state = %WriterState::Initialized,
            "writer initialized"
        );

        Ok(Self {
            store,
            options,
            sealer,
            rx,
            shutdown,
            lease_lost: CancellationToken::new(),
            worker_id,
            head_hash,
            head_seq,
            state: WriterState::Initialized,
        })
    }

    /// The id under which this writer holds the lease.
    pub(crate) fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Runs the writer to completion: heartbeat up, drain the queue,
    /// heartbeat down. Returns the terminal state (`Stopped` on a clean
    /// drain, `Failed` on lease loss or a fatal store condition).
    pub(crate) async fn run(mut self) -> WriterState {
        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.store),
            Arc::clone(&self.options),
            self.worker_id.clone(),
            self.lease_lost.clone(),
        );
        self.state = WriterState::Running;
        info!(worker_id = %self.worker_id, state = %self.state, "writer running");

        loop {
            tokio::select! {
                () = self.lease_lost.cancelled() => {
                    self.state = WriterState::Failed;
                    error!(
                        worker_id = %self.worker_id,
                        "lease lost; stopping immediately to prevent a fork"
                    );
                    self.reject_pending(WriteError::LeaseLost {
                        resource: self.options.lock_resource_name().to_string(),
                    });
                    break;
                },
                () = self.shutdown.cancelled(), if self.state == WriterState::Running => {
                    self.state = WriterState::Draining;
                    info!(worker_id = %self.worker_id, state = %self.state, "writer draining");
                },
                intent = self.rx.recv() => match intent {
                    Some(intent) => {
                        if !self.process(intent).await {
                            self.state = WriterState::Failed;
                            self.reject_pending(WriteError::Fatal {
                                message: "writer stopped on a fatal condition".to_string(),
                            });
                            break;
                        }
                    },
                    None => {
                        self.state = WriterState::Stopped;
                        break;
                    },
                },
            }
        }

        heartbeat.abort();
        if self.state == WriterState::Stopped {
            // Hand the lease back so a successor does not wait out the
            // TTL. On `Failed` the lease is left to expire: ownership may
            // already have moved.
            if let Err(err) = self
                .store
                .release_lease(self.options.lock_resource_name(), &self.worker_id)
                .await
            {
                warn!(worker_id = %self.worker_id, error = %err, "lease release failed");
            }
        }
        info!(worker_id = %self.worker_id, state = %self.state, "writer exited");
        self.state
    }

    /// Seals and persists one intent. Returns `false` when the failure is
    /// fatal for the writer.
    async fn process(&mut self, intent: Intent) -> bool {
        let next_seq = self.head_seq + 1;
        let mut entry = LedgerEntry {
            sequence: next_seq,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            previous_hash: self.head_hash.clone(),
            event_type: intent.event_type,
            payload: intent.payload,
            current_hash: String::new(),
        };

        let bytes = match canonical::canonical_bytes(&entry.draft()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(sequence = next_seq, error = %err, "intent payload not canonicalizable");
                let _ = intent.ack.send(Err(WriteError::Canonical(err)));
                return true;
            },
        };
        entry.current_hash = self.sealer.seal(&bytes);

        match self.persist_with_retry(&entry).await {
            Ok(()) => {
                self.head_hash.clone_from(&entry.current_hash);
                self.head_seq = next_seq;
                trace!(sequence = next_seq, id = %entry.id, "entry sealed and persisted");
                if intent.ack.send(Ok(entry)).is_err() {
                    // Producer cancelled after enqueue: the entry is
                    // persisted regardless, only the ack is discarded.
                    debug!(sequence = next_seq, "producer detached; ack discarded");
                }
                true
            },
            Err(err) => {
                let fatal = err.is_fatal();
                if fatal {
                    error!(sequence = next_seq, error = %err, "write failed fatally");
                } else {
                    warn!(sequence = next_seq, error = %err, "write failed; head not advanced");
                }
                let _ = intent.ack.send(Err(err));
                !fatal
            },
        }
    }

    /// Appends with bounded exponential retry (base, 2·base, 4·base, …).
    /// Retry is confined to this single entry.
    async fn persist_with_retry(&self, entry: &LedgerEntry) -> Result<(), WriteError> {
        let max_retries = self.options.retry_attempts();
        let mut retries = 0u32;

        loop {
            match self.store.append(entry).await {
                Ok(()) => return Ok(()),
                Err(StoreError::DuplicateSequence { sequence }) => {
                    // A second writer exists or the store violated
                    // uniqueness. Either way this chain head is no longer
                    // trustworthy.
                    return Err(WriteError::Fatal {
                        message: format!(
                            "duplicate sequence {sequence}: another writer is active or the store violated uniqueness"
                        ),
                    });
                },
                Err(err) if err.is_transient() && retries < max_retries => {
                    let delay = self.options.retry_base() * 2u32.pow(retries);
                    retries += 1;
                    warn!(
                        sequence = entry.sequence,
                        retry = retries,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "append failed; backing off"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = self.lease_lost.cancelled() => {
                            return Err(WriteError::LeaseLost {
                                resource: self.options.lock_resource_name().to_string(),
                            });
                        },
                    }
                },
                Err(err) if err.is_transient() => {
                    return Err(WriteError::Persist {
                        attempts: max_retries + 1,
                        message: err.to_string(),
                    });
                },
                Err(err) => {
                    return Err(WriteError::Fatal {
                        message: err.to_string(),
                    });
                },
            }
        }
    }

    /// Rejects every intent still in the queue. Used on fatal exit so no
    /// producer waits forever on a promise the writer will never resolve.
    fn reject_pending(&mut self, err: WriteError) {
        self.rx.close();
        while let Ok(intent) = self.rx.try_recv() {
            let _ = intent.ack.send(Err(err.clone()));
        }
    }
}

/// Spawns the heartbeat task: renews the lease every
/// `lease_renew_interval`, trips `lease_lost` on the first failure.
fn spawn_heartbeat(
    store: Arc<dyn LedgerStore>,
    options: Arc<LedgerOptions>,
    worker_id: String,
    lease_lost: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(options.lease_renew_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the lease was acquired at
        // initialization, so skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store
                .acquire_or_renew_lease(
                    options.lock_resource_name(),
                    &worker_id,
                    options.lease_duration(),
                )
                .await
            {
                Ok(lease) => {
                    trace!(worker_id = %worker_id, expires_at = %lease.expires_at, "lease renewed");
                },
                Err(err) => {
                    error!(worker_id = %worker_id, error = %err, "lease renewal failed");
                    lease_lost.cancel();
                    break;
                },
            }
        }
    })
}
