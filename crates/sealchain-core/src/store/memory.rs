//! In-memory reference store.
//!
//! The development and test backend: an ordered list guarded by a mutex,
//! plus a lease map keyed by resource name. Payload key order survives
//! naturally because entries are held as values, never re-encoded.
//!
//! Mutex poisoning indicates a panic in another thread, which is
//! unrecoverable.

#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::entry::LedgerEntry;

use super::{BoxFuture, LeaseRecord, LedgerStore, StoreError};

/// Mutex-guarded reference implementation of [`LedgerStore`].
///
/// Suitable for tests and development; a production deployment injects a
/// durable backend instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<LedgerEntry>>,
    leases: Mutex<HashMap<String, LeaseRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutates the raw entry list in place.
    ///
    /// A development hook for integrity testing: simulate tampering,
    /// reordering or deletion and observe the verifier catch it. Ordering
    /// is restored after the closure runs so reads keep their contract.
    pub fn mutate_entries(&self, f: impl FnOnce(&mut Vec<LedgerEntry>)) {
        let mut entries = self.entries.lock().unwrap();
        f(&mut entries);
        entries.sort_by(compare_entries);
    }

    /// Returns the lease record for `resource`, if any.
    #[must_use]
    pub fn lease(&self, resource: &str) -> Option<LeaseRecord> {
        self.leases.lock().unwrap().get(resource).cloned()
    }
}

fn compare_entries(a: &LedgerEntry, b: &LedgerEntry) -> std::cmp::Ordering {
    a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id))
}

impl LedgerStore for MemoryStore {
    fn append<'a>(&'a self, entry: &'a LedgerEntry) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().unwrap();
            if entries.iter().any(|e| e.sequence == entry.sequence) {
                return Err(StoreError::DuplicateSequence {
                    sequence: entry.sequence,
                });
            }
            let position = entries
                .binary_search_by(|e| compare_entries(e, entry))
                .unwrap_or_else(|insert_at| insert_at);
            entries.insert(position, entry.clone());
            Ok(())
        })
    }

    fn head<'a>(&'a self) -> BoxFuture<'a, Result<Option<LedgerEntry>, StoreError>> {
        Box::pin(async move {
            let entries = self.entries.lock().unwrap();
            Ok(entries.iter().max_by_key(|e| e.sequence).cloned())
        })
    }

    fn all<'a>(&'a self) -> BoxFuture<'a, Result<Vec<LedgerEntry>, StoreError>> {
        Box::pin(async move {
            let mut snapshot = self.entries.lock().unwrap().clone();
            snapshot.sort_by(compare_entries);
            Ok(snapshot)
        })
    }

    fn get_by_id<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<LedgerEntry>, StoreError>> {
        Box::pin(async move {
            let entries = self.entries.lock().unwrap();
            Ok(entries.iter().find(|e| e.id == id).cloned())
        })
    }

    fn acquire_or_renew_lease<'a>(
        &'a self,
        resource: &'a str,
        holder: &'a str,
        duration: Duration,
    ) -> BoxFuture<'a, Result<LeaseRecord, StoreError>> {
        Box::pin(async move {
            let now = Utc::now();
            let mut leases = self.leases.lock().unwrap();

            if let Some(existing) = leases.get(resource) {
                if existing.holder != holder && existing.expires_at > now {
                    return Err(StoreError::LeaseHeld {
                        resource: resource.to_string(),
                        holder: existing.holder.clone(),
                        expires_at: existing.expires_at,
                    });
                }
            }

            let expires_at = now
                + chrono::Duration::from_std(duration).map_err(|e| StoreError::Fatal {
                    message: format!("lease duration out of range: {e}"),
                })?;
            let record = LeaseRecord {
                resource: resource.to_string(),
                holder: holder.to_string(),
                expires_at,
                last_heartbeat: now,
            };
            leases.insert(resource.to_string(), record.clone());
            Ok(record)
        })
    }

    fn release_lease<'a>(
        &'a self,
        resource: &'a str,
        holder: &'a str,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut leases = self.leases.lock().unwrap();
            if leases.get(resource).is_some_and(|l| l.holder == holder) {
                leases.remove(resource);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use crate::entry::ZERO_GENESIS;

    use super::*;

    fn entry(sequence: u64) -> LedgerEntry {
        LedgerEntry {
            sequence,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            previous_hash: ZERO_GENESIS.to_string(),
            event_type: "T".to_string(),
            payload: json!({}),
            current_hash: "ab".repeat(32),
        }
    }

    #[tokio::test]
    async fn append_then_head_and_get_by_id() {
        let store = MemoryStore::new();
        let e1 = entry(1);
        let e2 = entry(2);

        store.append(&e1).await.unwrap();
        store.append(&e2).await.unwrap();

        assert_eq!(store.head().await.unwrap(), Some(e2.clone()));
        assert_eq!(store.get_by_id(e1.id).await.unwrap(), Some(e1));
        assert_eq!(store.get_by_id(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_distinct_error() {
        let store = MemoryStore::new();
        store.append(&entry(1)).await.unwrap();

        let err = store.append(&entry(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSequence { sequence: 1 }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn all_is_ordered_even_after_out_of_order_appends() {
        let store = MemoryStore::new();
        store.append(&entry(3)).await.unwrap();
        store.append(&entry(1)).await.unwrap();
        store.append(&entry(2)).await.unwrap();

        let sequences: Vec<u64> = store
            .all()
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_store_has_no_head() {
        let store = MemoryStore::new();
        assert_eq!(store.head().await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn lease_grants_renews_and_excludes() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        let granted = store
            .acquire_or_renew_lease("writer_lock", "w1", ttl)
            .await
            .unwrap();
        assert_eq!(granted.holder, "w1");

        // Renewal by the holder extends the expiry.
        let renewed = store
            .acquire_or_renew_lease("writer_lock", "w1", ttl)
            .await
            .unwrap();
        assert!(renewed.expires_at >= granted.expires_at);

        // A second worker is excluded while the lease is live.
        let err = store
            .acquire_or_renew_lease("writer_lock", "w2", ttl)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeaseHeld { ref holder, .. } if holder == "w1"));
    }

    #[tokio::test]
    async fn expired_lease_can_be_claimed_by_another_worker() {
        let store = MemoryStore::new();
        store
            .acquire_or_renew_lease("writer_lock", "w1", Duration::from_secs(0))
            .await
            .unwrap();

        let taken = store
            .acquire_or_renew_lease("writer_lock", "w2", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(taken.holder, "w2");
    }

    #[tokio::test]
    async fn release_frees_the_lease_only_for_its_holder() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store
            .acquire_or_renew_lease("writer_lock", "w1", ttl)
            .await
            .unwrap();

        // A stranger's release is a no-op.
        store.release_lease("writer_lock", "w2").await.unwrap();
        assert!(store.lease("writer_lock").is_some());

        store.release_lease("writer_lock", "w1").await.unwrap();
        assert!(store.lease("writer_lock").is_none());

        // The resource is immediately claimable again.
        let taken = store
            .acquire_or_renew_lease("writer_lock", "w2", ttl)
            .await
            .unwrap();
        assert_eq!(taken.holder, "w2");
    }

    #[tokio::test]
    async fn leases_on_different_resources_are_independent() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store
            .acquire_or_renew_lease("lock_a", "w1", ttl)
            .await
            .unwrap();
        store
            .acquire_or_renew_lease("lock_b", "w2", ttl)
            .await
            .unwrap();
        assert_eq!(store.lease("lock_a").unwrap().holder, "w1");
        assert_eq!(store.lease("lock_b").unwrap().holder, "w2");
    }
}
