//! In-memory blob store backed by a concurrent map.
//!
//! Serves the devnet node and the test suite. Tests can inject outages to
//! exercise the pipeline's bounded store-retry budget.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::blob::{BlobStore, StoreError};
use super::content_id::ContentId;

/// Concurrent, content-addressed map of blobs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<ContentId, Vec<u8>>,
    // Remaining operations that should fail with Unavailable.
    outage_budget: AtomicU32,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `calls` operations (puts and gets alike) fail with
    /// [`StoreError::Unavailable`].
    pub fn fail_next(&self, calls: u32) {
        self.outage_budget.store(calls, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.blobs.contains_key(id)
    }

    fn consume_outage(&self) -> bool {
        self.outage_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, payload: Vec<u8>) -> Result<ContentId, StoreError> {
        if self.consume_outage() {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        let id = ContentId::for_bytes(&payload);
        self.blobs.insert(id, payload);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        if self.consume_outage() {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.blobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryBlobStore::new();
        let id = store.put(b"attestation".to_vec()).await.expect("put");
        assert_eq!(store.get(&id).await.expect("get"), b"attestation");
    }

    #[tokio::test]
    async fn get_of_unknown_id_is_not_found() {
        let store = MemoryBlobStore::new();
        let missing = ContentId::for_bytes(b"never stored");
        assert!(matches!(
            store.get(&missing).await,
            Err(StoreError::NotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn put_is_idempotent_by_content() {
        let store = MemoryBlobStore::new();
        let a = store.put(b"same".to_vec()).await.expect("put");
        let b = store.put(b"same".to_vec()).await.expect("put");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn injected_outage_fails_exactly_n_calls() {
        let store = MemoryBlobStore::new();
        let id = store.put(b"payload".to_vec()).await.expect("put");

        store.fail_next(2);
        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.put(b"other".to_vec()).await,
            Err(StoreError::Unavailable(_))
        ));
        // Budget spent; the store is healthy again.
        assert_eq!(store.get(&id).await.expect("get"), b"payload");
    }
}
