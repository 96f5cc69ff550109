//! In-memory [`VectorStore`] implementation for testing.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety.
//! Nearest-neighbour search is brute-force cosine distance over all
//! stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EntryMetadata, NearestHit, StoredEntry};

use super::{check_dims, rank_nearest, MetadataFilter, VectorStore};

/// In-memory store keyed by issue key.
pub struct InMemoryStore {
    dims: Option<usize>,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl InMemoryStore {
    /// A store that accepts embeddings of any length.
    pub fn new() -> Self {
        Self {
            dims: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A store that rejects embeddings whose length is not `dims`.
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims: Some(dims),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn get_by_id(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn get_filtered(&self, filter: &MetadataFilter) -> Result<Vec<EntryMetadata>> {
        Ok(self
            .read()?
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| e.metadata.clone())
            .collect())
    }

    async fn upsert_batch(&self, entries: &[StoredEntry]) -> Result<()> {
        check_dims(self.dims, entries)?;
        let mut map = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        for e in entries {
            map.insert(e.id.clone(), e.clone());
        }
        Ok(())
    }

    async fn query_nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<NearestHit>> {
        let map = self.read()?;
        Ok(rank_nearest(
            embedding,
            map.values()
                .map(|e| (e.id.as_str(), e.embedding.as_slice(), &e.metadata)),
            k,
        ))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Created, Record};
    use crate::store::FilterField;

    fn entry(key: &str, assignee: &str, created: i64, embedding: Vec<f32>) -> StoredEntry {
        let record = Record {
            key: key.into(),
            status: "Open".into(),
            summary: format!("summary of {}", key),
            description: String::new(),
            created,
            assignee: assignee.into(),
            issue_type: "Bug".into(),
            comment_count: 0,
            comment_text: String::new(),
            url: format!("https://t/browse/{}", key),
        };
        StoredEntry {
            id: key.into(),
            document: format!("{} {}", key, record.summary),
            embedding,
            metadata: EntryMetadata::from(&record),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = InMemoryStore::new();
        store
            .upsert_batch(&[entry("A-1", "alice", 10, vec![1.0, 0.0])])
            .await
            .unwrap();
        let got = store.get_by_id("A-1").await.unwrap().unwrap();
        assert_eq!(got.metadata.assignee, "alice");
        assert_eq!(got.metadata.created, Created::Epoch(10));
        assert!(store.get_by_id("A-2").await.unwrap().is_none());
        assert!(store.get_metadata("A-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryStore::new();
        store
            .upsert_batch(&[entry("A-1", "alice", 10, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_batch(&[entry("A-1", "bob", 10, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let meta = store.get_metadata("A-1").await.unwrap().unwrap();
        assert_eq!(meta.assignee, "bob");
    }

    #[tokio::test]
    async fn test_reupsert_is_idempotent() {
        let store = InMemoryStore::new();
        let e = entry("A-1", "alice", 10, vec![1.0, 0.0]);
        store.upsert_batch(std::slice::from_ref(&e)).await.unwrap();
        store.upsert_batch(std::slice::from_ref(&e)).await.unwrap();
        assert_eq!(store.get_by_id("A-1").await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = InMemoryStore::with_dims(3);
        let err = store
            .upsert_batch(&[entry("A-1", "alice", 10, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dimensions"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_filtered() {
        let store = InMemoryStore::new();
        store
            .upsert_batch(&[
                entry("A-1", "alice", 100, vec![1.0]),
                entry("A-2", "alice", 300, vec![1.0]),
                entry("A-3", "bob", 300, vec![1.0]),
            ])
            .await
            .unwrap();
        let f = MetadataFilter::new()
            .eq(FilterField::Assignee, "alice")
            .created_gte(200);
        let got = store.get_filtered(&f).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].key, "A-2");
        assert_eq!(
            store.get_filtered(&MetadataFilter::new()).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_query_nearest() {
        let store = InMemoryStore::new();
        store
            .upsert_batch(&[
                entry("A-1", "a", 0, vec![1.0, 0.0]),
                entry("A-2", "a", 0, vec![0.0, 1.0]),
                entry("A-3", "a", 0, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();
        let hits = store.query_nearest(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "A-1");
        assert_eq!(hits[1].key, "A-3");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_nearest_empty_store() {
        let store = InMemoryStore::new();
        assert!(store.query_nearest(&[1.0], 5).await.unwrap().is_empty());
    }
}
