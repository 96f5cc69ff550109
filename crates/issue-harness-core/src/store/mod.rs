//! Storage abstraction for Issue Harness.
//!
//! The [`VectorStore`] trait defines the persistent key → (document,
//! embedding, metadata) mapping used by reconciliation and retrieval,
//! enabling pluggable backends (SQLite, in-memory).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_by_id`](VectorStore::get_by_id) | Full entry for one key |
//! | [`get_metadata`](VectorStore::get_metadata) | Metadata only, for change detection |
//! | [`get_filtered`](VectorStore::get_filtered) | Metadata matching a [`MetadataFilter`] |
//! | [`upsert_batch`](VectorStore::upsert_batch) | Insert or replace entries by id |
//! | [`query_nearest`](VectorStore::query_nearest) | `k` nearest entries by cosine distance |

pub mod memory;

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{EntryMetadata, NearestHit, StoredEntry};

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value.
    Eq,
    /// Field is greater than or equal to the value.
    Gte,
}

/// Value side of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
}

/// Filterable metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Assignee,
    Status,
    IssueType,
    /// Epoch seconds; entries with a legacy text `created` never match.
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// Conjunction of conditions. An empty filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub conditions: Vec<Condition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field,
            op: FilterOp::Eq,
            value: FilterValue::Text(value.into()),
        });
        self
    }

    pub fn created_gte(mut self, epoch: i64) -> Self {
        self.conditions.push(Condition {
            field: FilterField::Created,
            op: FilterOp::Gte,
            value: FilterValue::Int(epoch),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `meta` satisfies every condition.
    pub fn matches(&self, meta: &EntryMetadata) -> bool {
        self.conditions.iter().all(|c| c.matches(meta))
    }
}

impl Condition {
    fn matches(&self, meta: &EntryMetadata) -> bool {
        match (self.field, &self.value) {
            (FilterField::Created, FilterValue::Int(v)) => match meta.created.epoch() {
                Some(ts) => compare(self.op, ts.cmp(v)),
                None => false,
            },
            (FilterField::Created, FilterValue::Text(_)) => false,
            (field, FilterValue::Text(v)) => {
                let actual = match field {
                    FilterField::Assignee => &meta.assignee,
                    FilterField::Status => &meta.status,
                    FilterField::IssueType => &meta.issue_type,
                    FilterField::Created => return false,
                };
                compare(self.op, actual.as_str().cmp(v.as_str()))
            }
            (_, FilterValue::Int(_)) => false,
        }
    }
}

fn compare(op: FilterOp, ord: Ordering) -> bool {
    match op {
        FilterOp::Eq => ord == Ordering::Equal,
        FilterOp::Gte => ord != Ordering::Less,
    }
}

/// Rank `entries` by cosine distance to `query` and keep the closest `k`.
///
/// Ties are broken by key so results are deterministic. Shared by every
/// brute-force backend.
pub fn rank_nearest<'a, I>(query: &[f32], entries: I, k: usize) -> Vec<NearestHit>
where
    I: IntoIterator<Item = (&'a str, &'a [f32], &'a EntryMetadata)>,
{
    let mut hits: Vec<NearestHit> = entries
        .into_iter()
        .map(|(key, emb, meta)| NearestHit {
            key: key.to_string(),
            metadata: meta.clone(),
            distance: cosine_distance(query, emb),
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(k);
    hits
}

/// Sort hits ascending by distance, then by key.
pub fn sort_hits(hits: &mut [NearestHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Abstract vector store backend.
///
/// Absence is not an error: lookups of unknown keys return `Ok(None)`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embedding dimensionality this store accepts, if fixed.
    fn dims(&self) -> Option<usize>;

    /// Retrieve the full entry for `key`.
    async fn get_by_id(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Retrieve only the metadata for `key`.
    async fn get_metadata(&self, key: &str) -> Result<Option<EntryMetadata>> {
        Ok(self.get_by_id(key).await?.map(|e| e.metadata))
    }

    /// All metadata entries matching `filter`, in unspecified order.
    async fn get_filtered(&self, filter: &MetadataFilter) -> Result<Vec<EntryMetadata>>;

    /// Insert or replace entries by id. Re-upserting identical content
    /// leaves the store unchanged.
    async fn upsert_batch(&self, entries: &[StoredEntry]) -> Result<()>;

    /// The `k` entries nearest to `embedding`, ascending by distance.
    async fn query_nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<NearestHit>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;
}

/// Reject entries whose embedding length does not match `dims`.
pub fn check_dims(dims: Option<usize>, entries: &[StoredEntry]) -> Result<()> {
    if let Some(expected) = dims {
        for e in entries {
            if e.embedding.len() != expected {
                anyhow::bail!(
                    "embedding for '{}' has {} dimensions, store expects {}",
                    e.id,
                    e.embedding.len(),
                    expected
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Created;

    fn meta(assignee: &str, created: Created) -> EntryMetadata {
        let mut m: EntryMetadata = serde_json::from_str("{}").unwrap();
        m.assignee = assignee.into();
        m.created = created;
        m
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(MetadataFilter::new().matches(&meta("x", Created::default())));
    }

    #[test]
    fn test_assignee_and_created_conjunction() {
        let f = MetadataFilter::new()
            .eq(FilterField::Assignee, "alice")
            .created_gte(100);
        assert!(f.matches(&meta("alice", Created::Epoch(100))));
        assert!(f.matches(&meta("alice", Created::Epoch(200))));
        assert!(!f.matches(&meta("alice", Created::Epoch(99))));
        assert!(!f.matches(&meta("bob", Created::Epoch(200))));
    }

    #[test]
    fn test_legacy_created_never_matches_range() {
        let f = MetadataFilter::new().created_gte(0);
        assert!(!f.matches(&meta("alice", Created::Text("2024-01-01".into()))));
    }

    #[test]
    fn test_rank_nearest_orders_and_truncates() {
        let m = meta("a", Created::Epoch(0));
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let c = vec![1.0, 0.1];
        let entries = vec![
            ("B", b.as_slice(), &m),
            ("A", a.as_slice(), &m),
            ("C", c.as_slice(), &m),
        ];
        let hits = rank_nearest(&[1.0, 0.0], entries, 2);
        let keys: Vec<_> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "C"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_rank_nearest_ties_break_by_key() {
        let m = meta("a", Created::Epoch(0));
        let v = vec![1.0, 1.0];
        let entries = vec![("Z-1", v.as_slice(), &m), ("A-1", v.as_slice(), &m)];
        let hits = rank_nearest(&[1.0, 1.0], entries, 5);
        assert_eq!(hits[0].key, "A-1");
        assert_eq!(hits[1].key, "Z-1");
    }

    #[test]
    fn test_check_dims() {
        let entry = StoredEntry {
            id: "A-1".into(),
            document: "doc".into(),
            embedding: vec![0.0; 3],
            metadata: meta("a", Created::Epoch(0)),
        };
        assert!(check_dims(Some(3), std::slice::from_ref(&entry)).is_ok());
        assert!(check_dims(None, std::slice::from_ref(&entry)).is_ok());
        let err = check_dims(Some(4), &[entry]).unwrap_err();
        assert!(err.to_string().contains("A-1"));
    }
}
