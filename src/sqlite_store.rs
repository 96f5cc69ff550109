//! SQLite-backed [`VectorStore`] implementation.
//!
//! One row per issue key in the `entries` table. Embeddings are stored as
//! little-endian f32 BLOBs and metadata as a JSON object. Nearest-neighbour
//! and filtered queries are brute-force scans evaluated in Rust.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use issue_harness_core::embedding::{blob_to_vec, vec_to_blob};
use issue_harness_core::models::{EntryMetadata, NearestHit, StoredEntry};
use issue_harness_core::store::{check_dims, rank_nearest, MetadataFilter, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
///
/// When constructed without a fixed dimension, the collection adopts the
/// dimension of the first vector written to it.
pub struct SqliteStore {
    pool: SqlitePool,
    dims: Option<usize>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, dims: Option<usize>) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn collection_dims(&self) -> Result<Option<usize>> {
        if self.dims.is_some() {
            return Ok(self.dims);
        }
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM entries LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }
}

/// Decode stored metadata. A row that does not parse is logged and treated
/// as absent, so scans skip it and the next upsert of its key rewrites it.
fn parse_metadata(id: &str, json: &str) -> Option<EntryMetadata> {
    match serde_json::from_str(json) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(id, error = %e, "skipping entry with unreadable metadata");
            None
        }
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn get_by_id(&self, key: &str) -> Result<Option<StoredEntry>> {
        let row = sqlx::query(
            "SELECT id, document, embedding, metadata_json FROM entries WHERE id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let id: String = row.get("id");
        let blob: Vec<u8> = row.get("embedding");
        let metadata_json: String = row.get("metadata_json");
        let Some(metadata) = parse_metadata(&id, &metadata_json) else {
            return Ok(None);
        };

        Ok(Some(StoredEntry {
            id,
            document: row.get("document"),
            embedding: blob_to_vec(&blob),
            metadata,
        }))
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<EntryMetadata>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT metadata_json FROM entries WHERE id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(json.and_then(|j| parse_metadata(key, &j)))
    }

    async fn get_filtered(&self, filter: &MetadataFilter) -> Result<Vec<EntryMetadata>> {
        let rows = sqlx::query("SELECT id, metadata_json FROM entries")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::new();
        for row in &rows {
            let id: String = row.get("id");
            let json: String = row.get("metadata_json");
            match parse_metadata(&id, &json) {
                Some(meta) if filter.matches(&meta) => out.push(meta),
                _ => {}
            }
        }
        Ok(out)
    }

    async fn upsert_batch(&self, entries: &[StoredEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let expected = match self.collection_dims().await? {
            Some(d) => Some(d),
            None => entries.first().map(|e| e.embedding.len()),
        };
        check_dims(expected, entries)?;

        let mut tx = self.pool.begin().await?;

        for e in entries {
            let metadata_json = serde_json::to_string(&e.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO entries (id, document, embedding, dims, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&e.id)
            .bind(&e.document)
            .bind(vec_to_blob(&e.embedding))
            .bind(e.embedding.len() as i64)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query_nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<NearestHit>> {
        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM entries")
            .fetch_all(&self.pool)
            .await?;

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let json: String = row.get("metadata_json");
            if let Some(meta) = parse_metadata(&id, &json) {
                decoded.push((id, blob_to_vec(&blob), meta));
            }
        }

        Ok(rank_nearest(
            embedding,
            decoded
                .iter()
                .map(|(id, v, m)| (id.as_str(), v.as_slice(), m)),
            k,
        ))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use issue_harness_core::models::Record;

    fn entry(key: &str, embedding: Vec<f32>) -> StoredEntry {
        let record = Record {
            key: key.into(),
            status: "Open".into(),
            summary: format!("summary of {}", key),
            description: String::new(),
            created: 1_700_000_000,
            assignee: "alice".into(),
            issue_type: "Bug".into(),
            comment_count: 0,
            comment_text: String::new(),
            url: format!("https://t/browse/{}", key),
        };
        StoredEntry {
            id: key.into(),
            document: record.summary.clone(),
            embedding,
            metadata: EntryMetadata::from(&record),
        }
    }

    async fn store_with_bad_row() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("t.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let store = SqliteStore::new(pool, None);

        store
            .upsert_batch(&[entry("GOOD-1", vec![1.0, 0.0])])
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO entries (id, document, embedding, dims, metadata_json) VALUES (?, ?, ?, 2, ?)",
        )
        .bind("BAD-1")
        .bind("bad")
        .bind(vec_to_blob(&[1.0, 0.0]))
        .bind(r#"{"key":"BAD-1","created":{"when":"?"}}"#)
        .execute(store.pool())
        .await
        .unwrap();

        (tmp, store)
    }

    #[tokio::test]
    async fn test_unreadable_row_is_skipped_by_scans() {
        let (_tmp, store) = store_with_bad_row().await;

        let hits = store.query_nearest(&[1.0, 0.0], 10).await.unwrap();
        let keys: Vec<_> = hits.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["GOOD-1"]);

        let listed = store.get_filtered(&MetadataFilter::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "GOOD-1");

        assert!(store.get_metadata("BAD-1").await.unwrap().is_none());
        assert!(store.get_by_id("BAD-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_row_is_rewritten_by_upsert() {
        let (_tmp, store) = store_with_bad_row().await;

        store
            .upsert_batch(&[entry("BAD-1", vec![0.0, 1.0])])
            .await
            .unwrap();
        let healed = store.get_metadata("BAD-1").await.unwrap().unwrap();
        assert_eq!(healed.summary, "summary of BAD-1");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_null_fields_in_stored_metadata_load() {
        let (_tmp, store) = store_with_bad_row().await;
        sqlx::query("UPDATE entries SET metadata_json = ? WHERE id = 'GOOD-1'")
            .bind(r#"{"key":"GOOD-1","created":null,"comment_count":null}"#)
            .execute(store.pool())
            .await
            .unwrap();

        let meta = store.get_metadata("GOOD-1").await.unwrap().unwrap();
        assert_eq!(meta.created.epoch(), None);
        assert_eq!(meta.comment_count, 0);
    }
}
