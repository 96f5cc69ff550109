//! Query resolution over the indexed issues.
//!
//! | Operation | Input | Output |
//! |-----------|-------|--------|
//! | [`resolve`](QueryResolver::resolve) | key or free text, limit | nearest issues |
//! | [`list_issues`](QueryResolver::list_issues) | assignee, created-after, limit | newest matching issues |
//! | [`suggest`](QueryResolver::suggest) | key | suggested fix for a stored issue |
//!
//! A key query reuses the stored embedding when the key is indexed. An
//! unindexed key is fetched from the tracker, indexed, and then used, so the
//! issue itself is the closest hit. Keys the tracker does not know yield an
//! empty result rather than an error.

use std::sync::Arc;

use issue_harness_core::document::{clean_text, DocumentBuilder};
use issue_harness_core::error::Result;
use issue_harness_core::models::{
    EntryMetadata, IssueView, QueryHit, StoredEntry, Suggestion,
};
use issue_harness_core::normalize::{normalize, parse_tracker_time};
use issue_harness_core::store::{FilterField, MetadataFilter, VectorStore};
use issue_harness_core::Error;

use crate::embedding::EmbeddingGateway;
use crate::suggest::SuggestionProvider;
use crate::tracker::IssueTracker;

pub struct QueryResolver {
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
    builder: DocumentBuilder,
    suggester: Arc<dyn SuggestionProvider>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl QueryResolver {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn VectorStore>,
        gateway: EmbeddingGateway,
        builder: DocumentBuilder,
        suggester: Arc<dyn SuggestionProvider>,
    ) -> Self {
        Self {
            tracker,
            store,
            gateway,
            builder,
            suggester,
        }
    }

    /// Nearest issues to a key's embedding or to free text.
    ///
    /// When both are given the key wins. Blank strings count as absent.
    pub async fn resolve(
        &self,
        key: Option<&str>,
        text: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueryHit>> {
        if limit == 0 {
            return Err(Error::validation("limit must be >= 1"));
        }

        let embedding = match (non_empty(key), non_empty(text)) {
            (Some(key), _) => match self.embedding_for_key(validate_key(key)?).await? {
                Some(v) => v,
                None => return Ok(Vec::new()),
            },
            (None, Some(text)) => {
                let cleaned = clean_text(text);
                if cleaned.is_empty() {
                    return Err(Error::validation("query text is empty after cleaning"));
                }
                self.gateway.embed_one(&cleaned).await?
            }
            (None, None) => {
                return Err(Error::validation("either a key or query text is required"));
            }
        };

        let mut hits = self
            .store
            .query_nearest(&embedding, limit)
            .await
            .map_err(Error::Store)?;
        hits.truncate(limit);

        Ok(hits
            .iter()
            .map(|h| QueryHit {
                issue: IssueView::from(&h.metadata),
                distance: h.distance,
            })
            .collect())
    }

    /// Stored embedding for `key`, indexing the issue on demand.
    ///
    /// `Ok(None)` when the tracker does not know the key.
    async fn embedding_for_key(&self, key: &str) -> Result<Option<Vec<f32>>> {
        if let Some(entry) = self.store.get_by_id(key).await.map_err(Error::Store)? {
            return Ok(Some(entry.embedding));
        }

        tracing::info!(key, "issue not indexed; fetching from tracker");
        let raw = match self.tracker.fetch_one(key).await.map_err(Error::Fetch)? {
            Some(raw) => raw,
            None => {
                tracing::info!(key, "issue not found in tracker");
                return Ok(None);
            }
        };

        let record = normalize(&raw, self.tracker.browse_base());
        if record.key.is_empty() || !record.key.eq_ignore_ascii_case(key) {
            tracing::warn!(
                key,
                returned = %record.key,
                "tracker answered with a different issue; treating as not found"
            );
            return Ok(None);
        }
        let document = self.builder.build(&record);
        let embedding = self.gateway.embed_one(&document).await?;

        let entry = StoredEntry {
            id: record.key.clone(),
            document,
            embedding: embedding.clone(),
            metadata: EntryMetadata {
                document_fields: self.builder.fingerprint(),
                ..EntryMetadata::from(&record)
            },
        };
        self.store
            .upsert_batch(std::slice::from_ref(&entry))
            .await
            .map_err(Error::Store)?;

        Ok(Some(embedding))
    }

    /// Stored issues filtered by assignee and creation time, newest first.
    ///
    /// `created_after` accepts `YYYY-MM-DD` (midnight UTC) or epoch seconds.
    pub async fn list_issues(
        &self,
        assignee: Option<&str>,
        created_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IssueView>> {
        if limit == 0 {
            return Err(Error::validation("limit must be >= 1"));
        }

        let mut filter = MetadataFilter::new();
        if let Some(assignee) = non_empty(assignee) {
            filter = filter.eq(FilterField::Assignee, assignee);
        }
        if let Some(after) = non_empty(created_after) {
            filter = filter.created_gte(parse_created_after(after)?);
        }

        let mut entries = self
            .store
            .get_filtered(&filter)
            .await
            .map_err(Error::Store)?;

        entries.sort_by(|a, b| {
            let ta = a.created.epoch().unwrap_or(i64::MIN);
            let tb = b.created.epoch().unwrap_or(i64::MIN);
            tb.cmp(&ta).then_with(|| a.key.cmp(&b.key))
        });
        entries.truncate(limit);

        Ok(entries.iter().map(IssueView::from).collect())
    }

    /// Ask the suggestion provider about a stored issue.
    ///
    /// `Ok(None)` when the key is not indexed.
    pub async fn suggest(&self, key: &str) -> Result<Option<Suggestion>> {
        let key = validate_key(key)?;

        let entry = match self.store.get_by_id(key).await.map_err(Error::Store)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let suggestion = self
            .suggester
            .suggest(&entry.document)
            .await
            .map_err(Error::Suggestion)?;

        Ok(Some(Suggestion {
            key: entry.id,
            summary: entry.metadata.summary,
            description: entry.metadata.description,
            suggestion,
        }))
    }
}

/// Check that `key` can be used as a single tracker URL path segment.
pub fn validate_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::validation("key is required"));
    }
    let bad_char = key
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace());
    if bad_char || key == "." || key == ".." {
        return Err(Error::validation(format!("'{}' is not a valid issue key", key)));
    }
    Ok(key)
}

/// Parse `YYYY-MM-DD` or epoch seconds.
pub fn parse_created_after(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(epoch) = s.parse::<i64>() {
        return Ok(epoch);
    }
    parse_tracker_time(s).ok_or_else(|| {
        Error::validation(format!(
            "created_after '{}' is not a YYYY-MM-DD date or epoch seconds",
            s
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_created_after() {
        assert_eq!(parse_created_after("1700000000").unwrap(), 1_700_000_000);
        assert_eq!(parse_created_after("2024-01-15").unwrap(), 1_705_276_800);
        assert!(matches!(
            parse_created_after("last week"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key(" SEC-12 ").unwrap(), "SEC-12");
        for bad in ["", "SEC-1/comment", "../x", "..", "a?b", "a#b", "SEC 1", "a%2Fb", "a\\b"] {
            assert!(
                matches!(validate_key(bad), Err(Error::Validation(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" SEC-1 ")), Some("SEC-1"));
        assert_eq!(non_empty(None), None);
    }
}
