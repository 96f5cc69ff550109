//! Core data models used throughout Issue Harness.
//!
//! These types represent the normalized issues, stored vector entries, and
//! query results that flow through the reconciliation and retrieval paths.

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};

/// Assignee value used when the tracker reports no assignee.
pub const UNASSIGNED: &str = "Unassigned";

/// Canonical representation of one tracked issue.
///
/// Produced by [`normalize`](crate::normalize::normalize) from a raw tracker
/// payload; consumed by the change detector and document builder within a
/// single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Issue key (e.g. `"SEC-1042"`). Primary identity; never changes.
    pub key: String,
    pub status: String,
    pub summary: String,
    /// Empty string when the tracker has no description.
    pub description: String,
    /// Creation time as Unix epoch seconds.
    pub created: i64,
    /// Assignee name or [`UNASSIGNED`].
    pub assignee: String,
    pub issue_type: String,
    pub comment_count: u64,
    /// Concatenated `"author: body, "` pairs.
    pub comment_text: String,
    /// Browse URL derived from the key.
    pub url: String,
}

/// Stored representation of the `created` metadata field.
///
/// Current entries store epoch seconds. Entries written by older versions
/// of the index hold the tracker's raw timestamp string; the change detector
/// treats those as stale so they get rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Created {
    Epoch(i64),
    Text(String),
}

impl Default for Created {
    fn default() -> Self {
        Created::Text(String::new())
    }
}

impl Created {
    pub fn epoch(&self) -> Option<i64> {
        match self {
            Created::Epoch(ts) => Some(*ts),
            Created::Text(_) => None,
        }
    }

    /// Human-readable local timestamp (`YYYY-MM-DD HH:MM:SS`).
    ///
    /// Legacy text values are returned unchanged.
    pub fn display(&self) -> String {
        match self {
            Created::Epoch(ts) => format_local_ts(*ts),
            Created::Text(s) => s.clone(),
        }
    }
}

/// Format epoch seconds in the server's local timezone.
pub fn format_local_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| ts.to_string())
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_legacy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Created, D::Error> {
    Ok(Option::<Created>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flattened metadata kept next to each stored embedding.
///
/// Used for filtering, display, and change detection. Every field tolerates
/// being absent or `null` in stored JSON so that entries written by older
/// schemas still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_legacy")]
    pub created: Created,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assignee: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issue_type: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub comment_count: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment_text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    /// Document fields the stored embedding was built from, as written by
    /// [`DocumentBuilder::fingerprint`](crate::document::DocumentBuilder::fingerprint).
    /// Empty for entries written before the field set was recorded.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub document_fields: String,
}

impl From<&Record> for EntryMetadata {
    fn from(record: &Record) -> Self {
        Self {
            key: record.key.clone(),
            status: record.status.clone(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            created: Created::Epoch(record.created),
            assignee: record.assignee.clone(),
            issue_type: record.issue_type.clone(),
            comment_count: record.comment_count,
            comment_text: record.comment_text.clone(),
            url: record.url.clone(),
            document_fields: String::new(),
        }
    }
}

/// One entry in the vector store: `(document, embedding, metadata)` keyed by
/// issue key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Same as the issue key.
    pub id: String,
    /// The text that was embedded.
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// A nearest-neighbour match returned by
/// [`VectorStore::query_nearest`](crate::store::VectorStore::query_nearest).
#[derive(Debug, Clone)]
pub struct NearestHit {
    pub key: String,
    pub metadata: EntryMetadata,
    /// Cosine distance (`1 - cosine similarity`); lower is closer.
    pub distance: f32,
}

/// A per-key failure isolated during the diff phase of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct FailedKey {
    pub key: String,
    pub error: String,
}

/// Result of one reconciliation pass. Not persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Keys that were (re)embedded and upserted, in fetch order.
    pub updated_keys: Vec<String>,
    /// Number of records fetched from the tracker.
    pub total_fetched: usize,
    /// Keys whose stored state could not be checked.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_keys: Vec<FailedKey>,
}

impl SyncReport {
    /// Records fetched but left untouched (unchanged or failed).
    pub fn skipped(&self) -> usize {
        self.total_fetched.saturating_sub(self.updated_keys.len())
    }
}

/// Display shape of one stored issue.
#[derive(Debug, Clone, Serialize)]
pub struct IssueView {
    pub key: String,
    pub summary: String,
    pub url: String,
    pub status: String,
    pub assignee: String,
    pub issue_type: String,
    pub description: String,
    pub comment_text: String,
    /// Local timestamp, see [`Created::display`].
    pub created: String,
}

impl From<&EntryMetadata> for IssueView {
    fn from(m: &EntryMetadata) -> Self {
        Self {
            key: m.key.clone(),
            summary: m.summary.clone(),
            url: m.url.clone(),
            status: m.status.clone(),
            assignee: m.assignee.clone(),
            issue_type: m.issue_type.clone(),
            description: m.description.clone(),
            comment_text: m.comment_text.clone(),
            created: m.created.display(),
        }
    }
}

/// A ranked similarity result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    #[serde(flatten)]
    pub issue: IssueView,
    pub distance: f32,
}

/// Output of the suggestion feature for one stored issue.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub suggestion: String,
}
