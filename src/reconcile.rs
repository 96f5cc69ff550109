//! Reconciliation: bring the vector store in line with the tracker.
//!
//! One pass runs these phases:
//!
//! ```text
//! fetch ──▶ normalize ──▶ dedupe ──▶ diff (bounded pool) ──▶ build docs
//!                                                               │
//!           SyncReport ◀── upsert_batch ◀── embed_batch ◀───────┘
//! ```
//!
//! | Phase | Failure |
//! |-------|---------|
//! | fetch | aborts with `Error::Fetch` |
//! | diff | per key: recorded in `failed_keys` (or aborts with `Error::Store` under `fail_fast`) |
//! | embed | aborts with `Error::Embedding`; nothing is written |
//! | upsert | aborts with `Error::Store` |
//!
//! Passes are not atomic across the tracker and the store. A pass that
//! aborts after fetching leaves the store untouched, so the next pass
//! retries the same records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use issue_harness_core::change::{decide_for, ChangeReason, Decision};
use issue_harness_core::document::DocumentBuilder;
use issue_harness_core::error::Result;
use issue_harness_core::models::{EntryMetadata, FailedKey, Record, StoredEntry, SyncReport};
use issue_harness_core::normalize::normalize;
use issue_harness_core::pool::WorkerPool;
use issue_harness_core::store::VectorStore;
use issue_harness_core::Error;

use crate::config::Config;
use crate::embedding::EmbeddingGateway;
use crate::tracker::{fetch_all, IssueTracker};

/// Knobs for a reconciliation pass, taken from `[tracker]` and `[sync]`.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub query: String,
    pub fetch_size: usize,
    pub page_size: usize,
    pub diff_workers: usize,
    pub fail_fast: bool,
}

impl ReconcileSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            query: config.tracker.query.clone(),
            fetch_size: config.tracker.fetch_size,
            page_size: config.tracker.page_size,
            diff_workers: config.sync.diff_workers,
            fail_fast: config.sync.fail_fast,
        }
    }
}

pub struct Reconciler {
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn VectorStore>,
    gateway: EmbeddingGateway,
    builder: DocumentBuilder,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn VectorStore>,
        gateway: EmbeddingGateway,
        builder: DocumentBuilder,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            tracker,
            store,
            gateway,
            builder,
            settings,
        }
    }

    /// Run one full reconciliation pass.
    pub async fn run(&self) -> Result<SyncReport> {
        let started = Instant::now();
        tracing::info!(query = %self.settings.query, "sync pass started");

        let raw = fetch_all(
            self.tracker.as_ref(),
            &self.settings.query,
            self.settings.fetch_size,
            self.settings.page_size,
        )
        .await
        .map_err(Error::Fetch)?;

        let total_fetched = raw.len();
        let browse_base = self.tracker.browse_base();
        let records = dedupe(
            raw.iter()
                .map(|issue| normalize(issue, browse_base))
                .filter(|r| !r.key.is_empty())
                .collect(),
        );

        let (changed, failed_keys) = self.diff(&records).await?;

        let mut report = SyncReport {
            updated_keys: Vec::new(),
            total_fetched,
            failed_keys,
        };

        if !changed.is_empty() {
            let documents: Vec<String> = changed.iter().map(|r| self.builder.build(r)).collect();
            let embeddings = self.gateway.embed_batch(&documents).await?;

            let entries: Vec<StoredEntry> = changed
                .iter()
                .zip(documents)
                .zip(embeddings)
                .map(|((record, document), embedding)| StoredEntry {
                    id: record.key.clone(),
                    document,
                    embedding,
                    metadata: EntryMetadata {
                        document_fields: self.builder.fingerprint(),
                        ..EntryMetadata::from(*record)
                    },
                })
                .collect();

            self.store
                .upsert_batch(&entries)
                .await
                .map_err(Error::Store)?;

            report.updated_keys = changed.iter().map(|r| r.key.clone()).collect();
        }

        tracing::info!(
            fetched = report.total_fetched,
            updated = report.updated_keys.len(),
            skipped = report.skipped(),
            failed = report.failed_keys.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass finished"
        );

        Ok(report)
    }

    /// Compare every record with its stored metadata using a bounded pool.
    ///
    /// Returns the records that need an upsert, in input order, and the
    /// keys whose lookup failed.
    async fn diff<'a>(&self, records: &'a [Record]) -> Result<(Vec<&'a Record>, Vec<FailedKey>)> {
        let pool = WorkerPool::new(self.settings.diff_workers.min(records.len()));
        let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
        let lookups = pool
            .map_ordered(keys, |key| {
                let store = self.store.clone();
                async move { store.get_metadata(&key).await }
            })
            .await;

        let mut changed = Vec::new();
        let mut failed = Vec::new();

        for (record, lookup) in records.iter().zip(lookups) {
            match lookup {
                Ok(existing) => match decide_for(existing.as_ref(), record, &self.builder) {
                    Decision::Unchanged => {}
                    Decision::NeedsUpsert(reason) => {
                        log_reason(&record.key, &reason);
                        changed.push(record);
                    }
                },
                Err(e) if self.settings.fail_fast => {
                    return Err(Error::Store(
                        e.context(format!("lookup of '{}' failed", record.key)),
                    ));
                }
                Err(e) => {
                    tracing::warn!(key = %record.key, error = %e, "stored state lookup failed; skipping");
                    failed.push(FailedKey {
                        key: record.key.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        Ok((changed, failed))
    }
}

fn log_reason(key: &str, reason: &ChangeReason) {
    match reason {
        ChangeReason::New => tracing::debug!(key, "new issue"),
        ChangeReason::LegacyCreated => tracing::debug!(key, "stored created is legacy text"),
        ChangeReason::Fields(fields) => tracing::debug!(key, ?fields, "issue changed"),
        ChangeReason::DocumentFields => tracing::debug!(key, "document field set changed"),
    }
}

/// Collapse repeated keys to their last occurrence, keeping fetch order
/// of those last occurrences.
fn dedupe(records: Vec<Record>) -> Vec<Record> {
    let mut last: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        last.insert(r.key.clone(), i);
    }
    if last.len() == records.len() {
        return records;
    }
    records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| last.get(&r.key) == Some(i))
        .map(|(_, r)| r)
        .collect()
}
