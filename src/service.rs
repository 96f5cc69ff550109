//! Service facade wiring the components together.
//!
//! [`IssueService`] owns one reconciler, one query resolver, and one
//! scheduler, all sharing the same tracker, store, and embedding gateway.
//! The HTTP server and the CLI both go through it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use issue_harness_core::document::DocumentBuilder;
use issue_harness_core::embedding::EmbeddingProvider;
use issue_harness_core::error::Result;
use issue_harness_core::models::{IssueView, QueryHit, Suggestion, SyncReport};
use issue_harness_core::store::VectorStore;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingGateway};
use crate::migrate;
use crate::query::QueryResolver;
use crate::reconcile::{ReconcileSettings, Reconciler};
use crate::scheduler::Scheduler;
use crate::sqlite_store::SqliteStore;
use crate::suggest::{create_suggester, SuggestionProvider};
use crate::tracker::{IssueTracker, JiraTracker};

pub struct IssueService {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    reconciler: Arc<Reconciler>,
    resolver: QueryResolver,
    scheduler: Scheduler,
}

impl IssueService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        config: Config,
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        suggester: Arc<dyn SuggestionProvider>,
    ) -> Self {
        let gateway = EmbeddingGateway::from_config(embedder, &config.embedding);
        let builder = DocumentBuilder::new(config.sync.document_fields.clone());

        let reconciler = Arc::new(Reconciler::new(
            tracker.clone(),
            store.clone(),
            gateway.clone(),
            builder.clone(),
            ReconcileSettings::from_config(&config),
        ));
        let resolver = QueryResolver::new(tracker, store.clone(), gateway, builder, suggester);
        let scheduler = Scheduler::new(
            reconciler.clone(),
            Duration::from_secs(config.sync.interval_secs),
            Duration::from_secs(config.sync.stop_timeout_secs),
        );

        Self {
            config: Arc::new(config),
            store,
            reconciler,
            resolver,
            scheduler,
        }
    }

    /// Build the production service: Jira tracker, SQLite store, and the
    /// configured providers.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate_pool(&pool)
            .await
            .context("failed to migrate database")?;

        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::new(pool, config.embedding.dims));
        let tracker: Arc<dyn IssueTracker> = Arc::new(JiraTracker::new(&config.tracker)?);
        let embedder = create_provider(&config.embedding)?;
        let suggester = create_suggester(&config.suggest)?;

        Ok(Self::new(config, tracker, store, embedder, suggester))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one reconciliation pass now.
    pub async fn trigger_sync(&self) -> Result<SyncReport> {
        self.reconciler.run().await
    }

    /// Similarity query; `limit` defaults to `retrieval.default_limit`.
    pub async fn resolve_query(
        &self,
        key: Option<&str>,
        text: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<QueryHit>> {
        let limit = limit.unwrap_or(self.config.retrieval.default_limit);
        self.resolver.resolve(key, text, limit).await
    }

    /// Filtered listing; `limit` defaults to `retrieval.list_limit`.
    pub async fn list_issues(
        &self,
        assignee: Option<&str>,
        created_after: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<IssueView>> {
        let limit = limit.unwrap_or(self.config.retrieval.list_limit);
        self.resolver
            .list_issues(assignee, created_after, limit)
            .await
    }

    pub async fn suggest(&self, key: &str) -> Result<Option<Suggestion>> {
        self.resolver.suggest(key).await
    }
}
