//! TOML configuration.
//!
//! A single immutable [`Config`] is loaded once at startup by
//! [`load_config`] and passed to every component at construction time.
//! Secrets are never read from the file: the tracker token and the OpenAI
//! key come from environment variables.
//!
//! ```toml
//! [db]
//! path = "./data/issues.sqlite"
//!
//! [tracker]
//! url = "https://jira.example.com"
//! query = "project = SEC ORDER BY created DESC"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use issue_harness_core::document::DocumentField;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Base URL of the tracker, e.g. `https://jira.example.com`.
    pub url: String,
    /// Search query (JQL) selecting the issues to index.
    pub query: String,
    /// Upper bound on records fetched per reconciliation pass.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Records requested per search page; the tracker caps this at 1000.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Basic-auth username. Without it the token is sent as a bearer token.
    #[serde(default)]
    pub username: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fetch_size() -> usize {
    1000
}
fn default_page_size() -> usize {
    1000
}
fn default_token_env() -> String {
    "JIRA_API_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Texts per gateway chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Concurrent provider calls inside one chunk.
    #[serde(default = "default_embed_workers")]
    pub workers: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            max_retries: 5,
            timeout_secs: 30,
            chunk_size: 50,
            workers: 50,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_chunk_size() -> usize {
    50
}
fn default_embed_workers() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SuggestConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Chat endpoint base, e.g. `http://localhost:11434`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_suggest_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: 120,
        }
    }
}

fn default_suggest_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Start the periodic scheduler with `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    /// Concurrent store lookups during the diff phase.
    #[serde(default = "default_diff_workers")]
    pub diff_workers: usize,
    /// Abort the pass on the first per-key lookup failure instead of
    /// recording it and continuing.
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_document_fields")]
    pub document_fields: Vec<DocumentField>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            stop_timeout_secs: 10,
            diff_workers: 100,
            fail_fast: false,
            document_fields: default_document_fields(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_stop_timeout_secs() -> u64 {
    10
}
fn default_diff_workers() -> usize {
    100
}
fn default_document_fields() -> Vec<DocumentField> {
    vec![
        DocumentField::Key,
        DocumentField::Summary,
        DocumentField::Description,
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            list_limit: 100,
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_list_limit() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate tracker
    if config.tracker.url.trim().is_empty() {
        anyhow::bail!("tracker.url must not be empty");
    }
    if config.tracker.query.trim().is_empty() {
        anyhow::bail!("tracker.query must not be empty");
    }
    if config.tracker.fetch_size == 0 {
        anyhow::bail!("tracker.fetch_size must be > 0");
    }
    if config.tracker.page_size == 0 {
        anyhow::bail!("tracker.page_size must be > 0");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.chunk_size == 0 {
        anyhow::bail!("embedding.chunk_size must be > 0");
    }
    if config.embedding.workers == 0 {
        anyhow::bail!("embedding.workers must be > 0");
    }

    // Validate suggestion provider
    match config.suggest.provider.as_str() {
        "disabled" => {}
        "ollama" => {
            if config.suggest.model.is_none() {
                anyhow::bail!("suggest.model must be specified when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown suggest provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    // Validate sync
    if config.sync.interval_secs == 0 {
        anyhow::bail!("sync.interval_secs must be > 0");
    }
    if config.sync.diff_workers == 0 {
        anyhow::bail!("sync.diff_workers must be > 0");
    }
    if config.sync.document_fields.is_empty() {
        anyhow::bail!("sync.document_fields must name at least one field");
    }

    // Validate retrieval
    if config.retrieval.default_limit == 0 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.list_limit == 0 {
        anyhow::bail!("retrieval.list_limit must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [db]
        path = "./data/issues.sqlite"

        [tracker]
        url = "https://jira.example.com"
        query = "project = SEC"

        [server]
        bind = "127.0.0.1:7331"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.tracker.fetch_size, 1000);
        assert_eq!(cfg.tracker.token_env, "JIRA_API_TOKEN");
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.embedding.chunk_size, 50);
        assert_eq!(cfg.embedding.workers, 50);
        assert_eq!(cfg.sync.interval_secs, 3600);
        assert_eq!(cfg.sync.stop_timeout_secs, 10);
        assert_eq!(cfg.sync.diff_workers, 100);
        assert!(!cfg.sync.fail_fast);
        assert_eq!(cfg.sync.document_fields, default_document_fields());
        assert_eq!(cfg.retrieval.default_limit, 5);
        assert_eq!(cfg.retrieval.list_limit, 100);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.suggest.provider, "disabled");
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let text = format!("{}\n[embedding]\nprovider = \"openai\"\ndims = 8\n", MINIMAL);
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("embedding.model"));

        let text = format!(
            "{}\n[embedding]\nprovider = \"ollama\"\nmodel = \"m\"\n",
            MINIMAL
        );
        let err = parse_config(&text).unwrap_err().to_string();
        assert!(err.contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let text = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_document_fields_parse() {
        let text = format!(
            "{}\n[sync]\ndocument_fields = [\"summary\", \"comments\"]\n",
            MINIMAL
        );
        let cfg = parse_config(&text).unwrap();
        assert_eq!(
            cfg.sync.document_fields,
            vec![DocumentField::Summary, DocumentField::Comments]
        );

        let bad = format!("{}\n[sync]\ndocument_fields = [\"title\"]\n", MINIMAL);
        assert!(parse_config(&bad).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let text = format!("{}\n[sync]\ninterval_secs = 0\n", MINIMAL);
        assert!(parse_config(&text)
            .unwrap_err()
            .to_string()
            .contains("interval_secs"));
    }

    #[test]
    fn test_ollama_suggest_requires_model() {
        let text = format!("{}\n[suggest]\nprovider = \"ollama\"\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }
}
