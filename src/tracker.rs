//! Issue tracker client.
//!
//! [`IssueTracker`] is the seam between the harness and the tracker's REST
//! API. [`JiraTracker`] talks to Jira's v2 REST endpoints with `reqwest`;
//! tests substitute an in-process fake.
//!
//! # Pagination
//!
//! [`fetch_all`] walks the search endpoint page by page:
//!
//! ```text
//! page size = min(page_size, 1000, fetch_size)
//! total     = min(fetch_size, total reported by the first page)
//! stop when start_at ≥ total, or a page comes back short
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use issue_harness_core::normalize::{RawIssue, ISSUE_FIELDS};

use crate::config::TrackerConfig;

/// Largest page the tracker serves per search call.
pub const MAX_PAGE_SIZE: usize = 1000;

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    /// Total matches for the query, when the tracker reports it.
    #[serde(default)]
    pub total: Option<usize>,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Base URL used to derive browse links.
    fn browse_base(&self) -> &str;

    /// Fetch one page of issues matching `query`.
    async fn fetch_page(&self, query: &str, start_at: usize, max_results: usize) -> Result<Page>;

    /// Fetch a single issue. `Ok(None)` when the tracker does not know the key.
    async fn fetch_one(&self, key: &str) -> Result<Option<RawIssue>>;
}

/// Fetch up to `fetch_size` issues matching `query`, following pagination.
pub async fn fetch_all(
    tracker: &dyn IssueTracker,
    query: &str,
    fetch_size: usize,
    page_size: usize,
) -> Result<Vec<RawIssue>> {
    let mut out = Vec::new();
    let mut start_at = 0usize;
    let mut max_results = page_size.min(MAX_PAGE_SIZE).min(fetch_size).max(1);
    let mut total: Option<usize> = None;

    loop {
        if matches!(total, Some(t) if start_at >= t) {
            break;
        }

        let page = tracker
            .fetch_page(query, start_at, max_results)
            .await
            .with_context(|| format!("search page at {} failed", start_at))?;

        let limit =
            *total.get_or_insert_with(|| page.total.unwrap_or(usize::MAX).min(fetch_size));
        let got = page.issues.len();
        out.extend(page.issues);

        // A short page means the result set is exhausted
        if got < max_results || got == 0 {
            break;
        }

        start_at += got;
        tracing::debug!(fetched = start_at, total = limit, "fetching next page");
        max_results = max_results.min(limit.saturating_sub(start_at));
        if max_results == 0 {
            break;
        }
    }

    out.truncate(fetch_size);
    Ok(out)
}

/// Jira REST v2 client.
pub struct JiraTracker {
    base_url: String,
    api_base: reqwest::Url,
    username: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl JiraTracker {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            tracing::warn!(
                env = %config.token_env,
                "tracker token not set; requests will be unauthenticated"
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let api_base = reqwest::Url::parse(&base_url)
            .with_context(|| format!("invalid tracker url '{}'", config.url))?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("tracker url '{}' cannot carry a path", config.url);
        }

        Ok(Self {
            base_url,
            api_base,
            username: config.username.clone(),
            token,
            client,
        })
    }

    /// `{url}/rest/api/2/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("tracker url cannot carry a path"))?
            .pop_if_empty()
            .extend(["rest", "api", "2"])
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: reqwest::Url) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("Accept", "application/json");
        match (&self.username, &self.token) {
            (Some(user), token) => req.basic_auth(user, token.as_deref()),
            (None, Some(token)) => req.bearer_auth(token),
            (None, None) => req,
        }
    }
}

#[async_trait]
impl IssueTracker for JiraTracker {
    fn browse_base(&self) -> &str {
        &self.base_url
    }

    async fn fetch_page(&self, query: &str, start_at: usize, max_results: usize) -> Result<Page> {
        let start_at = start_at.to_string();
        let max_results = max_results.to_string();
        let response = self
            .get(self.endpoint(&["search"])?)
            .query(&[
                ("jql", query),
                ("startAt", start_at.as_str()),
                ("maxResults", max_results.as_str()),
                ("fields", ISSUE_FIELDS),
            ])
            .send()
            .await
            .context("tracker search request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("tracker search error {}: {}", status, body);
        }

        Ok(response.json().await?)
    }

    async fn fetch_one(&self, key: &str) -> Result<Option<RawIssue>> {
        let response = self
            .get(self.endpoint(&["issue", key])?)
            .query(&[("fields", ISSUE_FIELDS)])
            .send()
            .await
            .with_context(|| format!("tracker request for '{}' failed", key))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("tracker issue error {}: {}", status, body);
        }

        Ok(Some(response.json().await?))
    }
}
