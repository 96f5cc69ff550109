//! HTTP server.
//!
//! Exposes the [`IssueService`] over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sync` | Run one reconciliation pass |
//! | `GET`  | `/query?key=&q=&n_results=` | Nearest issues to a key or text |
//! | `GET`  | `/suggest?key=` | Suggested fix for a stored issue |
//! | `GET`  | `/get_issues?assignee=&created_after=&n_results=` | Filtered listing, newest first |
//! | `GET`  | `/version` | Release version |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Successful responses carry `{"code": 0, "message": ...}`; empty results
//! answer `"No Result"`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "n_results must be a positive integer" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `fetch_error`, `embedding_error`, `suggestion_error` | 502 |
//! | `store_error` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use issue_harness_core::Error;

use crate::service::IssueService;

/// Build the router over a shared service.
pub fn router(service: Arc<IssueService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sync", post(handle_sync))
        .route("/query", get(handle_query))
        .route("/suggest", get(handle_suggest))
        .route("/get_issues", get(handle_get_issues))
        .route("/version", get(handle_version))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Serve until `shutdown` resolves.
pub async fn run_server<F>(service: Arc<IssueService>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Fetch(_) | Error::Embedding(_) | Error::Suggestion(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Parse an optional positive `n_results` parameter.
fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(bad_request(format!(
                "n_results must be a positive integer, got '{}'",
                s
            ))),
        },
    }
}

fn no_result() -> Json<serde_json::Value> {
    Json(json!({ "code": 0, "message": "No Result" }))
}

// ============ POST /sync ============

async fn handle_sync(
    State(service): State<Arc<IssueService>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let report = service.trigger_sync().await?;
    Ok(Json(json!({
        "code": 0,
        "message": format!(
            "Sync successfully. Updated: {}, Skipped: {}",
            report.updated_keys.len(),
            report.skipped()
        ),
        "updated": report.updated_keys,
        "failed": report.failed_keys,
    })))
}

// ============ GET /query ============

#[derive(Deserialize)]
struct QueryParams {
    key: Option<String>,
    q: Option<String>,
    n_results: Option<String>,
}

async fn handle_query(
    State(service): State<Arc<IssueService>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = parse_limit(params.n_results.as_deref())?;
    tracing::info!(key = ?params.key, q = ?params.q, ?limit, "query");

    let hits = service
        .resolve_query(params.key.as_deref(), params.q.as_deref(), limit)
        .await?;

    if hits.is_empty() {
        return Ok(no_result());
    }
    Ok(Json(json!({
        "code": 0,
        "message": "Query successfully",
        "results": hits,
    })))
}

// ============ GET /suggest ============

#[derive(Deserialize)]
struct SuggestParams {
    key: Option<String>,
}

async fn handle_suggest(
    State(service): State<Arc<IssueService>>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = params
        .key
        .ok_or_else(|| bad_request("key is required"))?;

    match service.suggest(&key).await? {
        None => Ok(no_result()),
        Some(suggestion) => Ok(Json(json!({
            "code": 0,
            "message": "Suggest successfully",
            "results": suggestion,
        }))),
    }
}

// ============ GET /get_issues ============

#[derive(Deserialize)]
struct IssuesParams {
    assignee: Option<String>,
    created_after: Option<String>,
    n_results: Option<String>,
}

async fn handle_get_issues(
    State(service): State<Arc<IssueService>>,
    Query(params): Query<IssuesParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = parse_limit(params.n_results.as_deref())?;

    let issues = service
        .list_issues(
            params.assignee.as_deref(),
            params.created_after.as_deref(),
            limit,
        )
        .await?;

    if issues.is_empty() {
        return Ok(no_result());
    }
    Ok(Json(json!({
        "code": 0,
        "message": "Get successfully",
        "results": issues,
    })))
}

// ============ GET /version, /health ============

async fn handle_version() -> Json<serde_json::Value> {
    Json(json!({ "release_version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).ok(), Some(None));
        assert_eq!(parse_limit(Some("")).ok(), Some(None));
        assert_eq!(parse_limit(Some("7")).ok(), Some(Some(7)));
        assert!(parse_limit(Some("abc")).is_err());
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("-3")).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let e: AppError = Error::validation("bad").into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e: AppError = Error::Fetch(anyhow::anyhow!("down")).into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "fetch_error");

        let e: AppError = Error::Store(anyhow::anyhow!("disk")).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
