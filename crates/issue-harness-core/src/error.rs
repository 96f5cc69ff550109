//! Error taxonomy shared by the ingestion and query paths.
//!
//! Collaborators (tracker, embedding provider, vector store) report failures
//! as [`anyhow::Error`]; the orchestration layer wraps them into the variant
//! that says which stage failed so callers can map them to a response.
//! "Not found" is not an error: lookups return `Option` or an empty list.

use thiserror::Error;

/// Errors surfaced by reconciliation passes and query resolution.
#[derive(Debug, Error)]
pub enum Error {
    /// The issue tracker was unreachable or returned a bad response.
    #[error("tracker fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    /// The embedding provider failed or returned an unusable vector.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// A vector store read or write failed.
    #[error("vector store operation failed: {0:#}")]
    Store(anyhow::Error),

    /// The suggestion model failed.
    #[error("suggestion failed: {0:#}")]
    Suggestion(anyhow::Error),

    /// Caller input was rejected before any collaborator was called.
    #[error("invalid input: {0}")]
    Validation(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Short machine-readable code, used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Fetch(_) => "fetch_error",
            Error::Embedding(_) => "embedding_error",
            Error::Store(_) => "store_error",
            Error::Suggestion(_) => "suggestion_error",
            Error::Validation(_) => "bad_request",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
