//! # Issue Harness Core
//!
//! Runtime-agnostic logic for Issue Harness: the canonical issue model,
//! record normalization, document building, change detection, the vector
//! store abstraction, and the bounded worker pool used by the ingestion
//! pipeline.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything that talks to the outside world (tracker, embedding model,
//! SQLite) lives in the `issue-harness` app crate and plugs in through the
//! traits defined here.

pub mod change;
pub mod document;
pub mod embedding;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pool;
pub mod store;

pub use error::Error;
