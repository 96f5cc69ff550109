//! # Issue Harness
//!
//! Keeps a local vector index of issue-tracker records in sync with the
//! tracker and answers similarity queries over it.
//!
//! A reconciliation pass pulls every issue matching a tracker query,
//! compares each one with what is already stored, and re-embeds only the
//! issues whose indexed fields changed. Queries find the issues closest to
//! a given issue key or to free text. A scheduler repeats the pass on an
//! interval.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Tracker   │──▶│  Reconciler  │──▶│ Vector store │
//! │ (Jira REST) │   │ diff + embed │   │   (SQLite)   │
//! └─────────────┘   └──────▲───────┘   └──────┬───────┘
//!                          │ interval         │
//!                   ┌──────┴──────┐    ┌──────▼───────┐
//!                   │  Scheduler  │    │ QueryResolver│
//!                   └─────────────┘    └──────┬───────┘
//!                                      ┌──────┴──────┐
//!                                      ▼             ▼
//!                                 ┌────────┐    ┌────────┐
//!                                 │  CLI   │    │  HTTP  │
//!                                 └────────┘    └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`tracker`] | Issue tracker client and pagination |
//! | [`embedding`] | Embedding providers and the batching gateway |
//! | [`suggest`] | Chat-model fix suggestions |
//! | [`reconcile`] | Reconciliation pass |
//! | [`query`] | Similarity queries and filtered listing |
//! | [`scheduler`] | Periodic sync loop |
//! | [`service`] | Facade wiring everything together |
//! | [`server`] | HTTP API |
//!
//! Domain types, the change rules, and the store trait live in
//! [`issue_harness_core`].

pub mod config;
pub mod db;
pub mod embedding;
pub mod migrate;
pub mod query;
pub mod reconcile;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod suggest;
pub mod tracker;
