//! # Issue Harness CLI (`issue-harness`)
//!
//! ## Usage
//!
//! ```bash
//! issue-harness --config ./config/issue-harness.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `issue-harness init` | Create the SQLite database and run schema migrations |
//! | `issue-harness sync` | Run one reconciliation pass |
//! | `issue-harness query --key SEC-1` | Issues nearest to a stored or fetched issue |
//! | `issue-harness query --text "<text>"` | Issues nearest to free text |
//! | `issue-harness issues` | List stored issues, newest first |
//! | `issue-harness suggest <key>` | Ask the chat model for a fix |
//! | `issue-harness serve` | Start the HTTP server (and the scheduler if enabled) |
//!
//! ## Examples
//!
//! ```bash
//! issue-harness init
//! issue-harness sync
//! issue-harness query --text "login page returns 500" --limit 3
//! issue-harness issues --assignee alice --created-after 2024-01-01
//! issue-harness serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use issue_harness::config::{self, Config};
use issue_harness::migrate;
use issue_harness::scheduler::StopOutcome;
use issue_harness::server;
use issue_harness::service::IssueService;
use issue_harness_core::models::IssueView;

/// Issue Harness CLI: keeps a semantic index of tracker issues in sync.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/issue-harness.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "issue-harness",
    about = "Issue Harness: semantic search over issue-tracker records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/issue-harness.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Run one reconciliation pass against the tracker.
    ///
    /// Fetches every issue matching `[tracker].query`, re-embeds only the
    /// issues whose indexed fields changed, and prints a summary.
    Sync,

    /// Find the issues most similar to an issue key or to free text.
    Query {
        /// Issue key. Fetched and indexed first if not stored yet.
        #[arg(long, conflicts_with = "text")]
        key: Option<String>,

        /// Free-text query.
        #[arg(long)]
        text: Option<String>,

        /// Maximum number of results (defaults to `[retrieval].default_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored issues, newest first.
    Issues {
        /// Only issues assigned to this name.
        #[arg(long)]
        assignee: Option<String>,

        /// Only issues created on or after this date (YYYY-MM-DD) or epoch seconds.
        #[arg(long)]
        created_after: Option<String>,

        /// Maximum number of results (defaults to `[retrieval].list_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask the configured chat model how to fix a stored issue.
    Suggest {
        /// Issue key.
        key: String,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. When `[sync].enabled` is set, the periodic
    /// scheduler runs alongside and is stopped on shutdown.
    Serve,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_issue(issue: &IssueView) {
    println!("{}  [{}]  {}", issue.key, issue.status, issue.summary);
    println!(
        "    assignee: {}  type: {}  created: {}",
        issue.assignee, issue.issue_type, issue.created
    );
    println!("    {}", issue.url);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let service = Arc::new(IssueService::from_config(cfg).await?);

    match cli.command {
        Commands::Init => {}
        Commands::Sync => {
            let report = service.trigger_sync().await?;
            println!(
                "Sync complete. Fetched: {}, Updated: {}, Skipped: {}",
                report.total_fetched,
                report.updated_keys.len(),
                report.skipped()
            );
            for key in &report.updated_keys {
                println!("  updated {}", key);
            }
            for failed in &report.failed_keys {
                println!("  failed  {}: {}", failed.key, failed.error);
            }
        }
        Commands::Query { key, text, limit } => {
            let hits = service
                .resolve_query(key.as_deref(), text.as_deref(), limit)
                .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                print!("{}. ({:.4}) ", i + 1, hit.distance);
                print_issue(&hit.issue);
            }
        }
        Commands::Issues {
            assignee,
            created_after,
            limit,
        } => {
            let issues = service
                .list_issues(assignee.as_deref(), created_after.as_deref(), limit)
                .await?;
            if issues.is_empty() {
                println!("No results.");
            }
            for issue in &issues {
                print_issue(issue);
            }
        }
        Commands::Suggest { key } => match service.suggest(&key).await? {
            None => println!("{} is not indexed.", key),
            Some(s) => {
                println!("{}: {}\n", s.key, s.summary);
                println!("{}", s.suggestion);
            }
        },
        Commands::Serve => {
            if service.config().sync.enabled {
                service.scheduler().start().await;
            }

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                tracing::info!("shutdown signal received");
            };
            server::run_server(service.clone(), shutdown).await?;

            if service.scheduler().stop().await == StopOutcome::TimedOut {
                tracing::warn!("exiting with a sync pass still in flight");
            }
        }
    }

    Ok(())
}
