//! # inboxdb CLI
//!
//! The `inboxdb` binary wires the library to the command line.
//!
//! ## Usage
//!
//! ```bash
//! inboxdb --config ./config/inboxdb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `inboxdb init` | Create the SQLite database and schema |
//! | `inboxdb ingest [--index]` | Record envelope files and their hashes |
//! | `inboxdb search "<query>"` | Search indexed messages |
//! | `inboxdb reindex` | Bring the full-text index up to date |
//! | `inboxdb db-check [--fix]` | Audit index consistency |
//! | `inboxdb stats` | Show freshness and per-account counts |
//!
//! Ctrl-C during `reindex` or `db-check --fix` stops after the current
//! document, commits, and reports a paused run. A second Ctrl-C exits
//! immediately; committed work is kept either way.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inboxdb::models::SortOrder;
use inboxdb::progress::ProgressMode;
use inboxdb::reindex::{ReindexOptions, ReindexStatus, Selector};
use inboxdb::search::SearchRequest;
use inboxdb::{check, config, ingest, migrate, reindex, search, stats};

/// inboxdb: a local-first mail archive index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "inboxdb",
    about = "inboxdb: a local-first mail archive index with safe full-text search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/inboxdb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the documents table, the FTS5
    /// index and its entry ledger. Safe to run more than once.
    Init,

    /// Record envelope files from `source.root`.
    ///
    /// New and changed files become stale documents; nothing is
    /// tokenized until `reindex` runs.
    Ingest {
        /// Run `reindex` for all documents afterwards.
        #[arg(long)]
        index: bool,

        /// Progress output for the reindex step: off, human or json.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Search indexed messages.
    ///
    /// Supports phrases, -exclusions, OR, parentheses and the filters
    /// from:, to:, subject:, label:, before:, after:, has:attachment and
    /// attachment:.
    Search {
        /// The search query string. May start with `-` to exclude a term.
        #[arg(allow_hyphen_values = true)]
        query: String,

        /// Only return messages from this account.
        #[arg(long)]
        account: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Number of results to skip.
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// relevance, date_desc or date_asc.
        #[arg(long)]
        sort: Option<SortOrder>,

        /// Print the result page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Bring the full-text index up to date.
    Reindex {
        /// Only documents whose source path matches this glob.
        #[arg(long, conflicts_with = "id")]
        pattern: Option<String>,

        /// Only the document with this id.
        #[arg(long)]
        id: Option<String>,

        /// Reindex selected documents even if they look fresh.
        #[arg(long)]
        force: bool,

        /// Documents per commit (overrides index.commit_interval).
        #[arg(long)]
        commit_interval: Option<usize>,

        /// off, human or json. Defaults to human on a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Audit index consistency.
    DbCheck {
        /// Remove duplicate and orphan index entries.
        #[arg(long)]
        fix: bool,

        /// List affected document ids.
        #[arg(long)]
        verbose: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show document freshness and per-account counts.
    Stats,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inboxdb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel on the first Ctrl-C, exit on the second.
fn spawn_interrupt_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("Interrupted: finishing current document (Ctrl-C again to quit)");
        handle.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { index, progress } => {
            let cancel = spawn_interrupt_handler();
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, index, mode, &cancel).await?;
        }
        Commands::Search {
            query,
            account,
            limit,
            offset,
            sort,
            json,
        } => {
            let request = SearchRequest {
                query,
                account,
                limit,
                offset,
                sort,
                include_undated: None,
            };
            search::run_search(&cfg, &request, json).await?;
        }
        Commands::Reindex {
            pattern,
            id,
            force,
            commit_interval,
            progress,
        } => {
            let selector = match (pattern, id) {
                (_, Some(id)) => Selector::Single(id),
                (Some(pattern), None) => Selector::Pattern(pattern),
                (None, None) => Selector::All,
            };
            let mut options = ReindexOptions::new(selector, &cfg);
            options.force = force;
            if let Some(n) = commit_interval {
                if n == 0 {
                    anyhow::bail!("--commit-interval must be >= 1");
                }
                options.commit_interval = n;
            }

            let cancel = spawn_interrupt_handler();
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let report = reindex::run_reindex(&cfg, &options, mode, &cancel).await?;
            if report.status == ReindexStatus::Paused {
                std::process::exit(2);
            }
        }
        Commands::DbCheck { fix, verbose, json } => {
            let cancel = spawn_interrupt_handler();
            let report = check::run_db_check(&cfg, fix, verbose, json, &cancel).await?;
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
