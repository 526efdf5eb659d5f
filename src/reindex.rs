//! # Index Reconciler
//!
//! Brings `indexed_hash` back in line with `content_hash` for every document
//! a [`Selector`] picks.
//!
//! ```text
//!   Unindexed ─┐
//!              ├──► (load source, append FTS entry, set indexed_hash) ──► Fresh
//!   Stale ─────┘                                    │
//!                                                   └─► cleanup: drop all but newest entry
//! ```
//!
//! Work happens inside one [`WriteSession`] that commits every
//! `commit_interval` documents. Each document's entry insert and hash update
//! land in the same transaction, so a crash leaves every committed document
//! Fresh and everything after the last commit still Stale; the next run picks
//! it up again.
//!
//! Cancellation is cooperative: the token is checked between documents. On
//! cancel the run commits what it has, prunes what it touched, and reports
//! [`ReindexStatus::Paused`].

use anyhow::{bail, Result};
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::{BTreeSet, HashSet};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::fts::{self, EntryText};
use crate::lock::WriterLock;
use crate::models::StoredDocument;
use crate::progress::{ProgressMode, ReindexProgressEvent, ReindexProgressReporter};
use crate::source::{DocumentSource, JsonDirSource};
use crate::store::{self, DerivedFields};

/// Which documents a run considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    /// Glob over `source_path` (or the id when a document has no path).
    Pattern(String),
    Single(String),
}

#[derive(Debug, Clone)]
pub struct ReindexOptions {
    pub selector: Selector,
    /// Null `indexed_hash` for every selected document first.
    pub force: bool,
    pub commit_interval: usize,
    pub snippet_chars: usize,
}

impl ReindexOptions {
    pub fn new(selector: Selector, config: &Config) -> Self {
        Self {
            selector,
            force: false,
            commit_interval: config.index.commit_interval,
            snippet_chars: config.index.snippet_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStatus {
    Completed,
    /// Cancelled between documents; run again to continue.
    Paused,
    /// Nothing was stale and nothing needed pruning.
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub status: ReindexStatus,
    pub candidates: u64,
    pub indexed: u64,
    /// Candidates whose source could not be loaded. They stay stale.
    pub failed: u64,
    /// Candidates not reached before cancellation.
    pub remaining: u64,
    pub pruned_entries: u64,
    pub commits: u64,
}

/// The single write handle of a reindex run.
///
/// A transaction is opened lazily and committed every `commit_interval`
/// completed documents. Holding a borrow of the [`WriterLock`] ties the
/// session to the process-wide single-writer lock.
pub struct WriteSession<'a> {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    pending: usize,
    commit_interval: usize,
    commits: u64,
    _lock: &'a WriterLock,
}

impl<'a> WriteSession<'a> {
    pub fn new(pool: &SqlitePool, lock: &'a WriterLock, commit_interval: usize) -> Self {
        Self {
            pool: pool.clone(),
            tx: None,
            pending: 0,
            commit_interval: commit_interval.max(1),
            commits: 0,
            _lock: lock,
        }
    }

    /// Connection inside the current transaction, opening one if needed.
    pub async fn conn(&mut self) -> Result<&mut SqliteConnection> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        let tx = self.tx.insert(tx);
        Ok(&mut **tx)
    }

    /// Record one finished unit of work; commits when the interval is reached.
    pub async fn done_one(&mut self) -> Result<()> {
        self.pending += 1;
        if self.pending >= self.commit_interval {
            self.commit().await?;
        }
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            self.commits += 1;
            tracing::info!(
                documents = self.pending,
                commits = self.commits,
                "committed batch"
            );
        }
        self.pending = 0;
        Ok(())
    }

    /// Commit any open work and return the number of commits made.
    pub async fn finish(mut self) -> Result<u64> {
        self.commit().await?;
        Ok(self.commits)
    }
}

const DOC_COLUMNS: &str =
    "seq, id, account, source_path, content_hash, indexed_hash, event_date";

const STALE: &str = "(indexed_hash IS NULL OR content_hash IS NULL OR indexed_hash != content_hash)";

/// The selector resolved against the store.
enum Scope {
    All,
    Seqs(HashSet<i64>),
}

impl Scope {
    fn contains(&self, seq: i64) -> bool {
        match self {
            Scope::All => true,
            Scope::Seqs(seqs) => seqs.contains(&seq),
        }
    }
}

fn pattern_matcher(pattern: &str) -> Result<GlobMatcher> {
    match Glob::new(pattern) {
        Ok(glob) => Ok(glob.compile_matcher()),
        Err(e) => bail!("Invalid pattern '{}': {}", pattern, e),
    }
}

fn matches_pattern(matcher: &GlobMatcher, doc: &StoredDocument) -> bool {
    let target = doc.source_path.as_deref().unwrap_or(&doc.id);
    matcher.is_match(target)
}

async fn resolve_scope(pool: &SqlitePool, selector: &Selector) -> Result<Scope> {
    match selector {
        Selector::All => Ok(Scope::All),
        Selector::Single(id) => match store::get_by_id(pool, id).await? {
            Some(doc) => Ok(Scope::Seqs(HashSet::from([doc.seq]))),
            None => bail!("No document with id '{}'", id),
        },
        Selector::Pattern(pattern) => {
            let matcher = pattern_matcher(pattern)?;
            let all: Vec<StoredDocument> =
                sqlx::query_as(&format!("SELECT {} FROM documents ORDER BY seq", DOC_COLUMNS))
                    .fetch_all(pool)
                    .await?;
            Ok(Scope::Seqs(
                all.iter()
                    .filter(|d| matches_pattern(&matcher, d))
                    .map(|d| d.seq)
                    .collect(),
            ))
        }
    }
}

/// Seqs in scope that currently have an `indexed_hash`.
async fn previously_indexed(pool: &SqlitePool, scope: &Scope) -> Result<HashSet<i64>> {
    let seqs: Vec<i64> =
        sqlx::query_scalar("SELECT seq FROM documents WHERE indexed_hash IS NOT NULL")
            .fetch_all(pool)
            .await?;
    Ok(seqs.into_iter().filter(|s| scope.contains(*s)).collect())
}

async fn force_unindex(session: &mut WriteSession<'_>, scope: &Scope) -> Result<()> {
    let conn = session.conn().await?;
    match scope {
        Scope::All => {
            sqlx::query("UPDATE documents SET indexed_hash = NULL")
                .execute(&mut *conn)
                .await?;
        }
        Scope::Seqs(seqs) => {
            for seq in seqs {
                sqlx::query("UPDATE documents SET indexed_hash = NULL WHERE seq = ?")
                    .bind(seq)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }
    session.commit().await
}

async fn select_candidates(
    pool: &SqlitePool,
    selector: &Selector,
    scope: &Scope,
) -> Result<Vec<StoredDocument>> {
    let docs: Vec<StoredDocument> = match selector {
        Selector::Single(id) => {
            sqlx::query_as(&format!(
                "SELECT {} FROM documents WHERE id = ? AND {}",
                DOC_COLUMNS, STALE
            ))
            .bind(id)
            .fetch_all(pool)
            .await?
        }
        _ => {
            sqlx::query_as(&format!(
                "SELECT {} FROM documents WHERE {} ORDER BY seq",
                DOC_COLUMNS, STALE
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(docs.into_iter().filter(|d| scope.contains(d.seq)).collect())
}

/// Run one reconciliation pass.
///
/// The caller must hold the [`WriterLock`] for the database behind `pool`.
pub async fn reconcile(
    pool: &SqlitePool,
    lock: &WriterLock,
    source: &dyn DocumentSource,
    options: &ReindexOptions,
    cancel: &CancellationToken,
    progress: &dyn ReindexProgressReporter,
) -> Result<ReindexReport> {
    progress.report(ReindexProgressEvent::Selecting);

    let mut session = WriteSession::new(pool, lock, options.commit_interval);
    let scope = resolve_scope(pool, &options.selector).await?;

    // Remember who had an entry before force wipes the hashes.
    let had_indexed = previously_indexed(pool, &scope).await?;
    if options.force {
        force_unindex(&mut session, &scope).await?;
    }

    let candidates = select_candidates(pool, &options.selector, &scope).await?;
    let total = candidates.len() as u64;
    tracing::info!(candidates = total, force = options.force, "reindex started");

    // Documents that may end up with more than one entry. Seed with any
    // duplicates already present, e.g. from a crash between commit and prune.
    let mut to_prune: BTreeSet<i64> = fts::documents_with_duplicates(pool)
        .await?
        .into_iter()
        .map(|(seq, _)| seq)
        .filter(|seq| scope.contains(*seq))
        .collect();

    let mut indexed = 0u64;
    let mut failed = 0u64;
    let mut processed = 0u64;
    let mut paused = false;

    for doc in &candidates {
        if cancel.is_cancelled() {
            paused = true;
            break;
        }

        match source.load(doc).await {
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "could not load document, leaving it stale");
                failed += 1;
            }
            Ok(loaded) => {
                let indexed_hash = doc
                    .content_hash
                    .clone()
                    .or_else(|| loaded.content_hash.clone())
                    .unwrap_or_else(|| store::fields_hash(&loaded));
                let fields = DerivedFields::from_source(&loaded, options.snippet_chars);

                let conn = session.conn().await?;
                let prior_entries = fts::entry_count(conn, doc.seq).await?;
                if store::mark_indexed(conn, doc.seq, &fields, &indexed_hash).await? {
                    fts::insert_entry(conn, doc.seq, &EntryText::from(&loaded)).await?;
                    if prior_entries > 0 || had_indexed.contains(&doc.seq) {
                        to_prune.insert(doc.seq);
                    }
                    indexed += 1;
                    session.done_one().await?;
                } else {
                    tracing::warn!(id = %doc.id, "document vanished during reindex, skipping");
                    failed += 1;
                }
            }
        }

        processed += 1;
        progress.report(ReindexProgressEvent::Indexing {
            n: processed,
            total,
        });
    }

    session.commit().await?;

    let pruned_entries = prune(&mut session, &to_prune, progress).await?;
    let commits = session.finish().await?;

    let status = if paused {
        ReindexStatus::Paused
    } else if total == 0 && pruned_entries == 0 {
        ReindexStatus::UpToDate
    } else {
        ReindexStatus::Completed
    };

    let report = ReindexReport {
        status,
        candidates: total,
        indexed,
        failed,
        remaining: total - processed,
        pruned_entries,
        commits,
    };
    tracing::info!(
        status = ?report.status,
        indexed = report.indexed,
        failed = report.failed,
        remaining = report.remaining,
        pruned = report.pruned_entries,
        "reindex finished"
    );
    Ok(report)
}

/// Drop superseded entries for each document in `seqs`, batched through the
/// session. Counts whatever duplicates exist, not just one per document.
async fn prune(
    session: &mut WriteSession<'_>,
    seqs: &BTreeSet<i64>,
    progress: &dyn ReindexProgressReporter,
) -> Result<u64> {
    let total = seqs.len() as u64;
    let mut pruned = 0u64;

    for (i, seq) in seqs.iter().enumerate() {
        let conn = session.conn().await?;
        pruned += fts::prune_superseded(conn, *seq).await?;
        session.done_one().await?;
        progress.report(ReindexProgressEvent::Pruning {
            n: i as u64 + 1,
            total,
        });
    }

    session.commit().await?;
    Ok(pruned)
}

/// CLI entry point for `inboxdb reindex` and `inboxdb ingest --index`.
pub async fn run_reindex(
    config: &Config,
    options: &ReindexOptions,
    mode: ProgressMode,
    cancel: &CancellationToken,
) -> Result<ReindexReport> {
    let source = JsonDirSource::from_config(config.source()?);
    let lock = WriterLock::acquire(&config.db.path)?;
    let pool = db::connect(config).await?;

    let reporter = mode.reporter();
    let report = reconcile(&pool, &lock, &source, options, cancel, reporter.as_ref()).await?;
    pool.close().await;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &ReindexReport) {
    match report.status {
        ReindexStatus::UpToDate => {
            println!("reindex: index is up to date");
            return;
        }
        ReindexStatus::Completed => println!("reindex: completed"),
        ReindexStatus::Paused => println!("reindex: paused (run again to continue)"),
    }
    println!("  candidates: {}", report.candidates);
    println!("  indexed: {}", report.indexed);
    if report.failed > 0 {
        println!("  failed: {}", report.failed);
    }
    if report.remaining > 0 {
        println!("  remaining: {}", report.remaining);
    }
    println!("  pruned entries: {}", report.pruned_entries);
    println!("  commits: {}", report.commits);
}
