//! `db-check`: audit the store against the full-text index.
//!
//! Four conditions are reported:
//!
//! | Condition | Meaning | `--fix` |
//! |-----------|---------|---------|
//! | duplicates | a document owns more than one index entry | keep the newest |
//! | orphans | an index entry points at no document | delete |
//! | missing | a document owns no index entry | run `reindex` |
//! | stale | `content_hash != indexed_hash` | run `reindex` |
//!
//! The audit itself only reads, so it can run next to searches. Fixing takes
//! the writer lock; a reindex started afterwards recomputes its own candidates.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::fts;
use crate::lock::WriterLock;
use crate::reindex::WriteSession;
use crate::store;

/// Rows per commit while fixing.
const FIX_COMMIT_INTERVAL: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateEntries {
    pub id: String,
    pub seq: i64,
    pub entries: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanEntry {
    pub entry_id: i64,
    pub doc_seq: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixSummary {
    pub pruned_entries: u64,
    pub removed_orphans: u64,
    /// True when cancellation stopped the fix early.
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub documents: i64,
    pub index_entries: i64,
    pub duplicates: Vec<DuplicateEntries>,
    pub orphans: Vec<OrphanEntry>,
    /// Ids of documents with no index entry.
    pub missing: Vec<String>,
    /// Ids of documents whose hashes are both set but differ.
    pub stale: Vec<String>,
    pub null_content_hash: i64,
    pub null_indexed_hash: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<FixSummary>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.duplicates.is_empty()
            && self.orphans.is_empty()
            && self.missing.is_empty()
            && self.stale.is_empty()
    }
}

/// Read-only audit.
pub async fn audit(pool: &SqlitePool) -> Result<AuditReport> {
    let documents = store::document_count(pool).await?;
    let index_entries = fts::total_entries(pool).await?;

    let duplicates: Vec<DuplicateEntries> = sqlx::query_as::<_, (String, i64, i64)>(
        r#"
        SELECT d.id, d.seq, COUNT(*) AS n
        FROM fts_entries x
        JOIN documents d ON d.seq = x.doc_seq
        GROUP BY d.seq
        HAVING COUNT(*) > 1
        ORDER BY d.seq
        "#,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, seq, entries)| DuplicateEntries { id, seq, entries })
    .collect();

    let orphans = fts::orphan_entries(pool)
        .await?
        .into_iter()
        .map(|(entry_id, doc_seq)| OrphanEntry { entry_id, doc_seq })
        .collect();

    let missing: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT d.id FROM documents d
        WHERE NOT EXISTS (SELECT 1 FROM fts_entries x WHERE x.doc_seq = d.seq)
        ORDER BY d.seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    let stale: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM documents
        WHERE content_hash IS NOT NULL
          AND indexed_hash IS NOT NULL
          AND content_hash != indexed_hash
        ORDER BY seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    let (null_content_hash, null_indexed_hash): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(content_hash IS NULL), 0),
            COALESCE(SUM(indexed_hash IS NULL), 0)
        FROM documents
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(AuditReport {
        documents,
        index_entries,
        duplicates,
        orphans,
        missing,
        stale,
        null_content_hash,
        null_indexed_hash,
        fix: None,
    })
}

/// Remove duplicate and orphan entries. Duplicates and orphans are
/// re-read under the lock rather than taken from an earlier audit.
pub async fn fix(
    pool: &SqlitePool,
    lock: &WriterLock,
    cancel: &CancellationToken,
) -> Result<FixSummary> {
    let mut session = WriteSession::new(pool, lock, FIX_COMMIT_INTERVAL);
    let mut summary = FixSummary::default();

    for (seq, _) in fts::documents_with_duplicates(pool).await? {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }
        let conn = session.conn().await?;
        summary.pruned_entries += fts::prune_superseded(conn, seq).await?;
        session.done_one().await?;
    }

    if !summary.interrupted {
        for (entry_id, _) in fts::orphan_entries(pool).await? {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            let conn = session.conn().await?;
            fts::delete_entry(conn, entry_id).await?;
            summary.removed_orphans += 1;
            session.done_one().await?;
        }
    }

    session.finish().await?;
    tracing::info!(
        pruned = summary.pruned_entries,
        orphans = summary.removed_orphans,
        interrupted = summary.interrupted,
        "db-check fix finished"
    );
    Ok(summary)
}

/// CLI entry point for `inboxdb db-check`.
pub async fn run_db_check(
    config: &Config,
    apply_fix: bool,
    verbose: bool,
    json: bool,
    cancel: &CancellationToken,
) -> Result<AuditReport> {
    let pool = db::connect(config).await?;

    let mut report = audit(&pool).await?;
    if apply_fix && (!report.duplicates.is_empty() || !report.orphans.is_empty()) {
        let lock = WriterLock::acquire(&config.db.path)?;
        let summary = fix(&pool, &lock, cancel).await?;
        let mut after = audit(&pool).await?;
        after.fix = Some(summary);
        report = after;
    }
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, verbose);
    }
    Ok(report)
}

fn print_report(report: &AuditReport, verbose: bool) {
    println!("Database check");
    println!("  documents: {}", report.documents);
    println!("  index entries: {}", report.index_entries);
    println!();

    if let Some(fix) = &report.fix {
        println!(
            "Fixed: pruned {} duplicate entries, removed {} orphan entries{}",
            fix.pruned_entries,
            fix.removed_orphans,
            if fix.interrupted { " (interrupted)" } else { "" }
        );
        println!();
    }

    println!("  duplicates: {}", report.duplicates.len());
    if verbose {
        for d in &report.duplicates {
            println!("    {} ({} entries)", d.id, d.entries);
        }
    }
    println!("  orphans: {}", report.orphans.len());
    if verbose {
        for o in &report.orphans {
            println!("    entry {} -> seq {}", o.entry_id, o.doc_seq);
        }
    }
    println!("  missing from index: {}", report.missing.len());
    if verbose {
        for id in &report.missing {
            println!("    {}", id);
        }
    }
    println!("  stale: {}", report.stale.len());
    if verbose {
        for id in &report.stale {
            println!("    {}", id);
        }
    }
    println!("  null content_hash: {}", report.null_content_hash);
    println!("  null indexed_hash: {}", report.null_indexed_hash);
    println!();

    if report.is_healthy() {
        println!("OK: index is consistent");
        return;
    }
    if report.fix.is_none() && (!report.duplicates.is_empty() || !report.orphans.is_empty()) {
        println!("Run `inboxdb db-check --fix` to remove duplicate and orphan entries.");
    }
    if !report.missing.is_empty() || !report.stale.is_empty() {
        println!("Run `inboxdb reindex` to index missing and stale documents.");
    }
}
