//! Database statistics and freshness overview.
//!
//! Summarizes what is indexed and how much of it is current: fresh, stale
//! and never-indexed documents, index entry counts, and a per-account
//! breakdown. Used by `inboxdb stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub account: String,
    pub documents: i64,
    pub fresh: i64,
    pub last_indexed_ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub documents: i64,
    pub fresh: i64,
    /// Indexed before, content changed since.
    pub stale: i64,
    pub unindexed: i64,
    pub index_entries: i64,
    pub accounts: Vec<AccountStats>,
}

const FRESH: &str = "content_hash IS NOT NULL AND indexed_hash = content_hash";

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let row = sqlx::query(&format!(
        r#"
        SELECT
            COUNT(*) AS documents,
            COALESCE(SUM({fresh}), 0) AS fresh,
            COALESCE(SUM(indexed_hash IS NULL), 0) AS unindexed
        FROM documents
        "#,
        fresh = FRESH
    ))
    .fetch_one(pool)
    .await?;

    let documents: i64 = row.get("documents");
    let fresh: i64 = row.get("fresh");
    let unindexed: i64 = row.get("unindexed");

    let index_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fts_entries")
        .fetch_one(pool)
        .await?;

    // Per-account breakdown
    let account_rows = sqlx::query(&format!(
        r#"
        SELECT
            COALESCE(account, '(none)') AS account,
            COUNT(*) AS doc_count,
            COALESCE(SUM({fresh}), 0) AS fresh_count,
            MAX(indexed_at) AS last_indexed
        FROM documents
        GROUP BY account
        ORDER BY doc_count DESC, account
        "#,
        fresh = FRESH
    ))
    .fetch_all(pool)
    .await?;

    let accounts = account_rows
        .iter()
        .map(|row| AccountStats {
            account: row.get("account"),
            documents: row.get("doc_count"),
            fresh: row.get("fresh_count"),
            last_indexed_ts: row.get("last_indexed"),
        })
        .collect();

    Ok(Stats {
        documents,
        fresh,
        stale: documents - fresh - unindexed,
        unindexed,
        index_entries,
        accounts,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("inboxdb — Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!(
        "  Fresh:       {} / {} ({}%)",
        stats.fresh,
        stats.documents,
        if stats.documents > 0 {
            (stats.fresh * 100) / stats.documents
        } else {
            0
        }
    );
    println!("  Stale:       {}", stats.stale);
    println!("  Unindexed:   {}", stats.unindexed);
    println!("  Index entries: {}", stats.index_entries);

    if !stats.accounts.is_empty() {
        println!();
        println!("  By account:");
        println!(
            "  {:<24} {:>8} {:>8}   {}",
            "ACCOUNT", "DOCS", "FRESH", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(64));

        for a in &stats.accounts {
            let indexed_display = match a.last_indexed_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>8} {:>8}   {}",
                a.account, a.documents, a.fresh, indexed_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
