use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run against an existing database.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create documents table. AUTOINCREMENT keeps seq from being reused,
    // which matters because index entries point at it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            account TEXT,
            source_path TEXT,
            content_hash TEXT,
            indexed_hash TEXT,
            event_date TEXT,
            subject TEXT,
            sender_display TEXT,
            sender_email TEXT,
            recipients_display TEXT,
            recipient_emails TEXT,
            labels TEXT,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            snippet TEXT,
            ingested_at INTEGER NOT NULL,
            indexed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create entry ledger: one row per FTS insert, entry_id == FTS rowid
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fts_entries (
            entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_seq INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                subject,
                sender,
                recipients,
                body,
                attachments,
                content='',
                contentless_delete=1,
                tokenize='porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_account ON documents(account)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_event_date ON documents(event_date)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_sender_date ON documents(sender_email, event_date DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_indexed_hash ON documents(indexed_hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fts_entries_doc ON fts_entries(doc_seq, entry_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
