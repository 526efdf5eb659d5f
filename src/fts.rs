//! Full-text index entries.
//!
//! `documents_fts` is contentless: it keeps tokens only, so an entry cannot be
//! rewritten in place and the old text needed for a classic FTS5 delete is
//! gone. Each insert therefore appends a new entry and records it in
//! `fts_entries`, whose `entry_id` doubles as the FTS rowid. Superseded
//! entries are removed later by rowid (`contentless_delete=1`), keeping the
//! highest `entry_id` per document.

use anyhow::Result;
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::SourceDocument;

/// The searchable columns of one entry.
#[derive(Debug, Clone)]
pub struct EntryText<'a> {
    pub subject: &'a str,
    pub sender: &'a str,
    pub recipients: &'a str,
    pub body: &'a str,
    pub attachments: String,
}

impl<'a> From<&'a SourceDocument> for EntryText<'a> {
    fn from(doc: &'a SourceDocument) -> Self {
        Self {
            subject: &doc.subject,
            sender: &doc.sender,
            recipients: &doc.recipients,
            body: &doc.body,
            attachments: doc.attachments.join(" "),
        }
    }
}

/// Append an entry for `doc_seq`. Returns the new entry id.
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    doc_seq: i64,
    text: &EntryText<'_>,
) -> Result<i64> {
    let entry_id: i64 =
        sqlx::query_scalar("INSERT INTO fts_entries (doc_seq) VALUES (?) RETURNING entry_id")
            .bind(doc_seq)
            .fetch_one(&mut *conn)
            .await?;

    sqlx::query(
        "INSERT INTO documents_fts (rowid, subject, sender, recipients, body, attachments) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(entry_id)
    .bind(text.subject)
    .bind(text.sender)
    .bind(text.recipients)
    .bind(text.body)
    .bind(&text.attachments)
    .execute(&mut *conn)
    .await?;

    Ok(entry_id)
}

/// Remove one entry from both the FTS table and the ledger.
pub async fn delete_entry(conn: &mut SqliteConnection, entry_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM documents_fts WHERE rowid = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM fts_entries WHERE entry_id = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete every entry of `doc_seq` except the newest. Returns how many were
/// removed; zero when the document already has at most one entry.
pub async fn prune_superseded(conn: &mut SqliteConnection, doc_seq: i64) -> Result<u64> {
    let stale: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT entry_id FROM fts_entries
        WHERE doc_seq = ?
          AND entry_id < (SELECT MAX(entry_id) FROM fts_entries WHERE doc_seq = ?)
        "#,
    )
    .bind(doc_seq)
    .bind(doc_seq)
    .fetch_all(&mut *conn)
    .await?;

    for entry_id in &stale {
        delete_entry(conn, *entry_id).await?;
    }
    Ok(stale.len() as u64)
}

pub async fn entry_count(conn: &mut SqliteConnection, doc_seq: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fts_entries WHERE doc_seq = ?")
        .bind(doc_seq)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn total_entries(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fts_entries")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `(doc_seq, entries)` for every document holding more than one entry.
pub async fn documents_with_duplicates(pool: &SqlitePool) -> Result<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT doc_seq, COUNT(*) FROM fts_entries GROUP BY doc_seq HAVING COUNT(*) > 1 ORDER BY doc_seq",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(entry_id, doc_seq)` for entries whose document row is gone.
pub async fn orphan_entries(pool: &SqlitePool) -> Result<Vec<(i64, i64)>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT x.entry_id, x.doc_seq
        FROM fts_entries x
        LEFT JOIN documents d ON d.seq = x.doc_seq
        WHERE d.seq IS NULL
        ORDER BY x.entry_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
