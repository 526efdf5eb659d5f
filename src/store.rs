//! Document store access: the ingestion upsert and the derived columns the
//! reconciler writes when it indexes a document.

use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{IngestRecord, SourceDocument, StoredDocument};

/// Insert or update a document by id and return its `seq`.
///
/// Only the columns the ingestion side knows about are touched. A new
/// `content_hash` that differs from `indexed_hash` makes the document stale;
/// the derived columns stay as they were until the next reindex.
pub async fn upsert_document(pool: &SqlitePool, record: &IngestRecord) -> Result<i64> {
    let now = Utc::now().timestamp();

    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (id, content_hash, account, event_date, source_path, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            content_hash = COALESCE(excluded.content_hash, documents.content_hash),
            account = COALESCE(excluded.account, documents.account),
            event_date = COALESCE(excluded.event_date, documents.event_date),
            source_path = COALESCE(excluded.source_path, documents.source_path),
            ingested_at = excluded.ingested_at
        RETURNING seq
        "#,
    )
    .bind(&record.id)
    .bind(&record.content_hash)
    .bind(&record.account)
    .bind(&record.event_date)
    .bind(&record.source_path)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(seq)
}

/// Current `content_hash` for `id`. Outer `None` means no such document.
pub async fn content_hash_of(pool: &SqlitePool, id: &str) -> Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT content_hash FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(hash,)| hash))
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<StoredDocument>> {
    let doc = sqlx::query_as::<_, StoredDocument>(
        "SELECT seq, id, account, source_path, content_hash, indexed_hash, event_date \
         FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(doc)
}

pub async fn document_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Columns recomputed every time a document is indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFields {
    pub subject: String,
    pub sender_display: String,
    pub sender_email: Option<String>,
    pub recipients_display: String,
    pub recipient_emails: Option<String>,
    pub labels: Option<String>,
    pub has_attachments: bool,
    pub snippet: String,
}

impl DerivedFields {
    pub fn from_source(doc: &SourceDocument, snippet_chars: usize) -> Self {
        let labels = doc
            .labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        Self {
            subject: doc.subject.clone(),
            sender_display: doc.sender.clone(),
            sender_email: extract_email(&doc.sender),
            recipients_display: doc.recipients.clone(),
            recipient_emails: normalize_recipients(&doc.recipients),
            labels: if labels.is_empty() { None } else { Some(labels) },
            has_attachments: doc.attachments.iter().any(|a| !a.trim().is_empty()),
            snippet: make_snippet(&doc.body, snippet_chars),
        }
    }
}

/// Write the derived columns and mark the document as indexed at
/// `indexed_hash`. When the row has no `content_hash` yet it takes the same
/// value, so the pair compares equal afterwards.
///
/// Returns `false` if the row no longer exists.
pub async fn mark_indexed(
    conn: &mut SqliteConnection,
    seq: i64,
    fields: &DerivedFields,
    indexed_hash: &str,
) -> Result<bool> {
    let now = Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        UPDATE documents SET
            subject = ?,
            sender_display = ?,
            sender_email = ?,
            recipients_display = ?,
            recipient_emails = ?,
            labels = ?,
            has_attachments = ?,
            snippet = ?,
            indexed_hash = ?,
            content_hash = COALESCE(content_hash, ?),
            indexed_at = ?
        WHERE seq = ?
        "#,
    )
    .bind(&fields.subject)
    .bind(&fields.sender_display)
    .bind(&fields.sender_email)
    .bind(&fields.recipients_display)
    .bind(&fields.recipient_emails)
    .bind(&fields.labels)
    .bind(fields.has_attachments)
    .bind(&fields.snippet)
    .bind(indexed_hash)
    .bind(indexed_hash)
    .bind(now)
    .bind(seq)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reduce one address field to a bare lower-cased address.
///
/// `"Alice" <Alice@Example.com>` → `alice@example.com`. Values without angle
/// brackets count only if they contain `@`.
pub fn extract_email(value: &str) -> Option<String> {
    let value = value.trim();
    let candidate = match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    let candidate = candidate.trim();
    if candidate.contains('@') && !candidate.contains(char::is_whitespace) {
        Some(candidate.to_lowercase())
    } else {
        None
    }
}

/// `a@x.com, "B" <b@y.com>` → `,a@x.com,b@y.com,`.
///
/// The wrapping commas let a membership test search for `,addr,` without
/// matching inside a longer address.
pub fn normalize_recipients(value: &str) -> Option<String> {
    let emails: Vec<String> = split_addresses(value)
        .into_iter()
        .filter_map(extract_email)
        .collect();
    if emails.is_empty() {
        None
    } else {
        Some(format!(",{},", emails.join(",")))
    }
}

/// Split on commas that are not inside a quoted display name.
fn split_addresses(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' | ';' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// First `max_chars` characters of `body` with whitespace runs collapsed.
pub fn make_snippet(body: &str, max_chars: usize) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut snippet: String = collapsed.chars().take(max_chars).collect();
    snippet.truncate(snippet.trim_end().len());
    snippet.push_str("...");
    snippet
}

/// Stable id for an envelope that does not carry one.
pub fn make_document_id(account: &str, relative_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    hasher.update(b"\0");
    hasher.update(relative_path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..24].to_string()
}

/// Hash of the searchable fields, for documents whose source has no byte
/// hash of its own.
pub fn fields_hash(doc: &SourceDocument) -> String {
    let mut hasher = Sha256::new();
    for part in [&doc.subject, &doc.sender, &doc.recipients, &doc.body] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    for name in &doc.attachments {
        hasher.update(name.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.update(b"\0");
    for label in &doc.labels {
        hasher.update(label.as_bytes());
        hasher.update(b"\x1f");
    }
    hex::encode(hasher.finalize())
}
