//! Core data models shared by ingestion, reconciliation and search.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the ingestion side knows about a document before it is indexed.
#[derive(Debug, Clone, Default)]
pub struct IngestRecord {
    pub id: String,
    pub content_hash: Option<String>,
    pub account: Option<String>,
    /// ISO `YYYY-MM-DD[THH:MM:SS]`, compared as text.
    pub event_date: Option<String>,
    /// Path of the envelope file, relative to `source.root`.
    pub source_path: Option<String>,
}

/// A `documents` row as read by the reconciler.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredDocument {
    pub seq: i64,
    pub id: String,
    pub account: Option<String>,
    pub source_path: Option<String>,
    pub content_hash: Option<String>,
    pub indexed_hash: Option<String>,
    pub event_date: Option<String>,
}

impl StoredDocument {
    pub fn is_fresh(&self) -> bool {
        matches!(
            (&self.content_hash, &self.indexed_hash),
            (Some(c), Some(i)) if c == i
        )
    }
}

/// Plain-text fields handed back by a [`DocumentSource`](crate::source::DocumentSource).
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub subject: String,
    /// Display form, e.g. `"Alice" <alice@example.com>`.
    pub sender: String,
    /// Comma-separated display form.
    pub recipients: String,
    pub body: String,
    pub attachments: Vec<String>,
    pub labels: Vec<String>,
    /// Hash of the raw bytes, if the source knows it.
    pub content_hash: Option<String>,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// FTS5 `rank`. Only meaningful when the query has full-text terms.
    #[default]
    Relevance,
    DateDesc,
    DateAsc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::DateDesc => "date_desc",
            SortOrder::DateAsc => "date_asc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SortOrder::Relevance),
            "date_desc" | "newest" => Ok(SortOrder::DateDesc),
            "date_asc" | "oldest" => Ok(SortOrder::DateAsc),
            other => Err(format!(
                "unknown sort '{}'; expected relevance, date_desc or date_asc",
                other
            )),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SearchHit {
    pub id: String,
    pub subject: Option<String>,
    pub sender_display: Option<String>,
    pub event_date: Option<String>,
    pub snippet: Option<String>,
}

/// A page of hits.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub has_more: bool,
    /// Sort actually applied; differs from the request when relevance was
    /// asked for on a filter-only query.
    pub effective_sort: SortOrder,
}

impl SearchPage {
    pub fn empty(effective_sort: SortOrder) -> Self {
        Self {
            hits: Vec::new(),
            has_more: false,
            effective_sort,
        }
    }
}
