//! Search façade: parse, then run either a full-text join or a plain
//! column query, one page at a time.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{Config, SearchConfig};
use crate::db;
use crate::error::SearchError;
use crate::models::{SearchHit, SearchPage, SortOrder};
use crate::query::{parse_query, ParsedQuery};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Restrict to one account. Always AND-ed in.
    pub account: Option<String>,
    pub limit: Option<i64>,
    pub offset: i64,
    pub sort: Option<SortOrder>,
    pub include_undated: Option<bool>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Relevance needs full-text terms to rank by; without them fall back to
/// newest first.
fn effective_sort(requested: SortOrder, parsed: &ParsedQuery) -> SortOrder {
    if requested == SortOrder::Relevance && !parsed.has_fts() {
        SortOrder::DateDesc
    } else {
        requested
    }
}

fn order_by(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Relevance => "documents_fts.rank, d.seq DESC",
        SortOrder::DateDesc => "(d.event_date IS NULL), d.event_date DESC, d.seq DESC",
        SortOrder::DateAsc => "(d.event_date IS NULL), d.event_date ASC, d.seq DESC",
    }
}

/// Run one search.
///
/// Query errors come back as [`SearchError::Query`] before the store is
/// touched. Fetches `limit + 1` rows to know whether another page exists.
pub async fn search_documents(
    pool: &SqlitePool,
    request: &SearchRequest,
    config: &SearchConfig,
) -> Result<SearchPage, SearchError> {
    let parsed = parse_query(&request.query)?;

    let sort = effective_sort(request.sort.unwrap_or(config.default_sort), &parsed);
    let limit = request
        .limit
        .unwrap_or(config.default_limit)
        .clamp(1, config.max_limit.max(1));
    let offset = request.offset.max(0);
    let include_undated = request.include_undated.unwrap_or(config.include_undated);

    let has_documents: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM documents)")
        .fetch_one(pool)
        .await?;
    if !has_documents {
        tracing::warn!("search on an empty store");
        return Ok(SearchPage::empty(sort));
    }

    // Only documents that have been indexed at least once carry the
    // derived columns the hits and predicates read.
    let mut conditions: Vec<&str> = vec!["d.indexed_at IS NOT NULL"];
    let mut binds: Vec<String> = Vec::new();

    if parsed.has_fts() {
        conditions.insert(0, "documents_fts MATCH ?");
        binds.push(parsed.fts_expression.clone());
    }
    if let Some(account) = &request.account {
        conditions.push("d.account = ?");
        binds.push(account.clone());
    }
    if !include_undated {
        conditions.push("d.event_date IS NOT NULL");
    }
    for predicate in &parsed.predicates {
        conditions.push(predicate.sql());
        if let Some(param) = predicate.param() {
            binds.push(param);
        }
    }

    let from = if parsed.has_fts() {
        "documents_fts \
         JOIN fts_entries x ON x.entry_id = documents_fts.rowid \
         JOIN documents d ON d.seq = x.doc_seq"
    } else {
        "documents d"
    };

    let sql = format!(
        "SELECT d.id, d.subject, d.sender_display, d.event_date, d.snippet \
         FROM {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        from,
        conditions.join(" AND "),
        order_by(sort)
    );
    tracing::debug!(sql = %sql, binds = ?binds, "search plan");

    let mut query = sqlx::query_as::<_, SearchHit>(&sql);
    for value in &binds {
        query = query.bind(value);
    }
    let mut hits = query.bind(limit + 1).bind(offset).fetch_all(pool).await?;

    let has_more = hits.len() as i64 > limit;
    hits.truncate(limit as usize);

    Ok(SearchPage {
        hits,
        has_more,
        effective_sort: sort,
    })
}

/// CLI entry point for `inboxdb search`.
pub async fn run_search(config: &Config, request: &SearchRequest, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = search_documents(&pool, request, &config.search).await;
    pool.close().await;
    let page = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in page.hits.iter().enumerate() {
        let subject = hit.subject.as_deref().unwrap_or("(no subject)");
        let date = hit
            .event_date
            .as_deref()
            .map(|d| d.get(..10).unwrap_or(d))
            .unwrap_or("(undated)");

        println!("{}. {} / {}", request.offset + i as i64 + 1, date, subject);
        if let Some(sender) = hit.sender_display.as_deref() {
            println!("    from: {}", sender);
        }
        if let Some(snippet) = hit.snippet.as_deref().filter(|s| !s.is_empty()) {
            println!("    excerpt: \"{}\"", snippet);
        }
        println!("    id: {}", hit.id);
        println!();
    }

    if page.has_more {
        println!(
            "More results available: --offset {}",
            request.offset + page.hits.len() as i64
        );
    }
    if request.sort == Some(SortOrder::Relevance) && page.effective_sort != SortOrder::Relevance {
        println!("(sorted by date: relevance needs search terms)");
    }
    Ok(())
}
