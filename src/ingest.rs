use anyhow::Result;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SourceConfig};
use crate::db;
use crate::models::IngestRecord;
use crate::progress::ProgressMode;
use crate::reindex::{self, ReindexOptions, Selector};
use crate::source::{self, Envelope};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub scanned: u64,
    pub new: u64,
    pub changed: u64,
    pub unchanged: u64,
    /// Files that were not valid envelopes.
    pub invalid: u64,
}

/// Walk the source tree and upsert every envelope by content hash.
///
/// Only ids, hashes and metadata are written here. Changed documents become
/// stale and are picked up by the next reindex.
pub async fn ingest_source(pool: &SqlitePool, config: &SourceConfig) -> Result<IngestSummary> {
    let files = source::scan_source(config)?;
    let mut summary = IngestSummary {
        scanned: files.len() as u64,
        ..Default::default()
    };

    for file in &files {
        let bytes = tokio::fs::read(&file.path).await?;
        let envelope = match Envelope::parse(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(path = %file.relative_path, error = %e, "skipping invalid envelope");
                summary.invalid += 1;
                continue;
            }
        };

        let content_hash = source::hash_bytes(&bytes);
        let id = envelope.document_id(&file.relative_path);

        match store::content_hash_of(pool, &id).await? {
            None => summary.new += 1,
            Some(Some(existing)) if existing == content_hash => summary.unchanged += 1,
            Some(_) => summary.changed += 1,
        }

        let record = IngestRecord {
            id,
            content_hash: Some(content_hash),
            account: Some(envelope.account_or_default().to_string()),
            event_date: envelope
                .date
                .as_deref()
                .and_then(source::normalize_event_date),
            source_path: Some(file.relative_path.clone()),
        };
        store::upsert_document(pool, &record).await?;
    }

    Ok(summary)
}

/// CLI entry point for `inboxdb ingest`.
pub async fn run_ingest(
    config: &Config,
    index: bool,
    progress: ProgressMode,
    cancel: &CancellationToken,
) -> Result<()> {
    let source_config = config.source()?;
    let pool = db::connect(config).await?;
    let summary = ingest_source(&pool, source_config).await?;
    pool.close().await;

    println!("ingest {}", source_config.root.display());
    println!("  scanned: {} files", summary.scanned);
    println!("  new: {}", summary.new);
    println!("  changed: {}", summary.changed);
    println!("  unchanged: {}", summary.unchanged);
    if summary.invalid > 0 {
        println!("  invalid: {}", summary.invalid);
    }
    println!("ok");

    if index {
        let options = ReindexOptions::new(Selector::All, config);
        reindex::run_reindex(config, &options, progress, cancel).await?;
    }

    Ok(())
}
