#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use inboxdb::config::Config;
use inboxdb::lock::WriterLock;
use inboxdb::models::{IngestRecord, SourceDocument};
use inboxdb::progress::NoProgress;
use inboxdb::reindex::{self, ReindexOptions, ReindexReport, Selector};
use inboxdb::source::DocumentSource;
use inboxdb::{db, migrate, store};

pub struct TestDb {
    pub tmp: TempDir,
    pub path: PathBuf,
    pub pool: SqlitePool,
    pub config: Config,
}

pub async fn test_db() -> TestDb {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("inbox.sqlite");
    let pool = db::connect_path(&path).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let config = Config::for_db(&path);
    TestDb {
        tmp,
        path,
        pool,
        config,
    }
}

/// In-memory document source keyed by document id.
///
/// Can be told to cancel a token while loading the k-th document, which
/// simulates Ctrl-C arriving mid-batch.
#[derive(Default)]
pub struct MemorySource {
    docs: Mutex<HashMap<String, SourceDocument>>,
    loads: AtomicUsize,
    cancel_at: Option<(usize, CancellationToken)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_at(k: usize, token: CancellationToken) -> Self {
        Self {
            cancel_at: Some((k, token)),
            ..Self::default()
        }
    }

    pub fn put(&self, id: &str, doc: SourceDocument) {
        self.docs.lock().unwrap().insert(id.to_string(), doc);
    }

    pub fn remove(&self, id: &str) {
        self.docs.lock().unwrap().remove(id);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn load(&self, doc: &inboxdb::models::StoredDocument) -> Result<SourceDocument> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((k, token)) = &self.cancel_at {
            if n == *k {
                token.cancel();
            }
        }
        match self.docs.lock().unwrap().get(&doc.id) {
            Some(found) => Ok(found.clone()),
            None => bail!("no source for {}", doc.id),
        }
    }
}

pub fn message(subject: &str, from: &str, to: &str, body: &str) -> SourceDocument {
    SourceDocument {
        subject: subject.to_string(),
        sender: from.to_string(),
        recipients: to.to_string(),
        body: body.to_string(),
        ..Default::default()
    }
}

/// Ingest one document and register its fields with the source.
pub async fn add(
    db: &TestDb,
    source: &MemorySource,
    id: &str,
    version: u32,
    date: Option<&str>,
    doc: SourceDocument,
) -> i64 {
    add_to_account(db, source, id, version, date, "work", doc).await
}

pub async fn add_to_account(
    db: &TestDb,
    source: &MemorySource,
    id: &str,
    version: u32,
    date: Option<&str>,
    account: &str,
    doc: SourceDocument,
) -> i64 {
    source.put(id, doc);
    store::upsert_document(
        &db.pool,
        &IngestRecord {
            id: id.to_string(),
            content_hash: Some(format!("{}-v{}", id, version)),
            account: Some(account.to_string()),
            event_date: date.map(str::to_string),
            source_path: Some(format!("{}/{}.json", account, id)),
        },
    )
    .await
    .unwrap()
}

pub async fn reindex_with(
    db: &TestDb,
    source: &MemorySource,
    options: &ReindexOptions,
    cancel: &CancellationToken,
) -> ReindexReport {
    let lock = WriterLock::acquire(&db.path).unwrap();
    reindex::reconcile(&db.pool, &lock, source, options, cancel, &NoProgress)
        .await
        .unwrap()
}

pub async fn reindex_all(db: &TestDb, source: &MemorySource) -> ReindexReport {
    let options = ReindexOptions::new(Selector::All, &db.config);
    reindex_with(db, source, &options, &CancellationToken::new()).await
}

pub async fn entries_for(db: &TestDb, id: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM fts_entries x JOIN documents d ON d.seq = x.doc_seq WHERE d.id = ?",
    )
    .bind(id)
    .fetch_one(&db.pool)
    .await
    .unwrap()
}

pub async fn hashes_for(db: &TestDb, id: &str) -> (Option<String>, Option<String>) {
    sqlx::query_as("SELECT content_hash, indexed_hash FROM documents WHERE id = ?")
        .bind(id)
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

pub async fn is_fresh(db: &TestDb, id: &str) -> bool {
    matches!(hashes_for(db, id).await, (Some(c), Some(i)) if c == i)
}

pub async fn duplicate_count(db: &TestDb) -> usize {
    inboxdb::fts::documents_with_duplicates(&db.pool)
        .await
        .unwrap()
        .len()
}
