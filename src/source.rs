//! Document sources.
//!
//! The index never decodes raw mail. A [`DocumentSource`] hands back the
//! plain-text fields of a stored document on demand; [`JsonDirSource`] reads
//! them from pre-decoded JSON envelope files under `source.root`:
//!
//! ```json
//! {
//!   "id": "optional-stable-id",
//!   "account": "work",
//!   "date": "2024-01-15T09:30:00Z",
//!   "subject": "Q3 numbers",
//!   "from": "\"Alice\" <alice@example.com>",
//!   "to": ["bob@example.com", "Carol <carol@example.com>"],
//!   "body": "plain text body",
//!   "attachments": ["q3.xlsx"],
//!   "labels": ["inbox", "work"]
//! }
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::models::{SourceDocument, StoredDocument};
use crate::store::make_document_id;

const DEFAULT_ACCOUNT: &str = "default";

/// Produces the searchable fields of a stored document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, doc: &StoredDocument) -> Result<SourceDocument>;
}

/// `to` may be a single comma-separated string or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AddressList {
    One(String),
    Many(Vec<String>),
}

impl Default for AddressList {
    fn default() -> Self {
        AddressList::One(String::new())
    }
}

impl AddressList {
    fn joined(&self) -> String {
        match self {
            AddressList::One(s) => s.clone(),
            AddressList::Many(list) => list.join(", "),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    to: AddressList,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Envelope {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn recipients(&self) -> String {
        self.to.joined()
    }

    pub fn account_or_default(&self) -> &str {
        self.account
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(DEFAULT_ACCOUNT)
    }

    /// The envelope's id, or one derived from account and path.
    pub fn document_id(&self, relative_path: &str) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => make_document_id(self.account_or_default(), relative_path),
        }
    }

    fn into_source_document(self, content_hash: String) -> SourceDocument {
        let recipients = self.recipients();
        SourceDocument {
            subject: self.subject,
            sender: self.from,
            recipients,
            body: self.body,
            attachments: self.attachments,
            labels: self.labels,
            content_hash: Some(content_hash),
        }
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads envelopes from a directory tree.
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.root.clone())
    }
}

#[async_trait]
impl DocumentSource for JsonDirSource {
    async fn load(&self, doc: &StoredDocument) -> Result<SourceDocument> {
        let Some(relative) = doc.source_path.as_deref() else {
            bail!("document {} has no source path", doc.id);
        };
        let path = self.root.join(relative);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let envelope = Envelope::parse(&bytes)
            .with_context(|| format!("Invalid envelope: {}", path.display()))?;
        Ok(envelope.into_source_document(hash_bytes(&bytes)))
    }
}

/// One envelope file found under the source root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub relative_path: String,
    pub path: PathBuf,
}

/// Walk `source.root` and return matching files in path order.
pub fn scan_source(config: &SourceConfig) -> Result<Vec<ScannedFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Source root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel_str = relative_str(root, path);

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(ScannedFile {
            relative_path: rel_str,
            path: path.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(files)
}

fn relative_str(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Normalize a header date to ISO text so it sorts and compares correctly.
///
/// Timestamps become `YYYY-MM-DDTHH:MM:SS` in UTC; bare dates stay
/// `YYYY-MM-DD`. Unparseable input yields `None` (the document is undated).
pub fn normalize_event_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    const ISO: &str = "%Y-%m-%dT%H:%M:%S";

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).format(ISO).to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc).format(ISO).to_string());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.format(ISO).to_string());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    None
}
