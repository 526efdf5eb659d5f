use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::SortOrder;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where pre-decoded message envelopes live on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Documents per write-session commit during reindex.
    #[serde(default = "default_commit_interval")]
    pub commit_interval: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            commit_interval: default_commit_interval(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_commit_interval() -> usize {
    50
}
fn default_snippet_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default)]
    pub default_sort: SortOrder,
    /// Whether documents without a parsed date show up in results.
    #[serde(default = "default_include_undated")]
    pub include_undated: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_sort: SortOrder::default(),
            include_undated: default_include_undated(),
        }
    }
}

fn default_limit() -> i64 {
    50
}
fn default_max_limit() -> i64 {
    500
}
fn default_include_undated() -> bool {
    true
}

impl Config {
    /// Minimal config for a database path, used by tests and embedders.
    pub fn for_db(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            source: None,
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }

    pub fn source(&self) -> Result<&SourceConfig> {
        self.source
            .as_ref()
            .context("No [source] section in config; set source.root to the message directory")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate index
    if config.index.commit_interval == 0 {
        anyhow::bail!("index.commit_interval must be >= 1");
    }
    if config.index.snippet_chars == 0 {
        anyhow::bail!("index.snippet_chars must be >= 1");
    }

    // Validate search
    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }
    if config.search.max_limit < config.search.default_limit {
        anyhow::bail!(
            "search.max_limit ({}) must be >= search.default_limit ({})",
            config.search.max_limit,
            config.search.default_limit
        );
    }

    if let Some(source) = &config.source {
        if source.include_globs.is_empty() {
            anyhow::bail!("source.include_globs must not be empty");
        }
    }

    Ok(config)
}
