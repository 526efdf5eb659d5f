//! Reindex progress reporting.
//!
//! Reports observable progress during `inboxdb reindex` (and `ingest --index`)
//! so users see how many documents are left and when cleanup is running.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::str::FromStr;

/// A single progress event for a reindex run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReindexProgressEvent {
    /// Picking candidates. Total unknown.
    Selecting,
    /// n of total candidates processed (indexed or failed).
    Indexing { n: u64, total: u64 },
    /// n of total documents checked for superseded entries.
    Pruning { n: u64, total: u64 },
}

/// Reports reindex progress. Implementations write to stderr (human or JSON).
pub trait ReindexProgressReporter: Send + Sync {
    fn report(&self, event: ReindexProgressEvent);
}

/// Human-friendly progress on stderr: "reindex  indexing  1,234 / 5,000 documents".
pub struct StderrProgress;

impl ReindexProgressReporter for StderrProgress {
    fn report(&self, event: ReindexProgressEvent) {
        let line = match &event {
            ReindexProgressEvent::Selecting => "reindex  selecting...\n".to_string(),
            ReindexProgressEvent::Indexing { n, total } => format!(
                "reindex  indexing  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
            ReindexProgressEvent::Pruning { n, total } => format!(
                "reindex  pruning  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ReindexProgressReporter for JsonProgress {
    fn report(&self, event: ReindexProgressEvent) {
        let obj = match &event {
            ReindexProgressEvent::Selecting => serde_json::json!({
                "event": "progress",
                "phase": "selecting"
            }),
            ReindexProgressEvent::Indexing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n,
                "total": total
            }),
            ReindexProgressEvent::Pruning { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "pruning",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ReindexProgressReporter for NoProgress {
    fn report(&self, _event: ReindexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ReindexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "unknown progress mode '{}'; expected off, human or json",
                other
            )),
        }
    }
}
