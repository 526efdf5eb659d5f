//! Single-writer lock.
//!
//! SQLite serializes writes, but two reindex runs interleaving their commits
//! would race on which documents are stale. Writers take an exclusive
//! advisory lock on `<db>.writer.lock` first; the OS drops it if the process
//! dies.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Take the lock for the database at `db_path`, failing immediately if
    /// another process holds it.
    pub fn acquire(db_path: &Path) -> Result<Self> {
        let path = lock_path(db_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(
                "Another writer (reindex or db-check --fix) is already running on {}",
                db_path.display()
            );
        }

        tracing::debug!(lock = %path.display(), "writer lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".writer.lock");
    PathBuf::from(name)
}
