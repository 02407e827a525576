#![forbid(unsafe_code)]

//! Garbage collection for the shared temp directory.
//!
//! Every session sweeps the same directory, so two sweeps (or a sweep and a
//! retrieval) can race on the same file. Deletion is idempotent and every
//! filesystem error is absorbed here: nothing in this module ever fails.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::debug;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
}

/// Owns the temp directory and its time-to-live.
#[derive(Debug, Clone)]
pub struct TempFileJanitor {
    dir: PathBuf,
    ttl: Duration,
}

impl TempFileJanitor {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn sweep_now(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let report = sweep(&self.dir, self.ttl, now);
        if !report.removed.is_empty() {
            debug!(
                dir = %self.dir.display(),
                removed = report.removed.len(),
                "swept stale temp files"
            );
        }
        report
    }
}

/// Deletes every regular file directly inside `dir` last modified before
/// `now - ttl`. Sub-directories are left alone.
pub fn sweep(dir: &Path, ttl: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let Some(cutoff) = now.checked_sub(ttl) else {
        return report;
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return report;
    };

    for entry in entries.flatten() {
        // `DirEntry::metadata` does not follow symlinks, which keeps a link to
        // a directory from being treated as a file.
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => report.removed.push(path),
            // Someone else got there first.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => debug!(path = %path.display(), error = %err, "could not sweep file"),
        }
    }

    report
}

/// Best-effort removal of a single regular file.
pub fn delete_file(path: &Path) {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => {}
        _ => return,
    }
    if let Err(err) = fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %err, "could not delete file");
    }
}
