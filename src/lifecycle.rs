#![forbid(unsafe_code)]

//! Analyze -> prepare -> retrieve -> expire, one session at a time.
//!
//! Invariants kept here:
//! * a session holds at most one prepared file, and a replaced or cleared file
//!   is deleted from disk before the record changes;
//! * a failed operation never leaves a half-built [`PreparedFile`] behind;
//! * a prepared file that vanished from disk is reported as stale and dropped.

use std::{fs::File, path::Path, sync::Arc};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::extractor::ensure_program_available;
use crate::janitor::{TempFileJanitor, delete_file};
use crate::media::{AnalysisResult, MediaKind, PreparedFile};
use crate::platform::{Platform, PlatformRegistry};
use crate::progress::{ProgressEvent, ProgressSink, RawProgress};
use crate::session::{SessionPhase, SessionState};

/// An open handle on a prepared file, ready to be streamed to the user.
#[derive(Debug)]
pub struct RetrievedFile {
    pub file: File,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

pub struct DownloadLifecycleManager {
    registry: Arc<PlatformRegistry>,
    janitor: TempFileJanitor,
}

impl DownloadLifecycleManager {
    pub fn new(registry: Arc<PlatformRegistry>, janitor: TempFileJanitor) -> Self {
        Self { registry, janitor }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn janitor(&self) -> &TempFileJanitor {
        &self.janitor
    }

    /// Fetches metadata for `url`. Whatever happens, the session's previously
    /// prepared file is gone afterwards.
    pub fn analyze(
        &self,
        session: &mut SessionState,
        platform: Platform,
        url: &str,
    ) -> Result<AnalysisResult> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidUrl(url.to_string()));
        }
        let adapter = self.registry.get(platform)?.clone();

        clear_prepared(session);
        session.phase = SessionPhase::Analyzing;

        match adapter.analyze(url) {
            Ok(analysis) => {
                info!(%platform, url, title = %analysis.title, "analyzed content");
                session.analysis = Some(analysis.clone());
                session.source_url = url.to_string();
                session.platform = Some(platform);
                session.phase = SessionPhase::Analyzed;
                Ok(analysis)
            }
            Err(err) => {
                warn!(%platform, url, error = %err, "analysis failed");
                session.analysis = None;
                session.source_url.clear();
                session.platform = None;
                session.phase = SessionPhase::Idle;
                Err(err)
            }
        }
    }

    /// Downloads `kind` for the session's analyzed URL into the temp
    /// directory, emitting progress to `sink` while it runs.
    pub fn prepare(
        &self,
        session: &mut SessionState,
        platform: Platform,
        kind: MediaKind,
        sink: &mut dyn ProgressSink,
    ) -> Result<PreparedFile> {
        if session.analysis.is_none() || session.source_url.is_empty() {
            return Err(Error::NotAnalyzed);
        }
        let adapter = self.registry.get(platform)?.clone();
        if kind == MediaKind::Audio && !adapter.supports_audio() {
            return Err(Error::UnsupportedMediaKind { platform, kind });
        }

        clear_prepared(session);
        // Sweep failures are never the caller's problem.
        if let Err(err) = self.janitor.ensure_dir() {
            warn!(dir = %self.janitor.dir().display(), error = %err, "could not create temp dir");
        }
        self.janitor.sweep_now();
        session.phase = SessionPhase::Preparing;

        let url = session.source_url.clone();
        let mut relay = |raw: RawProgress| {
            if let Some(event) = ProgressEvent::from_raw(&raw) {
                sink.emit(event);
            }
        };
        let result = adapter.download(&url, kind, self.janitor.dir(), &mut relay);

        match result {
            Ok(prepared) => {
                info!(
                    %platform,
                    %kind,
                    file = %prepared.file_path.display(),
                    "prepared file"
                );
                session.prepared = Some(prepared.clone());
                session.phase = SessionPhase::Prepared;
                Ok(prepared)
            }
            Err(err) => {
                warn!(%platform, %kind, url, error = %err, "download preparation failed");
                session.prepared = None;
                session.phase = SessionPhase::Analyzed;
                Err(err)
            }
        }
    }

    /// Opens the prepared file. A file that vanished (janitor race, external
    /// deletion) is reported as stale and the record is dropped so the user
    /// can prepare again.
    pub fn retrieve(&self, session: &mut SessionState) -> Result<RetrievedFile> {
        let prepared = session.prepared.clone().ok_or(Error::NothingPrepared)?;

        match open_regular_file(&prepared.file_path) {
            Some((file, size)) => Ok(RetrievedFile {
                file,
                file_name: prepared.file_name,
                mime_type: prepared.mime_type,
                size,
            }),
            None => {
                warn!(file = %prepared.file_path.display(), "prepared file disappeared");
                session.prepared = None;
                session.phase = session.settled_phase();
                Err(Error::StaleFile {
                    path: prepared.file_path,
                })
            }
        }
    }

    /// Drops everything the session holds, deleting its prepared file.
    pub fn reset(&self, session: &mut SessionState) {
        clear_prepared(session);
        session.analysis = None;
        session.source_url.clear();
        session.platform = None;
        session.phase = SessionPhase::Idle;
    }

    /// Probes the engine and the muxer. Problems are warnings: some formats
    /// need no muxing at all.
    pub fn check_dependencies(engine: &Path, muxer: &Path) -> Vec<Error> {
        let mut problems = Vec::new();
        if let Err(err) = ensure_program_available(engine) {
            problems.push(Error::Configuration(format!(
                "media extraction engine unavailable, every download will fail: {err}"
            )));
        }
        if let Err(err) = ensure_program_available(muxer) {
            problems.push(Error::Configuration(format!(
                "{} is not installed; video/audio merge downloads may fail: {err}",
                muxer.display()
            )));
        }
        problems
    }
}

/// Deletes the prepared file (if any) and clears its record, in that order.
fn clear_prepared(session: &mut SessionState) {
    if let Some(prepared) = session.prepared.take() {
        delete_file(&prepared.file_path);
    }
    session.phase = session.settled_phase();
}

fn open_regular_file(path: &Path) -> Option<(File, u64)> {
    let file = File::open(path).ok()?;
    let meta = file.metadata().ok()?;
    meta.is_file().then(|| (file, meta.len()))
}
