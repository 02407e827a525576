#![forbid(unsafe_code)]

//! Per-platform adapters over the extraction engine.
//!
//! Every supported site goes through the same engine; what differs is the
//! short code used in output names, whether audio-only downloads are offered,
//! and which cookie file (if any) is handed to the engine.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::extractor::{ExtractOptions, ExtractedInfo, MediaExtractor};
use crate::janitor::delete_file;
use crate::media::{AnalysisResult, MediaKind, PreparedFile, mime_for};
use crate::progress::RawProgress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    YouTube,
    Facebook,
    Instagram,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::YouTube,
        Platform::Facebook,
        Platform::Instagram,
        Platform::TikTok,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Facebook => "Facebook",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
        }
    }

    /// Prefix of every file generated for this platform.
    pub const fn code(self) -> &'static str {
        match self {
            Self::YouTube => "yt",
            Self::Facebook => "fb",
            Self::Instagram => "ig",
            Self::TikTok => "tt",
        }
    }

    pub const fn supports_audio(self) -> bool {
        match self {
            Self::YouTube | Self::TikTok => true,
            Self::Facebook | Self::Instagram => false,
        }
    }

    /// Environment key holding this platform's cookie file.
    pub const fn cookie_key(self) -> &'static str {
        match self {
            Self::YouTube => "COOKIES_YOUTUBE",
            Self::Facebook => "COOKIES_FACEBOOK",
            Self::Instagram => "COOKIES_INSTAGRAM",
            Self::TikTok => "COOKIES_TIKTOK",
        }
    }

    pub fn media_kinds(self) -> &'static [MediaKind] {
        if self.supports_audio() {
            &[MediaKind::Video, MediaKind::Audio]
        } else {
            &[MediaKind::Video]
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|platform| {
                platform.name().eq_ignore_ascii_case(wanted)
                    || platform.code().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| Error::UnknownPlatform(wanted.to_string()))
    }
}

impl Serialize for Platform {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// What the lifecycle manager needs from a platform.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn supports_audio(&self) -> bool {
        self.platform().supports_audio()
    }

    fn analyze(&self, url: &str) -> Result<AnalysisResult>;

    /// Downloads into `target_dir`, calling `on_progress` with every raw
    /// engine event while the download runs.
    fn download(
        &self,
        url: &str,
        kind: MediaKind,
        target_dir: &Path,
        on_progress: &mut dyn FnMut(RawProgress),
    ) -> Result<PreparedFile>;
}

/// Platform adapter backed by a [`MediaExtractor`].
pub struct ExtractorPlatform {
    platform: Platform,
    cookie_file: Option<PathBuf>,
    extractor: Arc<dyn MediaExtractor>,
}

impl ExtractorPlatform {
    pub fn new(
        platform: Platform,
        cookie_file: Option<PathBuf>,
        extractor: Arc<dyn MediaExtractor>,
    ) -> Self {
        Self {
            platform,
            cookie_file,
            extractor,
        }
    }

    /// Configured cookie file, but only when it is actually on disk.
    fn cookies(&self) -> Option<PathBuf> {
        let path = self.cookie_file.as_ref()?;
        if path.is_file() {
            Some(path.clone())
        } else {
            warn!(
                platform = %self.platform,
                path = %path.display(),
                "configured cookie file is missing; continuing without it"
            );
            None
        }
    }
}

impl PlatformAdapter for ExtractorPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn analyze(&self, url: &str) -> Result<AnalysisResult> {
        let options = ExtractOptions::metadata(self.cookies());
        let info = self
            .extractor
            .extract_metadata(url, &options)
            .map_err(|err| Error::extraction(url, &err))?;
        Ok(info.to_analysis(url))
    }

    fn download(
        &self,
        url: &str,
        kind: MediaKind,
        target_dir: &Path,
        on_progress: &mut dyn FnMut(RawProgress),
    ) -> Result<PreparedFile> {
        if kind == MediaKind::Audio && !self.supports_audio() {
            return Err(Error::UnsupportedMediaKind {
                platform: self.platform,
                kind,
            });
        }
        fs::create_dir_all(target_dir)?;

        let started = SystemTime::now();
        let stem = output_stem(self.platform, kind, started);
        let template = target_dir.join(format!("{stem}.%(ext)s"));
        let options = ExtractOptions::download(kind.format_selector(), self.cookies());

        info!(platform = %self.platform, %kind, %stem, "starting download");
        let info = match self
            .extractor
            .extract_and_download(url, &options, &template, on_progress)
        {
            Ok(info) => info,
            Err(err) => {
                remove_partial_outputs(target_dir, &stem);
                return Err(Error::extraction(url, &err));
            }
        };

        let file_path = resolve_output_file(&info, target_dir, &stem, started)?;
        Ok(prepared_file(file_path, kind))
    }
}

fn prepared_file(file_path: PathBuf, kind: MediaKind) -> PreparedFile {
    let file_path = std::path::absolute(&file_path).unwrap_or(file_path);
    let file_name = file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file_path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    PreparedFile {
        mime_type: mime_for(kind, &ext).to_string(),
        file_path,
        file_name,
    }
}

static OUTPUT_SEQ: AtomicU64 = AtomicU64::new(1);

/// `{code}_{kind}_{YYYYmmdd_HHMMSS}_{seq}`. The timestamp only has second
/// resolution, so the process-wide sequence keeps two preparations started in
/// the same second from sharing an output path.
pub fn output_stem(platform: Platform, kind: MediaKind, now: SystemTime) -> String {
    let seq = OUTPUT_SEQ.fetch_add(1, Ordering::Relaxed);
    let timestamp = DateTime::<Local>::from(now).format("%Y%m%d_%H%M%S");
    format!("{}_{}_{}_{}", platform.code(), kind.as_str(), timestamp, seq)
}

/// Finds the file the engine actually wrote. The declared output does not
/// always match what ends up on disk (merges and remuxes change extensions),
/// so each weaker signal is consulted only when the stronger one is absent or
/// points at nothing:
///
/// 1. the explicitly reported path,
/// 2. the legacy `_filename` field,
/// 3. the newest finished file in `target_dir` named after `stem`,
/// 4. the newest finished file in `target_dir` modified since `started`.
///
/// The directory is shared, so the last step ignores files that predate this
/// download; they belong to other sessions.
pub fn resolve_output_file(
    info: &ExtractedInfo,
    target_dir: &Path,
    stem: &str,
    started: SystemTime,
) -> Result<PathBuf> {
    if let Some(path) = info.reported_path().filter(|path| path.is_file()) {
        return Ok(path);
    }
    if let Some(path) = info.legacy_path().filter(|path| path.is_file()) {
        return Ok(path);
    }

    // Coarse filesystem timestamps can round a fresh mtime down.
    let not_before = started
        .checked_sub(MTIME_SLACK)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    newest_file(target_dir, |name, _| has_stem(name, stem))
        .or_else(|| newest_file(target_dir, |_, modified| modified >= not_before))
        .ok_or_else(|| Error::FileResolution {
            dir: target_dir.to_path_buf(),
        })
}

const MTIME_SLACK: Duration = Duration::from_secs(2);

/// `stem` followed by an extension. A bare prefix match would let
/// `..._1` claim `..._12.mp4`.
fn has_stem(name: &str, stem: &str) -> bool {
    name.strip_prefix(stem)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn newest_file(dir: &Path, accept: impl Fn(&str, SystemTime) -> bool) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut best: Option<(PathBuf, SystemTime)> = None;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_incomplete_artifact(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if !accept(&name, modified) {
            continue;
        }
        match &best {
            Some((_, best_time)) if modified <= *best_time => {}
            _ => best = Some((entry.path(), modified)),
        }
    }

    best.map(|(path, _)| path)
}

fn is_incomplete_artifact(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(".part") || name.ends_with(".ytdl")
}

/// Deletes whatever a failed download left behind under `stem`.
fn remove_partial_outputs(dir: &Path, stem: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if has_stem(&entry.file_name().to_string_lossy(), stem) {
            delete_file(&entry.path());
        }
    }
}

/// Explicit platform -> adapter map, built once at startup.
#[derive(Default)]
pub struct PlatformRegistry {
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ExtractorPlatform`] per supported platform, sharing `extractor`.
    pub fn from_settings(settings: &Settings, extractor: Arc<dyn MediaExtractor>) -> Self {
        let mut registry = Self::new();
        for platform in Platform::ALL {
            registry.register(Arc::new(ExtractorPlatform::new(
                platform,
                settings.cookie_file(platform).map(Path::to_path_buf),
                extractor.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(&platform)
            .ok_or_else(|| Error::UnknownPlatform(platform.name().to_string()))
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.adapters.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use filetime::{FileTime, set_file_mtime};
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::tempdir;

    /// Engine double: writes `ext` next to the template and reports it the way
    /// the test asks.
    struct StubEngine {
        ext: &'static str,
        report: Report,
        fail: bool,
        seen: Mutex<Vec<ExtractOptions>>,
    }

    #[derive(Clone, Copy)]
    enum Report {
        Explicit,
        Legacy,
        Nothing,
    }

    impl StubEngine {
        fn new(ext: &'static str, report: Report) -> Self {
            Self {
                ext,
                report,
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MediaExtractor for StubEngine {
        fn extract_metadata(&self, url: &str, options: &ExtractOptions) -> anyhow::Result<ExtractedInfo> {
            self.seen.lock().push(options.clone());
            if self.fail {
                return Err(anyhow!("Unsupported URL: {url}"));
            }
            Ok(serde_json::from_value(json!({"id": "v1", "title": "Clip"}))?)
        }

        fn extract_and_download(
            &self,
            _url: &str,
            options: &ExtractOptions,
            output_template: &Path,
            on_progress: &mut dyn FnMut(RawProgress),
        ) -> anyhow::Result<ExtractedInfo> {
            self.seen.lock().push(options.clone());
            let target = PathBuf::from(
                output_template
                    .to_string_lossy()
                    .replace("%(ext)s", self.ext),
            );
            fs::write(target.with_extension("part"), b"partial")?;
            if self.fail {
                return Err(anyhow!("HTTP Error 403"));
            }
            fs::remove_file(target.with_extension("part"))?;
            fs::write(&target, b"media")?;
            on_progress(RawProgress::finished());
            let target = target.to_string_lossy().into_owned();
            Ok(match self.report {
                Report::Explicit => serde_json::from_value(
                    json!({"requested_downloads": [{"filepath": target}]}),
                )?,
                Report::Legacy => serde_json::from_value(json!({"_filename": target}))?,
                Report::Nothing => ExtractedInfo::default(),
            })
        }
    }

    fn adapter(platform: Platform, engine: Arc<StubEngine>) -> ExtractorPlatform {
        ExtractorPlatform::new(platform, None, engine)
    }

    #[test]
    fn platform_capabilities() {
        assert!(Platform::YouTube.supports_audio());
        assert!(!Platform::Facebook.supports_audio());
        assert_eq!(Platform::Facebook.media_kinds(), &[MediaKind::Video]);
        assert_eq!(Platform::YouTube.code(), "yt");
        assert_eq!("fb".parse::<Platform>().unwrap(), Platform::Facebook);
        assert_eq!("tiktok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn output_stems_are_unique_within_one_second() {
        let now = SystemTime::now();
        let first = output_stem(Platform::YouTube, MediaKind::Video, now);
        let second = output_stem(Platform::YouTube, MediaKind::Video, now);
        assert_ne!(first, second);
        assert!(first.starts_with("yt_video_"));
        let parts: Vec<&str> = first.split('_').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[3].len(), 6);
    }

    #[test]
    fn download_uses_reported_path() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StubEngine::new("mp4", Report::Explicit));
        let prepared = adapter(Platform::YouTube, engine.clone())
            .download("https://y.test/v", MediaKind::Video, dir.path(), &mut |_| {})
            .unwrap();

        assert!(prepared.file_path.is_file());
        assert!(prepared.file_path.is_absolute());
        assert!(prepared.file_name.starts_with("yt_video_"));
        assert!(prepared.file_name.ends_with(".mp4"));
        assert_eq!(prepared.mime_type, "video/mp4");
        let seen = engine.seen.lock();
        assert_eq!(seen[0].format.as_deref(), Some("bestvideo+bestaudio/best"));
        assert!(seen[0].no_playlist);
    }

    #[test]
    fn legacy_filename_is_used_without_reported_path() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StubEngine::new("m4a", Report::Legacy));
        let prepared = adapter(Platform::TikTok, engine.clone())
            .download("https://t.test/v", MediaKind::Audio, dir.path(), &mut |_| {})
            .unwrap();

        assert!(prepared.file_name.starts_with("tt_audio_"));
        assert_eq!(prepared.mime_type, "audio/mp4");
        assert_eq!(engine.seen.lock()[0].format.as_deref(), Some("bestaudio/best"));
    }

    #[test]
    fn single_file_in_directory_is_selected_without_any_report() {
        let dir = tempdir().unwrap();
        let started = SystemTime::now();
        let only = dir.path().join("whatever.webm");
        fs::write(&only, b"x").unwrap();

        let resolved =
            resolve_output_file(&ExtractedInfo::default(), dir.path(), "yt_video_x_1", started)
                .unwrap();

        assert_eq!(resolved, only);
    }

    #[test]
    fn files_from_before_the_download_are_never_adopted() {
        let dir = tempdir().unwrap();
        let started = SystemTime::now();
        let older = dir.path().join("fb_video_20240101_000000_3.mp4");
        fs::write(&older, b"x").unwrap();
        set_file_mtime(
            &older,
            FileTime::from_system_time(started - Duration::from_secs(30)),
        )
        .unwrap();

        let err = resolve_output_file(&ExtractedInfo::default(), dir.path(), "yt_video_x_1", started)
            .unwrap_err();

        assert!(matches!(err, Error::FileResolution { .. }));
        assert!(older.exists());
    }

    #[test]
    fn longer_sequence_numbers_do_not_match_a_shorter_stem() {
        let dir = tempdir().unwrap();
        let stem = "yt_video_20240101_000000_1";
        let other = dir.path().join("yt_video_20240101_000000_12.mp4");
        fs::write(&other, b"finished by another session").unwrap();
        set_file_mtime(
            &other,
            FileTime::from_system_time(SystemTime::now() - Duration::from_secs(30)),
        )
        .unwrap();

        let err = resolve_output_file(&ExtractedInfo::default(), dir.path(), stem, SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, Error::FileResolution { .. }));

        let ours = dir.path().join(format!("{stem}.webm"));
        fs::write(&ours, b"x").unwrap();
        fs::write(dir.path().join(format!("{stem}.webm.part")), b"x").unwrap();
        remove_partial_outputs(dir.path(), stem);

        assert!(other.exists());
        assert!(!ours.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn stem_match_requires_an_extension_boundary() {
        assert!(has_stem("yt_video_x_1.mp4", "yt_video_x_1"));
        assert!(has_stem("yt_video_x_1.f137.mp4.part", "yt_video_x_1"));
        assert!(!has_stem("yt_video_x_12.mp4", "yt_video_x_1"));
        assert!(!has_stem("yt_video_x_1", "yt_video_x_1"));
    }

    #[test]
    fn empty_directory_without_report_is_a_resolution_error() {
        let dir = tempdir().unwrap();
        let err = resolve_output_file(
            &ExtractedInfo::default(),
            dir.path(),
            "yt_video_x_1",
            SystemTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileResolution { .. }));
    }

    #[test]
    fn directory_scan_prefers_own_stem_over_newer_foreign_files() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        let ours = dir.path().join("yt_video_20240101_000000_7.mkv");
        let foreign = dir.path().join("fb_video_20240101_000000_8.mp4");
        fs::write(&ours, b"x").unwrap();
        fs::write(&foreign, b"x").unwrap();
        set_file_mtime(&ours, FileTime::from_system_time(now - Duration::from_secs(60))).unwrap();
        set_file_mtime(&foreign, FileTime::from_system_time(now)).unwrap();
        fs::write(dir.path().join("yt_video_20240101_000000_7.mp4.part"), b"x").unwrap();

        let resolved =
            resolve_output_file(&ExtractedInfo::default(), dir.path(), "yt_video_20240101_000000_7", now)
                .unwrap();

        assert_eq!(resolved, ours);
    }

    #[test]
    fn stale_reported_path_falls_through_to_directory() {
        let dir = tempdir().unwrap();
        let merged = dir.path().join("yt_video_s_1.mkv");
        fs::write(&merged, b"x").unwrap();
        let info: ExtractedInfo = serde_json::from_value(json!({
            "requested_downloads": [{"filepath": dir.path().join("yt_video_s_1.webm")}]
        }))
        .unwrap();

        assert_eq!(
            resolve_output_file(&info, dir.path(), "yt_video_s_1", SystemTime::now()).unwrap(),
            merged
        );
    }

    #[test]
    fn nothing_reported_and_nothing_written_is_a_resolution_error() {
        struct SilentEngine;
        impl MediaExtractor for SilentEngine {
            fn extract_metadata(&self, _: &str, _: &ExtractOptions) -> anyhow::Result<ExtractedInfo> {
                Ok(ExtractedInfo::default())
            }
            fn extract_and_download(
                &self,
                _: &str,
                _: &ExtractOptions,
                _: &Path,
                _: &mut dyn FnMut(RawProgress),
            ) -> anyhow::Result<ExtractedInfo> {
                Ok(ExtractedInfo::default())
            }
        }

        let dir = tempdir().unwrap();
        let err = ExtractorPlatform::new(Platform::YouTube, None, Arc::new(SilentEngine))
            .download("https://y.test/v", MediaKind::Video, dir.path(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::FileResolution { .. }));
    }

    #[test]
    fn failed_download_removes_partial_output() {
        let dir = tempdir().unwrap();
        let mut engine = StubEngine::new("mp4", Report::Explicit);
        engine.fail = true;
        let err = adapter(Platform::YouTube, Arc::new(engine))
            .download("https://y.test/v", MediaKind::Video, dir.path(), &mut |_| {})
            .unwrap_err();

        assert!(matches!(err, Error::Extraction { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn audio_on_video_only_platform_is_rejected_before_download() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StubEngine::new("mp3", Report::Explicit));
        let err = adapter(Platform::Facebook, engine.clone())
            .download("https://f.test/v", MediaKind::Audio, dir.path(), &mut |_| {})
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedMediaKind { .. }));
        assert!(engine.seen.lock().is_empty());
    }

    #[test]
    fn analyze_maps_engine_failures() {
        let mut engine = StubEngine::new("mp4", Report::Explicit);
        engine.fail = true;
        let err = adapter(Platform::Instagram, Arc::new(engine))
            .analyze("https://i.test/p/1")
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn analyze_uses_metadata_options() {
        let engine = Arc::new(StubEngine::new("mp4", Report::Explicit));
        let analysis = adapter(Platform::YouTube, engine.clone())
            .analyze("https://y.test/v")
            .unwrap();
        assert_eq!(analysis.title, "Clip");
        assert_eq!(analysis.webpage_url, "https://y.test/v");
        assert!(engine.seen.lock()[0].skip_download);
    }

    #[test]
    fn missing_cookie_file_is_not_forwarded() {
        let engine = Arc::new(StubEngine::new("mp4", Report::Explicit));
        let adapter = ExtractorPlatform::new(
            Platform::YouTube,
            Some(PathBuf::from("/definitely/not/here/cookies.txt")),
            engine.clone(),
        );
        adapter.analyze("https://y.test/v").unwrap();
        assert!(engine.seen.lock()[0].cookie_file.is_none());
    }

    #[test]
    fn existing_cookie_file_is_forwarded() {
        let dir = tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        fs::write(&cookies, b"# Netscape HTTP Cookie File").unwrap();
        let engine = Arc::new(StubEngine::new("mp4", Report::Explicit));
        ExtractorPlatform::new(Platform::YouTube, Some(cookies.clone()), engine.clone())
            .analyze("https://y.test/v")
            .unwrap();
        assert_eq!(engine.seen.lock()[0].cookie_file, Some(cookies));
    }

    #[test]
    fn registry_is_ordered_and_complete() {
        let engine: Arc<dyn MediaExtractor> = Arc::new(StubEngine::new("mp4", Report::Explicit));
        let registry = PlatformRegistry::from_settings(&Settings::for_tests(), engine);
        let platforms: Vec<Platform> = registry.platforms().collect();
        assert_eq!(platforms, Platform::ALL.to_vec());
        assert!(!registry.get(Platform::Facebook).unwrap().supports_audio());
    }
}
