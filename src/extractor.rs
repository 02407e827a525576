#![forbid(unsafe_code)]

//! Boundary to the media-extraction engine.
//!
//! The engine is an external program; everything it does (site support,
//! format negotiation, muxing) stays on its side of [`MediaExtractor`]. The
//! only implementation shipped here drives the `yt-dlp` binary.

use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc,
    thread,
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::warn;

use crate::media::AnalysisResult;
use crate::progress::RawProgress;

const PROGRESS_MARKER: &str = "RG-PROGRESS ";
const INFO_MARKER: &str = "RG-INFO ";
// Enough stderr context to explain a failure without flooding the log.
const STDERR_TAIL_LINES: usize = 20;

/// Knobs passed to every engine call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub quiet: bool,
    pub no_warnings: bool,
    /// Only ever process the single linked item, never a playlist.
    pub no_playlist: bool,
    pub skip_download: bool,
    pub format: Option<String>,
    pub cookie_file: Option<PathBuf>,
}

impl ExtractOptions {
    pub fn metadata(cookie_file: Option<PathBuf>) -> Self {
        Self {
            quiet: true,
            no_warnings: true,
            no_playlist: true,
            skip_download: true,
            format: None,
            cookie_file,
        }
    }

    pub fn download(format: &str, cookie_file: Option<PathBuf>) -> Self {
        Self {
            quiet: true,
            no_warnings: true,
            no_playlist: true,
            skip_download: false,
            format: Some(format.to_string()),
            cookie_file,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestedDownload {
    pub filepath: Option<String>,
}

/// The subset of the engine's info record this service reads. Everything is
/// optional: extractors for different sites fill in very different fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractedInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnails: Option<Vec<Thumbnail>>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub tags: Option<Vec<String>>,
    pub webpage_url: Option<String>,
    pub requested_downloads: Option<Vec<RequestedDownload>>,
    pub filepath: Option<String>,
    /// Older engines only report the output name here.
    #[serde(rename = "_filename")]
    pub legacy_filename: Option<String>,
}

impl ExtractedInfo {
    /// Path the engine says it wrote, if it said so explicitly.
    pub fn reported_path(&self) -> Option<PathBuf> {
        self.requested_downloads
            .iter()
            .flatten()
            .find_map(|download| non_empty(download.filepath.as_deref()))
            .or_else(|| non_empty(self.filepath.as_deref()))
            .map(PathBuf::from)
    }

    pub fn legacy_path(&self) -> Option<PathBuf> {
        non_empty(self.legacy_filename.as_deref()).map(PathBuf::from)
    }

    pub fn to_analysis(&self, source_url: &str) -> AnalysisResult {
        let thumbnail = non_empty(self.thumbnail.as_deref())
            .map(str::to_string)
            .or_else(|| {
                self.thumbnails
                    .as_ref()
                    .and_then(|thumbs| thumbs.last())
                    .and_then(|thumb| non_empty(thumb.url.as_deref()))
                    .map(str::to_string)
            });

        AnalysisResult {
            id: self.id.clone().unwrap_or_default(),
            title: non_empty(self.title.as_deref())
                .unwrap_or("Untitled")
                .to_string(),
            description: self.description.clone().unwrap_or_default(),
            thumbnail,
            duration: self.duration.filter(|value| value.is_finite() && *value >= 0.0),
            uploader: non_empty(self.uploader.as_deref())
                .or_else(|| non_empty(self.channel.as_deref()))
                .map(str::to_string),
            tags: self.tags.clone().unwrap_or_default(),
            webpage_url: non_empty(self.webpage_url.as_deref())
                .unwrap_or(source_url)
                .to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Engine contract: "given a URL and options, produce metadata, or a local
/// file plus metadata, or fail".
pub trait MediaExtractor: Send + Sync {
    fn extract_metadata(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedInfo>;

    /// `output_template` ends in `.%(ext)s`; the engine picks the extension.
    /// `on_progress` is called on the calling thread while the download runs.
    fn extract_and_download(
        &self,
        url: &str,
        options: &ExtractOptions,
        output_template: &Path,
        on_progress: &mut dyn FnMut(RawProgress),
    ) -> Result<ExtractedInfo>;
}

/// Drives the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

enum StreamLine {
    Stdout(String),
    Stderr(String),
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, options: &ExtractOptions) -> Command {
        let mut command = Command::new(&self.program);
        if options.quiet {
            command.arg("--quiet");
        }
        if options.no_warnings {
            command.arg("--no-warnings");
        }
        if options.no_playlist {
            command.arg("--no-playlist");
        }
        if options.skip_download {
            command.arg("--skip-download");
        }
        if let Some(format) = &options.format {
            command.arg("--format").arg(format);
        }
        if let Some(cookies) = &options.cookie_file {
            command.arg("--cookies").arg(cookies);
        }
        command
    }
}

impl MediaExtractor for YtDlp {
    fn extract_metadata(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedInfo> {
        let mut command = self.command(options);
        command.arg("--dump-single-json").arg("--").arg(url);

        let output = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("launching {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "metadata command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("deserializing metadata JSON")
    }

    fn extract_and_download(
        &self,
        url: &str,
        options: &ExtractOptions,
        output_template: &Path,
        on_progress: &mut dyn FnMut(RawProgress),
    ) -> Result<ExtractedInfo> {
        let mut command = self.command(options);
        command
            .arg("--output")
            .arg(output_template)
            .arg("--no-simulate")
            .arg("--progress")
            .arg("--newline")
            .arg("--progress-template")
            .arg(format!("download:{PROGRESS_MARKER}%(progress)j"))
            .arg("--print")
            .arg(format!("after_move:{INFO_MARKER}%()j"))
            .arg("--")
            .arg(url);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("launching {}", self.program.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("engine stderr was not captured"))?;

        // The engine may print progress on either stream depending on its
        // quiet settings, so both are read and merged in arrival order.
        let (tx, rx) = mpsc::channel();
        let out_reader = spawn_line_reader(stdout, tx.clone(), StreamLine::Stdout);
        let err_reader = spawn_line_reader(stderr, tx, StreamLine::Stderr);

        let mut info = None;
        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in rx {
            let (text, is_stderr) = match line {
                StreamLine::Stdout(text) => (text, false),
                StreamLine::Stderr(text) => (text, true),
            };
            let trimmed = text.trim();
            if let Some(payload) = trimmed.strip_prefix(PROGRESS_MARKER) {
                on_progress(parse_progress_payload(payload));
            } else if let Some(payload) = trimmed.strip_prefix(INFO_MARKER) {
                // The file may still be found on disk without this record.
                match serde_json::from_str::<ExtractedInfo>(payload) {
                    Ok(parsed) => info = Some(parsed),
                    Err(err) => warn!("ignoring unreadable download info: {err}"),
                }
            } else if is_stderr && !trimmed.is_empty() {
                if stderr_tail.len() == STDERR_TAIL_LINES {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(trimmed.to_string());
            }
        }

        let _ = out_reader.join();
        let _ = err_reader.join();
        let status = child
            .wait()
            .with_context(|| format!("waiting for {}", self.program.display()))?;

        if !status.success() {
            let detail = Vec::from(stderr_tail).join("\n");
            bail!("download command exited with {status}: {detail}");
        }

        on_progress(RawProgress::finished());
        Ok(info.unwrap_or_default())
    }
}

fn spawn_line_reader<R>(
    stream: R,
    tx: mpsc::Sender<StreamLine>,
    wrap: fn(String) -> StreamLine,
) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    })
}

fn parse_progress_payload(payload: &str) -> RawProgress {
    serde_json::from_str(payload).unwrap_or_else(|_| RawProgress {
        status: Some("downloading".into()),
        percent_str: Some(payload.to_string()),
        ..RawProgress::default()
    })
}

/// Runs `<program> --version` to detect missing runtime dependencies early.
pub fn ensure_program_available(program: &Path) -> Result<()> {
    let status = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => bail!(
            "{} is installed but returned {}",
            program.display(),
            status
        ),
        Err(err) => bail!("{} is not installed or not in PATH: {}", program.display(), err),
    }
}
