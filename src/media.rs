#![forbid(unsafe_code)]

//! Records exchanged between the platform adapters, the lifecycle manager and
//! the HTTP layer.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What the user asked the engine to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Format selector handed to the extraction engine.
    pub fn format_selector(self) -> &'static str {
        match self {
            Self::Video => "bestvideo+bestaudio/best",
            Self::Audio => "bestaudio/best",
        }
    }

    /// "Video" / "Audio", used in progress labels.
    pub fn title_case(self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Audio => "Audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(Error::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Descriptive metadata returned by `analyze`. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub webpage_url: String,
}

/// A downloaded file waiting in the temp directory for its session to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedFile {
    pub file_path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

/// Picks the MIME type from the extension only; the file content is never
/// inspected. `ext` may carry a leading dot.
pub fn mime_for(kind: MediaKind, ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    match kind {
        MediaKind::Audio => match ext.as_str() {
            "mp3" => "audio/mpeg",
            "m4a" => "audio/mp4",
            _ => "audio/*",
        },
        MediaKind::Video => match ext.as_str() {
            "mp4" | "m4v" => "video/mp4",
            "webm" => "video/webm",
            _ => "video/*",
        },
    }
}
