#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

use crate::media::MediaKind;
use crate::platform::Platform;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine rejected or failed to process the URL.
    #[error("extraction failed for {url}: {detail}")]
    Extraction { url: String, detail: String },

    /// The engine reported success but nothing usable was written.
    #[error("downloaded file could not be located in {}", dir.display())]
    FileResolution { dir: PathBuf },

    #[error("prepared file {} is no longer on disk", path.display())]
    StaleFile { path: PathBuf },

    /// A runtime dependency is missing. Reported as a warning only.
    #[error("{0}")]
    Configuration(String),

    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    #[error("nothing has been analyzed in this session yet")]
    NotAnalyzed,

    #[error("no file has been prepared in this session")]
    NothingPrepared,

    #[error("{platform} does not support {kind} downloads")]
    UnsupportedMediaKind { platform: Platform, kind: MediaKind },

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown media kind: {0}")]
    UnknownMediaKind(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short text suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::Extraction { .. } => {
                "Failed to analyze or download this URL. Check the link and try again.".into()
            }
            Self::FileResolution { .. } => {
                "The download finished but the file could not be found. Try again.".into()
            }
            Self::StaleFile { .. } => {
                "Prepared file is no longer available. Prepare it again.".into()
            }
            Self::Configuration(message) => message.clone(),
            Self::InvalidUrl(_) => "Please provide a URL.".into(),
            Self::NotAnalyzed => "Analyze a URL before preparing a download.".into(),
            Self::NothingPrepared => "Nothing has been prepared yet.".into(),
            Self::UnsupportedMediaKind { platform, kind } => {
                format!("{platform} does not offer {kind} downloads.")
            }
            Self::UnknownPlatform(_) => "Select a supported platform.".into(),
            Self::UnknownMediaKind(_) => "Choose either video or audio.".into(),
            Self::Io(_) => "A temporary file operation failed. Try again.".into(),
        }
    }

    pub(crate) fn extraction(url: &str, err: &anyhow::Error) -> Self {
        Self::Extraction {
            url: url.to_string(),
            detail: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn extraction_keeps_the_whole_context_chain() {
        let err = anyhow!("HTTP 404").context("fetching page");
        let wrapped = Error::extraction("https://example.test/v", &err);
        let text = wrapped.to_string();
        assert!(text.contains("fetching page"));
        assert!(text.contains("HTTP 404"));
        assert!(text.contains("https://example.test/v"));
    }

    #[test]
    fn user_message_hides_details() {
        let err = Error::StaleFile {
            path: PathBuf::from("/tmp/secret/yt_video.mp4"),
        };
        assert!(!err.user_message().contains("/tmp/secret"));
        assert!(err.to_string().contains("/tmp/secret"));
    }
}
