#![forbid(unsafe_code)]

//! Progress plumbing between the extraction engine and whoever is watching a
//! preparation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi regex"));

/// One progress dictionary as reported by the engine. Every field is optional
/// because engines fill in different subsets depending on the protocol.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProgress {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "_percent")]
    pub percent: Option<f64>,
    #[serde(default, rename = "_percent_str")]
    pub percent_str: Option<String>,
    #[serde(default)]
    pub downloaded_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<f64>,
}

impl RawProgress {
    pub fn finished() -> Self {
        Self {
            status: Some("finished".into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Downloading,
    /// Downloading, but the engine gave nothing numeric to show.
    InProgress,
    Finished,
}

/// What the lifecycle manager hands to a [`ProgressSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_downloaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
}

impl ProgressEvent {
    /// Normalizes an engine event. Returns `None` for statuses nobody should
    /// see (e.g. engine errors, which surface through the download result).
    pub fn from_raw(raw: &RawProgress) -> Option<Self> {
        let bytes_downloaded = raw.downloaded_bytes.and_then(non_negative_bytes);
        let bytes_total = raw
            .total_bytes
            .or(raw.total_bytes_estimate)
            .and_then(non_negative_bytes);

        match raw.status.as_deref().unwrap_or("downloading") {
            "finished" => Some(Self {
                phase: ProgressPhase::Finished,
                percent: Some(100.0),
                bytes_downloaded,
                bytes_total,
            }),
            "downloading" => {
                let percent = raw
                    .percent
                    .filter(|value| value.is_finite())
                    .or_else(|| raw.percent_str.as_deref().and_then(parse_leading_percent))
                    .or_else(|| match (bytes_downloaded, bytes_total) {
                        (Some(done), Some(total)) if total > 0 => {
                            Some(done as f64 * 100.0 / total as f64)
                        }
                        _ => None,
                    })
                    .map(|value| value.clamp(0.0, 100.0));
                let phase = if percent.is_some() {
                    ProgressPhase::Downloading
                } else {
                    ProgressPhase::InProgress
                };
                Some(Self {
                    phase,
                    percent,
                    bytes_downloaded,
                    bytes_total,
                })
            }
            _ => None,
        }
    }

    /// Human-readable status line, e.g. `Video download: 53.2% (5.32MiB / 10.00MiB)`.
    pub fn label(&self, kind: MediaKind) -> String {
        match (self.phase, self.percent) {
            (ProgressPhase::Finished, _) => "Download complete. Finalizing file...".into(),
            (_, Some(percent)) => {
                let downloaded = self.bytes_downloaded.map(format_bytes);
                let total = self.bytes_total.map(format_bytes);
                match (downloaded, total) {
                    (Some(done), Some(total)) => format!(
                        "{} download: {percent:.1}% ({done} / {total})",
                        kind.title_case()
                    ),
                    _ => format!("{} download: {percent:.1}%", kind.title_case()),
                }
            }
            (_, None) => format!("Downloading {kind}..."),
        }
    }
}

fn non_negative_bytes(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

/// Extracts the number at the start of a pre-formatted percentage such as
/// `"  53.2% of 10.00MiB"`. Terminal colour codes are ignored.
pub fn parse_leading_percent(raw: &str) -> Option<f64> {
    let cleaned = ANSI_RE.replace_all(raw, "");
    let trimmed = cleaned.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let number = trimmed[..end].trim_end_matches('.');
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok()
}

/// Renders a byte count with binary units: `512B`, `1.50KiB`, `10.00MiB`.
pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if value < 1024 {
        return format!("{value}B");
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2}{}", UNITS[unit])
}

/// Receives progress events synchronously, from inside the blocking download.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_percent_from_formatted_string() {
        assert_eq!(parse_leading_percent("  53.2% of 10.00MiB"), Some(53.2));
        assert_eq!(parse_leading_percent("100%"), Some(100.0));
        assert_eq!(parse_leading_percent("\u{1b}[0;94m  7.5%\u{1b}[0m"), Some(7.5));
    }

    #[test]
    fn unparseable_percent_string_yields_none() {
        assert_eq!(parse_leading_percent("  N/A%"), None);
        assert_eq!(parse_leading_percent(""), None);
        assert_eq!(parse_leading_percent(". %"), None);
    }

    #[test]
    fn percent_string_used_when_numeric_missing() {
        let raw = RawProgress {
            status: Some("downloading".into()),
            percent_str: Some("  53.2% of 10.00MiB".into()),
            ..RawProgress::default()
        };
        let event = ProgressEvent::from_raw(&raw).unwrap();
        assert_eq!(event.phase, ProgressPhase::Downloading);
        assert_eq!(event.percent, Some(53.2));
    }

    #[test]
    fn numeric_percent_wins_over_string() {
        let raw = RawProgress {
            status: Some("downloading".into()),
            percent: Some(12.0),
            percent_str: Some("99%".into()),
            ..RawProgress::default()
        };
        assert_eq!(ProgressEvent::from_raw(&raw).unwrap().percent, Some(12.0));
    }

    #[test]
    fn byte_ratio_is_last_resort() {
        let raw = RawProgress {
            status: Some("downloading".into()),
            downloaded_bytes: Some(256.0),
            total_bytes_estimate: Some(1024.0),
            ..RawProgress::default()
        };
        let event = ProgressEvent::from_raw(&raw).unwrap();
        assert_eq!(event.percent, Some(25.0));
        assert_eq!(event.bytes_downloaded, Some(256));
        assert_eq!(event.bytes_total, Some(1024));
    }

    #[test]
    fn no_number_means_generic_in_progress() {
        let raw = RawProgress {
            status: Some("downloading".into()),
            percent_str: Some("Unknown".into()),
            downloaded_bytes: Some(10.0),
            ..RawProgress::default()
        };
        let event = ProgressEvent::from_raw(&raw).unwrap();
        assert_eq!(event.phase, ProgressPhase::InProgress);
        assert_eq!(event.percent, None);
        assert_eq!(event.label(MediaKind::Audio), "Downloading audio...");
    }

    #[test]
    fn finished_and_error_statuses() {
        let finished = ProgressEvent::from_raw(&RawProgress::finished()).unwrap();
        assert_eq!(finished.phase, ProgressPhase::Finished);
        assert_eq!(finished.percent, Some(100.0));

        let error = RawProgress {
            status: Some("error".into()),
            ..RawProgress::default()
        };
        assert!(ProgressEvent::from_raw(&error).is_none());
    }

    #[test]
    fn percent_is_clamped() {
        let raw = RawProgress {
            percent: Some(140.0),
            ..RawProgress::default()
        };
        assert_eq!(ProgressEvent::from_raw(&raw).unwrap().percent, Some(100.0));
    }

    #[test]
    fn labels_include_sizes_when_known() {
        let event = ProgressEvent {
            phase: ProgressPhase::Downloading,
            percent: Some(53.2),
            bytes_downloaded: Some(5 * 1024 * 1024),
            bytes_total: Some(10 * 1024 * 1024),
        };
        assert_eq!(
            event.label(MediaKind::Video),
            "Video download: 53.2% (5.00MiB / 10.00MiB)"
        );
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.50KiB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.00MiB");
    }

    #[test]
    fn raw_progress_reads_engine_field_names() {
        let raw: RawProgress = serde_json::from_str(
            r#"{"status":"downloading","_percent":41.5,"_percent_str":" 41.5%","downloaded_bytes":415,"total_bytes":1000,"eta":3}"#,
        )
        .unwrap();
        assert_eq!(raw.percent, Some(41.5));
        assert_eq!(raw.percent_str.as_deref(), Some(" 41.5%"));
        assert_eq!(raw.total_bytes, Some(1000.0));
    }

    #[test]
    fn closures_act_as_sinks() {
        let mut seen = Vec::new();
        {
            let mut collect = |event: ProgressEvent| seen.push(event.phase);
            let sink: &mut dyn ProgressSink = &mut collect;
            sink.emit(ProgressEvent::from_raw(&RawProgress::finished()).unwrap());
        }
        assert_eq!(seen, vec![ProgressPhase::Finished]);
    }
}
