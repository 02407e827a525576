#![forbid(unsafe_code)]

//! Runtime settings.
//!
//! Values are resolved in this order: explicit override (CLI) > process
//! environment > `.env` file > built-in default.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::platform::Platform;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TEMP_DIR: &str = ".tmp_downloads";
pub const DEFAULT_TTL_SECONDS: u64 = 600;
pub const DEFAULT_LOG_FILE: &str = "app.log";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_YTDLP_BIN: &str = "yt-dlp";
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
pub const DEFAULT_SESSION_IDLE_SECONDS: u64 = 1800;

/// Cookie file shared by every platform without a dedicated one.
const SHARED_COOKIES_KEY: &str = "COOKIES_FILE";

#[derive(Debug, Clone)]
pub struct Settings {
    pub temp_dir: PathBuf,
    pub ttl: Duration,
    pub cookie_files: HashMap<Platform, PathBuf>,
    pub log_file: PathBuf,
    pub host: String,
    pub port: u16,
    pub ytdlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub verbose_errors: bool,
    pub session_idle: Duration,
}

impl Settings {
    pub fn cookie_file(&self, platform: Platform) -> Option<&Path> {
        self.cookie_files.get(&platform).map(PathBuf::as_path)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        build_settings(&HashMap::new(), |_| None, SettingsOverrides::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub temp_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let seconds = |key: &str, default: u64| {
        lookup(key)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(default)
    };

    let shared_cookies = lookup(SHARED_COOKIES_KEY);
    let cookie_files = Platform::ALL
        .into_iter()
        .filter_map(|platform| {
            lookup(platform.cookie_key())
                .or_else(|| shared_cookies.clone())
                .map(|path| (platform, PathBuf::from(path)))
        })
        .collect();

    Settings {
        temp_dir: overrides
            .temp_dir
            .or_else(|| lookup("TEMP_DOWNLOAD_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR)),
        ttl: Duration::from_secs(seconds("TEMP_TTL_SECONDS", DEFAULT_TTL_SECONDS)),
        cookie_files,
        log_file: lookup("APP_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        host: overrides
            .host
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| lookup("REELS_HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: overrides
            .port
            .or_else(|| lookup("REELS_PORT").and_then(|value| value.parse::<u16>().ok()))
            .unwrap_or(DEFAULT_PORT),
        ytdlp_bin: lookup("YTDLP_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_BIN)),
        ffmpeg_bin: lookup("FFMPEG_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BIN)),
        verbose_errors: lookup("VERBOSE_ERRORS")
            .map(|value| parse_flag(&value))
            .unwrap_or(false),
        session_idle: Duration::from_secs(seconds(
            "SESSION_IDLE_SECONDS",
            DEFAULT_SESSION_IDLE_SECONDS,
        )),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Parses a dotenv-style file. A missing file is not an error.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, raw_value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = raw_value.trim();
    let value = ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value);
    Some((key.to_string(), value.to_string()))
}
