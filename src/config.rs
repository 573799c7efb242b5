//! Configuration.
//!
//! Values come from an optional JSON settings file, then from environment
//! variables, then from built-in defaults. A value present in the settings
//! file wins over the environment, which only supplies defaults.
//!
//! Environment variables:
//! - `TASKWATCH_CONFIG` - path to the JSON settings file
//! - `TASKWATCH_API_URL` - base URL of the task services
//! - `TASKWATCH_API_TOKEN` - bearer token sent with every request
//! - `TASKWATCH_USER_ID` - user id attached to follow-up instructions
//! - `TASKWATCH_POLL_INTERVAL_MS`, `TASKWATCH_RATE_LIMIT_MS`,
//!   `TASKWATCH_DEDUP_WINDOW_MS`, `TASKWATCH_REQUEST_TIMEOUT_SECS`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(2000);
pub const DEFAULT_DEDUP_WINDOW: Duration = crate::dedup::DEFAULT_DEDUP_WINDOW;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid API URL {value:?}: {source}")]
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },

    #[error("Invalid value {value:?} for {key}: expected a positive integer")]
    InvalidNumber { key: &'static str, value: String },
}

/// Timing of one watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Identical snapshots arriving within this window are discarded.
    pub rate_limit_window: Duration,
    /// Trailing window of the deduplicator's content guard.
    pub dedup_window: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// Settings file contents. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_url: Option<String>,
    api_token: Option<String>,
    user_id: Option<String>,
    poll_interval_ms: Option<u64>,
    rate_limit_ms: Option<u64>,
    dedup_window_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub api_token: Option<String>,
    pub user_id: Option<String>,
    pub poll_interval: Duration,
    pub rate_limit_window: Duration,
    pub dedup_window: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Load from `TASKWATCH_CONFIG` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("TASKWATCH_CONFIG").ok().map(PathBuf::from);
        Self::load(path.as_deref())
    }

    /// Load from an optional settings file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => {
                let config = read_file(path)?;
                tracing::info!("Loaded settings from {}", path.display());
                config
            }
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let raw_url = file
            .api_url
            .or_else(|| non_empty("TASKWATCH_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            value: raw_url.clone(),
            source,
        })?;

        let millis = |from_file: Option<u64>, key: &'static str, default: Duration| {
            duration_setting(from_file, non_empty(key), key, default, Duration::from_millis)
        };

        Ok(Self {
            api_url,
            api_token: file.api_token.or_else(|| non_empty("TASKWATCH_API_TOKEN")),
            user_id: file.user_id.or_else(|| non_empty("TASKWATCH_USER_ID")),
            poll_interval: millis(
                file.poll_interval_ms,
                "TASKWATCH_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL,
            )?,
            rate_limit_window: millis(
                file.rate_limit_ms,
                "TASKWATCH_RATE_LIMIT_MS",
                DEFAULT_RATE_LIMIT_WINDOW,
            )?,
            dedup_window: millis(
                file.dedup_window_ms,
                "TASKWATCH_DEDUP_WINDOW_MS",
                DEFAULT_DEDUP_WINDOW,
            )?,
            request_timeout: duration_setting(
                file.request_timeout_secs,
                non_empty("TASKWATCH_REQUEST_TIMEOUT_SECS"),
                "TASKWATCH_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT,
                Duration::from_secs,
            )?,
        })
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: self.poll_interval,
            rate_limit_window: self.rate_limit_window,
            dedup_window: self.dedup_window,
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn duration_setting(
    from_file: Option<u64>,
    from_env: Option<String>,
    key: &'static str,
    default: Duration,
    unit: fn(u64) -> Duration,
) -> Result<Duration, ConfigError> {
    let value = match (from_file, from_env) {
        (Some(v), _) => v,
        (None, Some(raw)) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber {
                key,
                value: raw.clone(),
            })?,
        (None, None) => return Ok(default),
    };
    if value == 0 {
        return Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        });
    }
    Ok(unit(value))
}
