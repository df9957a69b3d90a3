//! Resolved configuration record consumed by the sync core.
//!
//! The core never reads files or parses arguments itself. The binary merges
//! the config file with CLI overrides and hands over a [`SyncConfig`], which
//! must pass [`SyncConfig::validate`] before any request is made.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::download::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
    READ_TIMEOUT_SECS,
};

/// Default directory holding files that are already synchronized.
pub const DEFAULT_LOCAL_DIR: &str = "current_files";

/// Default directory receiving new and partial downloads.
pub const DEFAULT_DOWNLOAD_DIR: &str = "new_downloads";

/// Default filter pattern (matches everything once filtering is enabled).
pub const DEFAULT_FILTER_PATTERN: &str = ".*";

/// Default progress refresh / rate window in seconds.
pub const DEFAULT_PROGRESS_INTERVAL_SECS: f64 = 1.0;

/// Largest accepted chunk size (16 MiB).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised for an unusable configuration record.
///
/// These are fatal at startup: no transfer is attempted with an invalid
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Server URL is empty or could not be parsed.
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Username or password is missing.
    #[error("missing server credential: {field}")]
    MissingCredential {
        /// Which credential is missing (`username` or `password`).
        field: &'static str,
    },

    /// A numeric setting is outside its accepted range.
    #[error("invalid value for `{field}`: {value} (expected {expected})")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Rejected value, rendered.
        value: String,
        /// Accepted range, rendered.
        expected: &'static str,
    },

    /// The filter pattern is not a valid regular expression.
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern text.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Regex filter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// When false, no file participates in the sync.
    pub enabled: bool,
    /// Regular expression searched within each filename.
    pub pattern: String,
    /// Match case-sensitively.
    pub case_sensitive: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pattern: DEFAULT_FILTER_PATTERN.to_string(),
            case_sensitive: false,
        }
    }
}

/// Fully resolved settings for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory listing URL. Filenames are resolved relative to it.
    pub base_url: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Directory of already synchronized files.
    pub local_dir: PathBuf,
    /// Directory receiving partial and new downloads.
    pub download_dir: PathBuf,
    /// Bytes per write unit in the transfer loop.
    pub chunk_size: usize,
    /// Maximum attempts per file, including the first.
    pub max_retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Progress refresh interval and rate window.
    pub progress_update_interval: Duration,
    /// Filename filter settings.
    pub filter: FilterConfig,
    /// Optional extension pre-filter such as `.laz`.
    pub extension: Option<String>,
    /// Move completed files from `download_dir` into `local_dir`.
    pub move_completed: bool,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout (per read).
    pub read_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            local_dir: PathBuf::from(DEFAULT_LOCAL_DIR),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            progress_update_interval: Duration::from_secs_f64(DEFAULT_PROGRESS_INTERVAL_SECS),
            filter: FilterConfig::default(),
            extension: None,
            move_completed: false,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

impl SyncConfig {
    /// Validates the record and returns the parsed base URL.
    ///
    /// The returned URL always ends with `/` so that listing hrefs join as
    /// children of the directory rather than siblings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing/unparseable URL, missing
    /// credentials, out-of-range numeric settings, or an invalid pattern.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let base_url = parse_base_url(&self.base_url)?;

        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingCredential { field: "username" });
        }
        if self.password.trim().is_empty() {
            return Err(ConfigError::MissingCredential { field: "password" });
        }

        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::OutOfRange {
                field: "chunk_size",
                value: self.chunk_size.to_string(),
                expected: "1..=16777216",
            });
        }
        if !(1..=100).contains(&self.max_retries) {
            return Err(ConfigError::OutOfRange {
                field: "max_retries",
                value: self.max_retries.to_string(),
                expected: "1..=100",
            });
        }
        if self.progress_update_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "progress_update_interval",
                value: "0".to_string(),
                expected: "> 0 seconds",
            });
        }
        if self.read_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "timeout",
                value: "0".to_string(),
                expected: "> 0 seconds",
            });
        }

        if self.filter.enabled {
            regex::RegexBuilder::new(&self.filter.pattern)
                .case_insensitive(!self.filter.case_sensitive)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: self.filter.pattern.clone(),
                    source,
                })?;
        }

        Ok(base_url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "server URL is not configured".to_string(),
        });
    }

    let mut url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
