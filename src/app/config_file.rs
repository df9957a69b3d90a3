//! Config file loading and merging with CLI overrides.
//!
//! Precedence, highest first: CLI flags, `FILESYNC_PASSWORD` (password
//! only), the TOML file, built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use filesync_core::SyncConfig;
use serde::Deserialize;

use crate::cli::Args;

/// Config file looked up in the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "sync_config.toml";

/// Environment variable consulted for the password.
pub(crate) const PASSWORD_ENV: &str = "FILESYNC_PASSWORD";

/// TOML-backed file configuration, one table per concern.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub server: ServerSection,
    pub local: LocalSection,
    pub download: DownloadSection,
    pub filter: FilterSection,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerSection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LocalSection {
    pub local_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub move_completed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DownloadSection {
    pub max_retries: Option<u32>,
    /// Seconds.
    pub retry_delay: Option<u64>,
    pub chunk_size: Option<usize>,
    /// Seconds, fractional allowed.
    pub progress_update_interval: Option<f64>,
    pub extension: Option<String>,
    pub connect_timeout: Option<u64>,
    pub read_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FilterSection {
    pub enabled: Option<bool>,
    pub pattern: Option<String>,
    pub case_sensitive: Option<bool>,
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub(crate) struct LoadedConfig {
    /// Path that was consulted.
    pub path: PathBuf,
    /// Parsed config, when the file exists.
    pub config: Option<FileConfig>,
}

/// Loads the config file.
///
/// An explicit `--config` path must exist; the default path is optional.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);

    if !path.exists() {
        if explicit.is_some() {
            bail!("Config file '{}' does not exist", path.display());
        }
        return Ok(LoadedConfig { path, config: None });
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    Ok(toml::from_str(raw)?)
}

/// Merges file values, the password environment variable and CLI flags into
/// a [`SyncConfig`]. The record still has to pass [`SyncConfig::validate`].
pub(crate) fn resolve_sync_config(
    file: Option<FileConfig>,
    args: &Args,
    env_password: Option<String>,
) -> Result<SyncConfig> {
    let file = file.unwrap_or_default();
    let mut config = SyncConfig::default();

    if let Some(url) = args.url.clone().or(file.server.url) {
        config.base_url = url;
    }
    if let Some(username) = args.username.clone().or(file.server.username) {
        config.username = username;
    }
    if let Some(password) = args
        .password
        .clone()
        .or(env_password.filter(|p| !p.is_empty()))
        .or(file.server.password)
    {
        config.password = password;
    }

    if let Some(dir) = args.local_dir.clone().or(file.local.local_dir) {
        config.local_dir = dir;
    }
    if let Some(dir) = args.download_dir.clone().or(file.local.download_dir) {
        config.download_dir = dir;
    }
    config.move_completed = args.move_completed || file.local.move_completed.unwrap_or(false);

    if let Some(max_retries) = args.max_retries.or(file.download.max_retries) {
        config.max_retries = max_retries;
    }
    if let Some(secs) = args.retry_delay.or(file.download.retry_delay) {
        config.retry_delay = Duration::from_secs(secs);
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = usize::try_from(chunk_size)
            .with_context(|| format!("chunk size {chunk_size} does not fit this platform"))?;
    } else if let Some(chunk_size) = file.download.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(interval) = file.download.progress_update_interval {
        if !interval.is_finite() || interval <= 0.0 {
            bail!(
                "Invalid config value for `progress_update_interval`: {interval}. Expected a positive number of seconds"
            );
        }
        let Ok(interval) = Duration::try_from_secs_f64(interval) else {
            bail!(
                "Invalid config value for `progress_update_interval`: {interval}. Value is too large"
            );
        };
        config.progress_update_interval = interval;
    }
    if let Some(secs) = file.download.connect_timeout {
        config.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.download.read_timeout {
        config.read_timeout = Duration::from_secs(secs);
    }
    config.extension = args
        .extension
        .clone()
        .or(file.download.extension)
        .filter(|ext| !ext.trim().is_empty());

    if let Some(enabled) = file.filter.enabled {
        config.filter.enabled = enabled;
    }
    if args.enable_filter {
        config.filter.enabled = true;
    }
    if args.disable_filter {
        config.filter.enabled = false;
    }
    if let Some(pattern) = args.filter.clone().or(file.filter.pattern) {
        config.filter.pattern = pattern;
    }
    config.filter.case_sensitive =
        args.case_sensitive || file.filter.case_sensitive.unwrap_or(false);

    Ok(config)
}
