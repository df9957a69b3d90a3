//! Filename filtering for the sync plan.
//!
//! Filtering is opt-in in a strict sense: when the filter is disabled, no
//! file matches and nothing is downloaded.

use regex::{Regex, RegexBuilder};

use crate::config::{ConfigError, FilterConfig};

/// Predicate deciding whether a remote filename participates in a sync.
pub trait FileFilter: Send + Sync {
    /// Returns true if `filename` should be downloaded.
    fn matches(&self, filename: &str) -> bool;

    /// Returns true when the filter can match anything at all.
    fn is_enabled(&self) -> bool;
}

/// Regex-backed filter built from [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct RegexFilter {
    regex: Option<Regex>,
    pattern: String,
    case_sensitive: bool,
}

impl RegexFilter {
    /// Builds the filter. A disabled config yields a filter matching nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the filter is enabled and the
    /// pattern does not compile.
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        let regex = if config.enabled {
            let compiled = RegexBuilder::new(&config.pattern)
                .case_insensitive(!config.case_sensitive)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: config.pattern.clone(),
                    source,
                })?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self {
            regex,
            pattern: config.pattern.clone(),
            case_sensitive: config.case_sensitive,
        })
    }

    /// Human-readable description for logs and summaries.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.regex.is_none() {
            return "disabled".to_string();
        }
        let sensitivity = if self.case_sensitive {
            "case-sensitive"
        } else {
            "case-insensitive"
        };
        format!("'{}' ({sensitivity})", self.pattern)
    }
}

impl FileFilter for RegexFilter {
    fn matches(&self, filename: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(filename))
    }

    fn is_enabled(&self) -> bool {
        self.regex.is_some()
    }
}

/// Case-insensitive extension check; `None` accepts every name.
#[must_use]
pub fn matches_extension(filename: &str, extension: Option<&str>) -> bool {
    match extension.map(str::trim).filter(|ext| !ext.is_empty()) {
        None => true,
        Some(ext) => filename
            .to_ascii_lowercase()
            .ends_with(&ext.to_ascii_lowercase()),
    }
}
