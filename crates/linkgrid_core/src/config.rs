//! Core configuration.
//!
//! # Responsibility
//! - Describe logging and commit policy settings in one serde model.
//! - Load and validate configuration from JSON text or files.
//!
//! # Invariants
//! - Missing fields fall back to defaults; unknown fields are rejected.
//! - A validated config always carries a supported log level.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// How commits are dispatched and what happens after a failed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitPolicy {
    /// Upper bound on simultaneous backend calls. `None` dispatches all at once.
    pub max_in_flight: Option<usize>,
    /// Refetch after a failed commit and rebase the working copy onto the
    /// confirmed backend state instead of leaving `initial` stale.
    pub rebase_after_failure: bool,
}

/// Top-level configuration for embedders and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub commit: CommitPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            commit: CommitPolicy::default(),
        }
    }
}

/// Errors from configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl CoreConfig {
    /// Parses and validates configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: CoreConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks field constraints and normalizes `log_level` in place.
    ///
    /// # Errors
    /// - Unsupported `log_level`.
    /// - Relative `log_dir`.
    /// - `commit.max_in_flight` of zero.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.log_level = normalize_level(&self.log_level)
            .map_err(ConfigError::Invalid)?
            .to_string();

        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }

        if self.commit.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid(
                "commit.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
