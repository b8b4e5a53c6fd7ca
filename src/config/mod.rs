//! Configuration management for bookfleet
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. The coordinator and worker sections are validated by their own
//! types; this module only stitches them together with the logging section.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::coordinator::CoordinatorConfig;
use crate::worker::WorkerConfig;

/// Configuration errors
///
/// Every variant is fatal at startup: the process exits before entering a loop.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Missing file for '{field}': {}", .path.display())]
    MissingFile { field: String, path: PathBuf },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator configuration
    pub coordinator: CoordinatorConfig,

    /// Worker configuration
    pub worker: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid(
                "logging.format",
                format!("expected text or json, got {other}"),
            )),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load configuration from `BOOKFLEET_*` environment variables
    ///
    /// A variable that is set but does not parse is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let level = std::env::var("BOOKFLEET_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let format = env_or("BOOKFLEET_LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            coordinator: CoordinatorConfig::from_env()?,
            worker: WorkerConfig::from_env()?,
            logging: LoggingConfig { level, format },
        })
    }

    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;
        self.worker.validate()?;

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("unknown level {}", self.logging.level),
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable, falling back to `default` when unset
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(env_opt(key)?.unwrap_or(default))
}

/// Parse an optional environment variable
pub(crate) fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("cannot parse {value:?}"))),
        Err(_) => Ok(None),
    }
}
