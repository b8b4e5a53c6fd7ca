//! Worker configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{env_or, ConfigError};
use crate::utils::{default_worker_id, BackoffConfig, WORKER_LIFETIME};

/// Default time box for analyzing one batch: twelve hours
pub const DEFAULT_ANALYSIS_BUDGET: Duration = Duration::from_secs(12 * 3600);

/// Command set a worker speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// `fetch` / `sync`
    V1,
    /// `fetch2` / `sync2`
    V2,
    /// `fetch2` / `sync3`
    #[default]
    V3,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        })
    }
}

impl FromStr for ProtocolVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_start_matches('v') {
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            "3" => Ok(Self::V3),
            _ => Err(ConfigError::invalid(
                "protocol",
                format!("expected v1, v2 or v3, got {s}"),
            )),
        }
    }
}

/// Configuration for a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Coordinator `host:port`
    pub coordinator_address: String,

    /// Identity announced on every command line
    pub worker_id: String,

    /// Local book file
    pub book_path: PathBuf,

    /// Command set to speak
    pub protocol: ProtocolVersion,

    /// Wall-clock lifetime in seconds
    pub lifetime_secs: u64,

    /// Time box for analyzing one batch, in seconds
    pub analysis_budget_secs: u64,

    /// Shortest pause after a failed exchange, in seconds
    pub backoff_min_secs: u64,

    /// Longest pause after a failed exchange, in seconds
    pub backoff_max_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            coordinator_address: String::from("127.0.0.1:4107"),
            worker_id: default_worker_id(),
            book_path: PathBuf::from("data/local.book"),
            protocol: ProtocolVersion::default(),
            lifetime_secs: WORKER_LIFETIME.as_secs(),
            analysis_budget_secs: DEFAULT_ANALYSIS_BUDGET.as_secs(),
            backoff_min_secs: backoff.min_delay.as_secs(),
            backoff_max_secs: backoff.max_delay.as_secs(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Load from `BOOKFLEET_*` environment variables
    ///
    /// The worker id falls back to `$HOSTNAME`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            coordinator_address: std::env::var("BOOKFLEET_COORDINATOR")
                .unwrap_or(defaults.coordinator_address),
            worker_id: std::env::var("BOOKFLEET_WORKER_ID").unwrap_or(defaults.worker_id),
            book_path: env_or("BOOKFLEET_LOCAL_BOOK", defaults.book_path)?,
            protocol: env_or("BOOKFLEET_PROTOCOL", defaults.protocol)?,
            lifetime_secs: env_or("BOOKFLEET_WORKER_LIFETIME", defaults.lifetime_secs)?,
            analysis_budget_secs: env_or("BOOKFLEET_ANALYSIS_BUDGET", defaults.analysis_budget_secs)?,
            backoff_min_secs: env_or("BOOKFLEET_BACKOFF_MIN", defaults.backoff_min_secs)?,
            backoff_max_secs: env_or("BOOKFLEET_BACKOFF_MAX", defaults.backoff_max_secs)?,
        })
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    #[must_use]
    pub fn analysis_budget(&self) -> Duration {
        Duration::from_secs(self.analysis_budget_secs)
    }

    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::with_secs(self.backoff_min_secs, self.backoff_max_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let port = self
            .coordinator_address
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .and_then(|(_, port)| port.parse::<u16>().ok());
        if !matches!(port, Some(p) if p > 0) {
            return Err(ConfigError::invalid(
                "coordinator_address",
                format!("expected host:port, got {:?}", self.coordinator_address),
            ));
        }

        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "worker_id".to_string(),
            });
        }

        if self.backoff_min_secs == 0 || self.backoff_min_secs >= self.backoff_max_secs {
            return Err(ConfigError::invalid(
                "backoff_min_secs",
                "Must be positive and below backoff_max_secs",
            ));
        }

        if self.lifetime_secs == 0 || self.analysis_budget_secs == 0 {
            return Err(ConfigError::invalid(
                "lifetime_secs",
                "Lifetime and analysis budget must be positive",
            ));
        }

        Ok(())
    }
}

/// Builder for WorkerConfig
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set coordinator address
    pub fn coordinator_address(mut self, addr: impl Into<String>) -> Self {
        self.config.coordinator_address = addr.into();
        self
    }

    /// Set worker identity
    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.config.worker_id = id.into();
        self
    }

    /// Set local book path
    pub fn book_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.book_path = path.into();
        self
    }

    /// Set protocol version
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set lifetime cap
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.config.lifetime_secs = lifetime.as_secs();
        self
    }

    /// Set analysis time box
    pub fn analysis_budget(mut self, budget: Duration) -> Self {
        self.config.analysis_budget_secs = budget.as_secs();
        self
    }

    /// Set backoff bounds in seconds
    pub fn backoff_secs(mut self, min: u64, max: u64) -> Self {
        self.config.backoff_min_secs = min;
        self.config.backoff_max_secs = max;
        self
    }

    /// Build the config
    pub fn build(self) -> Result<WorkerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol, ProtocolVersion::V3);
        assert_eq!(config.lifetime(), Duration::from_secs(24 * 3600));
        assert_eq!(config.analysis_budget(), Duration::from_secs(12 * 3600));
        assert_eq!(config.backoff().min_delay, Duration::from_secs(5));
        assert_eq!(config.backoff().max_delay, Duration::from_secs(20));
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("v1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V1);
        assert_eq!("2".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V2);
        assert_eq!("V3".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V3);
        assert!("v4".parse::<ProtocolVersion>().is_err());
        assert_eq!(ProtocolVersion::V2.to_string(), "v2");
    }

    #[test]
    fn test_invalid_addresses() {
        for addr in ["nowhere", ":4107", "host:0", "host:99999"] {
            let result = WorkerConfig::builder().coordinator_address(addr).build();
            assert!(result.is_err(), "{addr} should be rejected");
        }
        assert!(WorkerConfig::builder()
            .coordinator_address("book.example.org:4107")
            .build()
            .is_ok());
    }

    #[test]
    fn test_backoff_bounds_checked() {
        assert!(WorkerConfig::builder().backoff_secs(20, 5).build().is_err());
        assert!(WorkerConfig::builder().backoff_secs(0, 5).build().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("BOOKFLEET_WORKER_ID", "rack-4");
        std::env::set_var("BOOKFLEET_PROTOCOL", "v1");
        std::env::set_var("BOOKFLEET_BACKOFF_MAX", "30");
        let config = WorkerConfig::from_env();
        std::env::remove_var("BOOKFLEET_WORKER_ID");
        std::env::remove_var("BOOKFLEET_PROTOCOL");
        std::env::remove_var("BOOKFLEET_BACKOFF_MAX");

        let config = config.unwrap();
        assert_eq!(config.worker_id, "rack-4");
        assert_eq!(config.protocol, ProtocolVersion::V1);
        assert_eq!(config.backoff_max_secs, 30);
    }

    #[test]
    #[serial]
    fn test_mistyped_env_value_rejected() {
        std::env::set_var("BOOKFLEET_BACKOFF_MAX", "30s");
        let result = WorkerConfig::from_env();
        std::env::remove_var("BOOKFLEET_BACKOFF_MAX");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "BOOKFLEET_BACKOFF_MAX"
        ));
    }
}
