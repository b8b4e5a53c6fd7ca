//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::book::ExtractionBounds;
use crate::config::{env_opt, env_or, ConfigError};
use crate::utils::COORDINATOR_LIFETIME;

const DEFAULT_BIND_ADDRESS: ([u8; 4], u16) = ([0, 0, 0, 0], 4107);

/// Configuration for the coordinator server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Master book file
    pub book_path: PathBuf,

    /// Directory holding one contribution counter per worker
    pub stats_dir: PathBuf,

    /// Queue dump written after every prioritization
    pub recovery_path: PathBuf,

    /// Batch controller state saved at shutdown
    pub snapshot_path: PathBuf,

    /// Prometheus text file refreshed on every persist (optional)
    pub metrics_path: Option<PathBuf>,

    /// Queue size kept available through re-extraction
    pub max_variations: usize,

    /// Initial start count
    pub start_count: usize,

    /// Ply and score window for extraction
    pub bounds: ExtractionBounds,

    /// Height worker deltas are pruned to before merging (book default if unset)
    pub min_prune_ply: Option<usize>,

    /// Wall-clock lifetime in seconds
    pub lifetime_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(DEFAULT_BIND_ADDRESS),
            book_path: PathBuf::from("data/master.book"),
            stats_dir: PathBuf::from("data/stats"),
            recovery_path: PathBuf::from("data/variations.txt"),
            snapshot_path: PathBuf::from("data/controller.json"),
            metrics_path: None,
            max_variations: 1000,
            start_count: 5,
            bounds: ExtractionBounds::default(),
            min_prune_ply: None,
            lifetime_secs: COORDINATOR_LIFETIME.as_secs(),
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config builder
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Load from `BOOKFLEET_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_address: env_or("BOOKFLEET_BIND", defaults.bind_address)?,
            book_path: env_or("BOOKFLEET_BOOK", defaults.book_path)?,
            stats_dir: env_or("BOOKFLEET_STATS_DIR", defaults.stats_dir)?,
            recovery_path: env_or("BOOKFLEET_RECOVERY_PATH", defaults.recovery_path)?,
            snapshot_path: env_or("BOOKFLEET_SNAPSHOT_PATH", defaults.snapshot_path)?,
            metrics_path: env_opt("BOOKFLEET_METRICS_PATH")?,
            max_variations: env_or("BOOKFLEET_MAX_VARIATIONS", defaults.max_variations)?,
            start_count: env_or("BOOKFLEET_START_COUNT", defaults.start_count)?,
            bounds: ExtractionBounds {
                min_ply: env_or("BOOKFLEET_MIN_PLY", defaults.bounds.min_ply)?,
                max_ply: env_or("BOOKFLEET_MAX_PLY", defaults.bounds.max_ply)?,
                max_delta: env_or("BOOKFLEET_MAX_DELTA", defaults.bounds.max_delta)?,
            },
            min_prune_ply: env_opt("BOOKFLEET_MIN_PRUNE_PLY")?,
            lifetime_secs: env_or("BOOKFLEET_COORDINATOR_LIFETIME", defaults.lifetime_secs)?,
        })
    }

    /// Lifetime cap as a duration
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.port() == 0 && !self.bind_address.ip().is_loopback() {
            return Err(ConfigError::invalid(
                "bind_address",
                "Port 0 is only allowed on loopback",
            ));
        }

        if self.start_count == 0 {
            return Err(ConfigError::invalid("start_count", "Must be at least 1"));
        }

        if self.max_variations == 0 {
            return Err(ConfigError::invalid("max_variations", "Must be at least 1"));
        }

        if self.bounds.min_ply > self.bounds.max_ply {
            return Err(ConfigError::invalid(
                "bounds",
                format!(
                    "min_ply {} exceeds max_ply {}",
                    self.bounds.min_ply, self.bounds.max_ply
                ),
            ));
        }

        if self.bounds.max_delta < 0 {
            return Err(ConfigError::invalid("bounds.max_delta", "Must not be negative"));
        }

        if self.lifetime_secs == 0 {
            return Err(ConfigError::invalid("lifetime_secs", "Must be positive"));
        }

        Ok(())
    }
}

/// Builder for CoordinatorConfig
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.config.bind_address = addr
            .parse()
            .map_err(|_| ConfigError::invalid("bind_address", format!("Invalid address: {addr}")))?;
        Ok(self)
    }

    /// Set master book path
    pub fn book_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.book_path = path.into();
        self
    }

    /// Set stats directory
    pub fn stats_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stats_dir = path.into();
        self
    }

    /// Set recovery dump path
    pub fn recovery_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.recovery_path = path.into();
        self
    }

    /// Set controller snapshot path
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    /// Set metrics text file path
    pub fn metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.metrics_path = Some(path.into());
        self
    }

    /// Place every state file under `dir` using the default file names
    pub fn data_dir(self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.book_path(dir.join("master.book"))
            .stats_dir(dir.join("stats"))
            .recovery_path(dir.join("variations.txt"))
            .snapshot_path(dir.join("controller.json"))
    }

    /// Set minimum queue size
    pub fn max_variations(mut self, max: usize) -> Self {
        self.config.max_variations = max;
        self
    }

    /// Set initial start count
    pub fn start_count(mut self, count: usize) -> Self {
        self.config.start_count = count;
        self
    }

    /// Set extraction bounds
    pub fn bounds(mut self, bounds: ExtractionBounds) -> Self {
        self.config.bounds = bounds;
        self
    }

    /// Set the height worker deltas are pruned to
    pub fn min_prune_ply(mut self, ply: usize) -> Self {
        self.config.min_prune_ply = Some(ply);
        self
    }

    /// Set lifetime cap
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.config.lifetime_secs = lifetime.as_secs();
        self
    }

    /// Build the config
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.start_count, 5);
        assert_eq!(config.lifetime(), Duration::from_secs(4 * 24 * 3600));
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::builder()
            .data_dir("/srv/book")
            .start_count(9)
            .max_variations(400)
            .min_prune_ply(4)
            .build()
            .unwrap();

        assert_eq!(config.book_path, PathBuf::from("/srv/book/master.book"));
        assert_eq!(config.recovery_path, PathBuf::from("/srv/book/variations.txt"));
        assert_eq!(config.start_count, 9);
        assert_eq!(config.max_variations, 400);
        assert_eq!(config.min_prune_ply, Some(4));
    }

    #[test]
    fn test_config_validation_fails() {
        assert!(CoordinatorConfig::builder().start_count(0).build().is_err());

        let inverted = ExtractionBounds {
            min_ply: 20,
            max_ply: 10,
            max_delta: 2,
        };
        assert!(CoordinatorConfig::builder().bounds(inverted).build().is_err());
    }

    #[test]
    fn test_config_builder_with_address() {
        let config = CoordinatorConfig::builder()
            .bind_address_str("127.0.0.1:9000")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.bind_address.port(), 9000);
        assert!(CoordinatorConfig::builder().bind_address_str("nowhere").is_err());
    }
}
