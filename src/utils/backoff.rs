//! Randomized reconnect delays
//!
//! Workers that fail an exchange sleep for a uniformly random delay before
//! reconnecting, so a fleet that lost the coordinator at the same moment
//! does not come back in lockstep.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

/// Configuration for reconnect delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Shortest delay (inclusive)
    pub min_delay: Duration,

    /// Longest delay (exclusive)
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl BackoffConfig {
    /// Create a configuration with custom bounds in seconds
    pub fn with_secs(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_delay: Duration::from_secs(min_secs),
            max_delay: Duration::from_secs(max_secs),
        }
    }
}

/// Source of reconnect delays
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    rng: StdRng,
    failures: u64,
}

impl Backoff {
    /// Create a backoff seeded from system entropy
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a deterministic backoff (tests, reproducible runs)
    pub fn seeded(config: BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng,
            failures: 0,
        }
    }

    /// Delay to sleep after the next failure, in `[min_delay, max_delay)`
    pub fn next_delay(&mut self) -> Duration {
        self.failures += 1;
        let BackoffConfig {
            min_delay,
            max_delay,
        } = self.config;

        let delay = if max_delay <= min_delay {
            min_delay
        } else {
            let millis = self
                .rng
                .gen_range(min_delay.as_millis() as u64..max_delay.as_millis() as u64);
            Duration::from_millis(millis)
        };

        debug!(
            failures = self.failures,
            delay_ms = delay.as_millis(),
            "Computed reconnect delay"
        );
        delay
    }

    /// Failures seen since creation or the last reset
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Forget the failure streak after a successful exchange
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
