//! Wall-clock lifetime caps
//!
//! Both roles exit on their own after a fixed run time so a fresh binary
//! can be deployed underneath them. The clock is tokio's, so tests can
//! pause and advance it.

use std::time::Duration;
use tokio::time::Instant;

/// Coordinator lifetime: four days
pub const COORDINATOR_LIFETIME: Duration = Duration::from_secs(4 * 24 * 3600);

/// Worker lifetime: one day
pub const WORKER_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// Tracks elapsed time against a cap
#[derive(Debug, Clone, Copy)]
pub struct Lifetime {
    started: Instant,
    offset: Duration,
    cap: Duration,
}

impl Lifetime {
    /// Start counting now
    pub fn new(cap: Duration) -> Self {
        Self::with_elapsed(cap, Duration::ZERO)
    }

    /// Start counting with `elapsed` already used up
    pub fn with_elapsed(cap: Duration, elapsed: Duration) -> Self {
        Self {
            started: Instant::now(),
            offset: elapsed,
            cap,
        }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Total time consumed so far
    pub fn elapsed(&self) -> Duration {
        self.offset + self.started.elapsed()
    }

    /// Time left before the cap (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.cap.saturating_sub(self.elapsed())
    }

    /// Whether the cap has been reached
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_lifetime() {
        let lifetime = Lifetime::new(Duration::from_secs(60));
        assert!(!lifetime.expired());
        assert!(lifetime.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn test_preconsumed_lifetime_is_expired() {
        let lifetime = Lifetime::with_elapsed(COORDINATOR_LIFETIME, COORDINATOR_LIFETIME);
        assert!(lifetime.expired());
        assert_eq!(lifetime.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_with_clock() {
        let lifetime = Lifetime::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(lifetime.expired());
    }
}
