//! Adaptive batch sizing
//!
//! The coordinator wants each worker round trip to take between ten and
//! twenty minutes. [`BatchController`] keeps the last [`HISTORY_CAPACITY`]
//! round-trip durations and steers the batch size (`var_to_send`) by the
//! median of that window. `start_count` moves more slowly: it grows or
//! shrinks only when the queue runs dry, guarded by a hysteresis flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::storage::{self, StorageError, StorageResult};

/// Round trips remembered by the controller
pub const HISTORY_CAPACITY: usize = 20;

/// Value the window is seeded with before any measurement
pub const COLD_START: Duration = Duration::from_secs(3600);

/// Smallest batch ever handed out, and smallest start count
pub const MIN_BATCH: usize = 5;

/// Batch size step per adjustment
pub const BATCH_STEP: usize = 2;

/// Queued draws at or above which the batch size is left alone
pub const DRAW_BUFFER: usize = 5;

/// Lower edge of the target round trip
pub const TARGET_LOW: Duration = Duration::from_secs(10 * 60);

/// Upper edge of the target round trip
pub const TARGET_HIGH: Duration = Duration::from_secs(20 * 60);

/// Queue size kept per unit of batch size
pub const QUEUE_MULTIPLIER: usize = 30;

/// What one observation did to the batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Median below the band: batch grew
    Increased,

    /// Median above the band: batch shrank, start count stops growing
    Decreased,

    /// Median inside the band: batch kept, start count stops growing
    InBand,

    /// Enough draws queued to absorb latency: nothing changed
    DrawBuffered,
}

/// On-disk form of a controller: its fields plus when they were written
#[derive(Serialize, Deserialize)]
struct Snapshot<C> {
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    controller: C,
}

/// Batch-size state owned by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchController {
    start_count: usize,
    var_to_send: usize,
    max_variations: usize,
    /// Round-trip durations in seconds, oldest first
    history: VecDeque<f64>,
    increase_start_count: bool,
}

impl BatchController {
    pub fn new(start_count: usize, max_variations: usize) -> Self {
        let start_count = start_count.max(1);
        Self {
            start_count,
            var_to_send: start_count,
            max_variations,
            history: std::iter::repeat(COLD_START.as_secs_f64())
                .take(HISTORY_CAPACITY)
                .collect(),
            increase_start_count: true,
        }
    }

    pub fn start_count(&self) -> usize {
        self.start_count
    }

    /// Current batch size
    pub fn var_to_send(&self) -> usize {
        self.var_to_send
    }

    /// Minimum queue size kept available
    pub fn max_variations(&self) -> usize {
        self.max_variations
    }

    pub fn increase_start_count(&self) -> bool {
        self.increase_start_count
    }

    pub fn history(&self) -> impl Iterator<Item = Duration> + '_ {
        self.history.iter().map(|s| Duration::from_secs_f64(*s))
    }

    /// Median of the round-trip window
    pub fn median(&self) -> Duration {
        let data = Data::new(self.history.iter().copied().collect::<Vec<f64>>());
        let median = data.median();
        if median.is_finite() && median >= 0.0 {
            Duration::from_secs_f64(median)
        } else {
            COLD_START
        }
    }

    /// Whether a queue of `queue_len` entries is too short for the next batch
    pub fn needs_refill(&self, queue_len: usize) -> bool {
        queue_len < self.var_to_send
    }

    /// Move `start_count` after a refill on the fetch path
    ///
    /// Grows geometrically while the hysteresis flag is set, otherwise
    /// shrinks by [`BATCH_STEP`]. Either way the batch restarts at the new
    /// start count and the flag is primed again.
    pub fn grow_after_refill(&mut self) {
        let previous = self.start_count;
        self.start_count = if self.increase_start_count {
            let geometric = (previous as f64 * 1.1) as usize;
            (previous + BATCH_STEP).max(geometric)
        } else {
            previous.saturating_sub(BATCH_STEP).max(MIN_BATCH)
        };
        self.var_to_send = self.start_count;
        self.increase_start_count = true;

        info!(
            previous,
            start_count = self.start_count,
            "Start count adjusted after refill"
        );
    }

    /// Record one round trip and steer the batch size
    pub fn observe(&mut self, elapsed: Duration, queued_draws: usize) -> Adjustment {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(elapsed.as_secs_f64());

        let median = self.median();
        let previous = self.var_to_send;

        let adjustment = if queued_draws >= DRAW_BUFFER {
            Adjustment::DrawBuffered
        } else if median < TARGET_LOW {
            self.var_to_send += BATCH_STEP;
            Adjustment::Increased
        } else if median > TARGET_HIGH {
            self.var_to_send = self.var_to_send.saturating_sub(BATCH_STEP);
            self.increase_start_count = false;
            Adjustment::Decreased
        } else {
            self.increase_start_count = false;
            Adjustment::InBand
        };

        if adjustment != Adjustment::DrawBuffered {
            self.var_to_send = self.var_to_send.max(MIN_BATCH);
            self.max_variations = self.max_variations.max(QUEUE_MULTIPLIER * self.var_to_send);
        }

        info!(
            elapsed_secs = elapsed.as_secs(),
            median_secs = median.as_secs(),
            queued_draws,
            previous,
            var_to_send = self.var_to_send,
            max_variations = self.max_variations,
            increase_start_count = self.increase_start_count,
            ?adjustment,
            "Round trip observed"
        );
        adjustment
    }

    /// Restart the batch at `start_count` after a sync brought fresh material
    pub fn reset_after_sync(&mut self) {
        self.var_to_send = self.start_count;
        debug!(var_to_send = self.var_to_send, "Batch size reset after sync");
    }

    /// Save as JSON
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let snapshot = Snapshot {
            saved_at: Some(Utc::now()),
            controller: self,
        };
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        storage::write_atomic(path, &json)?;
        debug!(path = %path.display(), "Controller snapshot saved");
        Ok(())
    }

    /// Load a snapshot written by [`save`](Self::save)
    ///
    /// Returns `None` when the file is missing or unusable.
    pub fn load(path: &Path) -> Option<Self> {
        let bytes = match storage::read_optional(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read controller snapshot");
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot<Self>>(&bytes) {
            Ok(Snapshot {
                saved_at,
                controller,
            }) => {
                if let Some(saved_at) = saved_at {
                    debug!(
                        saved_at = %saved_at.to_rfc3339(),
                        age_secs = (Utc::now() - saved_at).num_seconds(),
                        "Controller snapshot found"
                    );
                }
                Some(controller.normalized())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable controller snapshot");
                None
            }
        }
    }

    /// Restore the window capacity and floors after deserialization
    fn normalized(mut self) -> Self {
        self.history.retain(|s| s.is_finite() && *s >= 0.0);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        while self.history.len() < HISTORY_CAPACITY {
            self.history.push_front(COLD_START.as_secs_f64());
        }
        self.start_count = self.start_count.max(1);
        self.var_to_send = self.var_to_send.max(1);
        self
    }
}
