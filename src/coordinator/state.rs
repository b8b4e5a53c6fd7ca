//! Coordinator state and command handlers
//!
//! [`CoordinatorState`] owns the master book, the pending queue, the batch
//! controller and the per-worker counters. The accept loop is its only
//! caller and handles one connection at a time, so every handler runs to
//! completion before the next one starts and no locking is needed.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::book::{self, Book, Engine};
use crate::config::ConfigError;
use crate::error::Result;
use crate::metrics;
use crate::protocol::{Fetch2Reply, HasBookDelta, HasVariations, SyncPayload};
use crate::selector::{load_recovery_dump, VariationSelector};
use crate::storage::{self, WorkerStats};
use crate::variation::VariationCollection;

use super::config::CoordinatorConfig;
use super::controller::{Adjustment, BatchController};
use super::queue::VariationQueue;

/// Result of folding one worker report into the master book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Change in master position count
    pub positions_added: i64,

    /// Queue entries dropped because the worker resolved them
    pub resolved: usize,

    /// Whether the queue was re-extracted afterwards
    pub refilled: bool,
}

/// Everything the coordinator mutates
pub struct CoordinatorState<B, E> {
    config: CoordinatorConfig,
    book: B,
    engine: E,
    selector: VariationSelector,
    queue: VariationQueue,
    controller: BatchController,
    stats: WorkerStats,
    cycle_started: Instant,
    quit_requested: bool,
}

impl<B, E> CoordinatorState<B, E>
where
    B: Book,
    E: Engine<B>,
{
    /// Build state around an already loaded book
    ///
    /// The queue starts from the recovery dump and the controller from its
    /// snapshot when those files exist.
    pub fn new(config: CoordinatorConfig, book: B, engine: E) -> Self {
        let selector =
            VariationSelector::new(config.bounds).with_recovery_path(config.recovery_path.clone());

        let controller = match BatchController::load(&config.snapshot_path) {
            Some(controller) => {
                info!(
                    start_count = controller.start_count(),
                    var_to_send = controller.var_to_send(),
                    median_secs = controller.median().as_secs(),
                    "Restored batch controller"
                );
                controller
            }
            None => BatchController::new(config.start_count, config.max_variations),
        };

        let restored = load_recovery_dump(&config.recovery_path);
        if !restored.is_empty() {
            info!(count = restored.len(), "Restored queue from recovery dump");
        }

        let stats = WorkerStats::new(config.stats_dir.clone());

        Self {
            config,
            book,
            engine,
            selector,
            queue: VariationQueue::from_variations(restored),
            controller,
            stats,
            cycle_started: Instant::now(),
            quit_requested: false,
        }
    }

    /// Load the master book named by `config` and build state around it
    ///
    /// A missing book file is a configuration error.
    pub fn open(config: CoordinatorConfig, engine: E) -> Result<Self> {
        if !config.book_path.exists() {
            return Err(ConfigError::MissingFile {
                field: "book_path".to_string(),
                path: config.book_path.clone(),
            }
            .into());
        }
        let book: B = book::load(&config.book_path)?;
        info!(
            path = %config.book_path.display(),
            positions = book.position_count(),
            "Master book loaded"
        );
        Ok(Self::new(config, book, engine))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn book(&self) -> &B {
        &self.book
    }

    pub fn queue(&self) -> &VariationQueue {
        &self.queue
    }

    pub fn controller(&self) -> &BatchController {
        &self.controller
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Stop accepting once the current connection is done
    pub fn request_quit(&mut self, worker: &str) {
        info!(worker, "Quit requested");
        self.quit_requested = true;
    }

    pub fn record_identity(&self, worker: &str) {
        info!(worker, "Worker announced itself");
    }

    /// Recompute the master book and re-extract the queue from it
    pub fn refill(&mut self) {
        let corrections = self.book.recompute_consistency();
        let variations = self.selector.select(
            &self.engine,
            &self.book,
            self.controller.max_variations(),
            self.controller.start_count(),
        );
        info!(
            corrections,
            queue = variations.len(),
            max_variations = self.controller.max_variations(),
            "Queue re-extracted"
        );
        self.queue.replace(variations);
        self.publish_gauges();
    }

    /// Refill when the queue cannot cover the next batch
    pub fn ensure_queue(&mut self) {
        if self.controller.needs_refill(self.queue.len()) {
            self.refill();
        }
    }

    // ========================================================================
    // fetch / fetch2
    // ========================================================================

    /// Take the next batch and the sub-book needed to analyze it
    ///
    /// An empty queue is re-extracted first.
    pub fn prepare_fetch2(&mut self) -> Fetch2Reply<B> {
        if self.queue.is_empty() {
            self.refill();
        }
        let variations = self.queue.drain_batch(self.controller.var_to_send());
        let book = self.book.extract_subtree_for(&variations);
        let transcripts = variations.iter().map(|v| v.to_transcript()).collect();

        info!(
            batch = variations.len(),
            positions = book.position_count(),
            queue = self.queue.len(),
            "Prepared fetch2 batch"
        );
        metrics::record_variations_sent(variations.len());

        Fetch2Reply {
            book,
            transcripts,
            variations,
        }
    }

    /// Run the pacing controller once a fetch2 reply is out
    pub fn complete_fetch2(&mut self) -> Adjustment {
        if self.controller.needs_refill(self.queue.len()) {
            self.refill();
            self.controller.grow_after_refill();
        }

        let elapsed = self.cycle_started.elapsed();
        let adjustment = self.controller.observe(elapsed, self.queue.draw_count());
        self.cycle_started = Instant::now();

        metrics::update_round_trip_median(self.controller.median().as_secs_f64());
        self.publish_gauges();
        adjustment
    }

    /// Legacy fetch: the next batch as game records
    pub fn fetch_legacy(&mut self) -> Vec<String> {
        if self.queue.is_empty() {
            self.refill();
        }
        let batch = self.queue.drain_batch(self.controller.var_to_send());
        metrics::record_variations_sent(batch.len());
        info!(batch = batch.len(), queue = self.queue.len(), "Prepared legacy batch");

        let transcripts = batch.iter().map(|v| v.to_transcript()).collect();
        self.ensure_queue();
        transcripts
    }

    // ========================================================================
    // sync / sync2 / sync3
    // ========================================================================

    /// Prune a worker's delta, merge it and re-prune the master
    ///
    /// The delta is pruned at the configured minimum ply, or at the master's
    /// own prune height; the height carried in the payload is ignored.
    /// Returns the change in master position count.
    fn merge_delta(&mut self, delta: &mut B) -> i64 {
        let height = self
            .config
            .min_prune_ply
            .unwrap_or_else(|| self.book.prune_height());
        delta.prune(Some(height));
        let before = self.book.position_count();
        self.book.merge(delta);
        self.book.prune(None);
        let after = self.book.position_count();
        let added = after as i64 - before as i64;

        info!(
            delta_positions = delta.position_count(),
            before,
            after,
            "Merged worker delta"
        );
        metrics::record_positions_merged(added);
        added
    }

    /// Legacy sync: merge only
    pub fn apply_legacy_sync(&mut self, worker: &str, mut payload: SyncPayload<B>) -> i64 {
        let added = self.merge_delta(&mut payload.book);
        info!(worker, positions_added = added, "Legacy sync merged");
        added
    }

    /// Fold a `sync2`/`sync3` report into the master book and the queue
    ///
    /// The completed set is decoded before anything is merged, so a report
    /// with a bad record leaves the state untouched.
    pub fn apply_sync<P>(&mut self, worker: &str, mut payload: P) -> Result<SyncOutcome>
    where
        P: HasBookDelta<B> + HasVariations,
    {
        let completed: VariationCollection = payload.completed()?;
        let positions_added = self.merge_delta(payload.book_mut());

        match self.stats.add(worker, positions_added) {
            Ok(total) => debug!(worker, total, "Contribution counter updated"),
            Err(e) => warn!(worker, error = %e, "Failed to update contribution counter"),
        }

        let resolved = self.queue.remove_resolved(&completed);

        let refilled = self.controller.needs_refill(self.queue.len());
        if refilled {
            self.refill();
            self.controller.reset_after_sync();
        }
        self.publish_gauges();

        let outcome = SyncOutcome {
            positions_added,
            resolved,
            refilled,
        };
        info!(
            worker,
            completed = completed.len(),
            positions_added,
            resolved,
            refilled,
            queue = self.queue.len(),
            var_to_send = self.controller.var_to_send(),
            "Sync applied"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the master book, the controller snapshot and the metrics file
    pub fn persist(&self) -> Result<()> {
        book::persist(&self.book, &self.config.book_path)?;

        if let Err(e) = self.controller.save(&self.config.snapshot_path) {
            warn!(error = %e, "Failed to save controller snapshot");
        }

        if let Some(path) = &self.config.metrics_path {
            if let Err(e) = storage::write_atomic(path, metrics::render().as_bytes()) {
                warn!(error = %e, "Failed to write metrics file");
            }
        }
        Ok(())
    }

    /// Time since the current fetch2 cycle started
    pub fn cycle_elapsed(&self) -> Duration {
        self.cycle_started.elapsed()
    }

    fn publish_gauges(&self) {
        metrics::update_queue(
            self.queue.len(),
            self.controller.var_to_send(),
            self.controller.start_count(),
        );
    }
}
