//! Capabilities consumed from the book and engine layer
//!
//! The coordinator and the workers never look inside the tree. They only
//! need the operations below, so any store that implements [`Book`] and any
//! search that implements [`Engine`] can be plugged in.
//!
//! [`memory`] provides an in-memory implementation of both, used by the
//! binary and the tests.

pub mod memory;

pub use memory::{MemoryBook, MemoryEngine, Position};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{self, StorageError};
use crate::variation::{Move, Variation};

/// Book and engine errors
#[derive(Error, Debug)]
pub enum BookError {
    /// Book file could not be read or written
    #[error("book storage error: {0}")]
    Storage(#[from] StorageError),

    /// Book file could not be decoded or encoded
    #[error("book encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Engine failed on a line
    #[error("analysis failed for {line}: {reason}")]
    Analysis { line: String, reason: String },
}

/// Ply and score window used when extracting candidate lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionBounds {
    /// Shortest line considered
    pub min_ply: usize,

    /// Longest line considered
    pub max_ply: usize,

    /// Largest score gap considered
    pub max_delta: i32,
}

impl Default for ExtractionBounds {
    fn default() -> Self {
        Self {
            min_ply: 0,
            max_ply: 60,
            max_delta: 4,
        }
    }
}

impl ExtractionBounds {
    /// Whether a line of `ply` moves with score gap `delta` falls inside the window
    pub fn contains(&self, ply: usize, delta: i32) -> bool {
        (self.min_ply..=self.max_ply).contains(&ply) && delta.abs() <= self.max_delta
    }
}

/// Search depth settings of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Midgame search depth
    pub depth: u32,

    /// Expand every child instead of the best ones only
    pub exhaustive: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            depth: 16,
            exhaustive: false,
        }
    }
}

impl SearchParams {
    /// Parameters that force a full expansion down to the end of the game
    pub fn full_expansion(self) -> Self {
        Self {
            depth: 60,
            exhaustive: true,
        }
    }
}

/// The shared tree of evaluated positions
pub trait Book: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Fold `other` into this book
    fn merge(&mut self, other: &Self);

    /// Drop positions shallower than `height` (the book's own prune height when `None`)
    fn prune(&mut self, height: Option<usize>);

    /// Default prune height
    fn prune_height(&self) -> usize;

    /// Repair unresolved nodes, returning the number of corrections made
    fn recompute_consistency(&mut self) -> usize;

    /// Smallest sub-book needed to analyze `variations`
    fn extract_subtree_for(&self, variations: &[Variation]) -> Self;

    /// Number of positions stored
    fn position_count(&self) -> usize;
}

/// Candidate line as reported by extraction: moves, score gap, best score
pub type CandidateLine = (Vec<Move>, i32, i32);

/// Local search over a book
pub trait Engine<B: Book>: Send + 'static {
    /// Remaining-empties count at or below which lines must be solved exactly
    fn perfect_solve_depth(&self) -> usize;

    fn search_params(&self) -> SearchParams;

    fn set_search_params(&mut self, params: SearchParams);

    /// Analyze one line, extending `book` with the results
    fn analyze_line(
        &mut self,
        book: &mut B,
        line: &[Move],
        budget: Duration,
    ) -> Result<(), BookError>;

    /// Unfinished lines of `book` inside `bounds`, at most `max_count`
    fn extract_candidate_lines(
        &self,
        book: &B,
        bounds: &ExtractionBounds,
        max_count: usize,
    ) -> Vec<CandidateLine>;
}

/// Load a book file
pub fn load<B: Book>(path: &Path) -> Result<B, BookError> {
    let bytes = storage::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Write a book file, rotating the previous version to `<path>.old`
pub fn persist<B: Book>(book: &B, path: &Path) -> Result<(), BookError> {
    let bytes = bincode::serialize(book)?;
    storage::durable_replace(path, &bytes)?;
    tracing::info!(
        path = %path.display(),
        positions = book.position_count(),
        bytes = bytes.len(),
        "Book persisted"
    );
    Ok(())
}

/// Persist then reopen, so the in-memory handle matches what is on disk
pub fn rotate<B: Book>(book: &B, path: &Path) -> Result<B, BookError> {
    persist(book, path)?;
    load(path)
}
