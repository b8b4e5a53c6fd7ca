//! Work-queue selection
//!
//! Turns the current state of the master book into an ordered queue of
//! variations worth handing out:
//!
//! 1. [`VariationSelector::extract_candidates`] asks the engine for unfinished
//!    lines inside the configured window, sorted by [`Variation`] order.
//! 2. [`VariationSelector::prioritize`] trims the queue so that a surplus of
//!    draws, or a front dominated by short decisive lines, does not bury the
//!    lines that matter.
//! 3. The result is dumped to a recovery file, one line per variation, so an
//!    operator can inspect or restore the in-flight queue after a crash.

use statrs::statistics::Statistics;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::book::{Book, Engine, ExtractionBounds};
use crate::storage;
use crate::variation::{Variation, VariationCollection};

/// Queue length kept per unit of start count
pub const KEEP_PER_START_COUNT: usize = 30;

/// Length deviation above which the queue is truncated
pub const LENGTH_DEVIATION_LIMIT: f64 = 2.0;

/// What [`VariationSelector::prioritize`] did to the queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prioritization {
    /// Only the first `keep` drawn lines were kept
    DrawsOnly { draws: usize, kept: usize },

    /// Lengths varied widely; the queue was cut to `kept`
    Truncated { deviation: f64, kept: usize },

    /// Queue left as it was
    Unchanged { deviation: Option<f64> },
}

/// Extracts and prioritizes variations from a book
#[derive(Debug, Clone)]
pub struct VariationSelector {
    bounds: ExtractionBounds,
    recovery_path: Option<PathBuf>,
}

impl VariationSelector {
    pub fn new(bounds: ExtractionBounds) -> Self {
        Self {
            bounds,
            recovery_path: None,
        }
    }

    /// Dump every prioritized queue to `path`
    pub fn with_recovery_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.recovery_path = Some(path.into());
        self
    }

    pub fn bounds(&self) -> &ExtractionBounds {
        &self.bounds
    }

    pub fn recovery_path(&self) -> Option<&Path> {
        self.recovery_path.as_deref()
    }

    /// Unfinished lines of `book`, sorted, at most `max_count`
    pub fn extract_candidates<B, E>(&self, engine: &E, book: &B, max_count: usize) -> VariationCollection
    where
        B: Book,
        E: Engine<B>,
    {
        let mut variations: VariationCollection = engine
            .extract_candidate_lines(book, &self.bounds, max_count)
            .into_iter()
            .filter(|(moves, _, _)| !moves.is_empty())
            .map(|(moves, delta, best_score)| Variation::new(moves, delta, best_score))
            .collect();
        variations.sort();
        variations.truncate(max_count);
        debug!(count = variations.len(), max_count, "Extracted candidate lines");
        variations
    }

    /// Trim a sorted queue according to its draw count and length spread
    pub fn prioritize(&self, variations: &mut VariationCollection, start_count: usize) -> Prioritization {
        let keep = KEEP_PER_START_COUNT * start_count;
        let draws = variations.iter().filter(|v| v.is_draw()).count();

        let outcome = if draws >= keep {
            let mut kept = 0;
            variations.retain(|v| {
                if v.is_draw() && kept < keep {
                    kept += 1;
                    true
                } else {
                    false
                }
            });
            Prioritization::DrawsOnly { draws, kept }
        } else {
            let sample = keep.min(variations.len());
            if sample > 1 {
                let lengths: Vec<f64> = variations[..sample].iter().map(|v| v.len() as f64).collect();
                let mean = lengths.iter().mean();
                let deviation = lengths.iter().std_dev();
                debug!(mean, deviation, sample, "Queue length spread");

                if deviation > LENGTH_DEVIATION_LIMIT && variations.len() > keep {
                    variations.truncate(keep);
                    Prioritization::Truncated {
                        deviation,
                        kept: keep,
                    }
                } else {
                    Prioritization::Unchanged {
                        deviation: Some(deviation),
                    }
                }
            } else {
                Prioritization::Unchanged { deviation: None }
            }
        };

        info!(
            ?outcome,
            draws,
            keep,
            queue = variations.len(),
            "Prioritized variations"
        );
        self.dump(variations);
        outcome
    }

    /// Extract, prioritize and dump in one step
    pub fn select<B, E>(&self, engine: &E, book: &B, max_count: usize, start_count: usize) -> VariationCollection
    where
        B: Book,
        E: Engine<B>,
    {
        let mut variations = self.extract_candidates(engine, book, max_count);
        self.prioritize(&mut variations, start_count);
        variations
    }

    /// Best-effort write of the recovery dump
    fn dump(&self, variations: &[Variation]) {
        let Some(path) = &self.recovery_path else {
            return;
        };
        let mut text = String::new();
        for variation in variations {
            text.push_str(&variation.to_string());
            text.push('\n');
        }
        if let Err(e) = storage::write_atomic(path, text.as_bytes()) {
            warn!(path = %path.display(), error = %e, "Failed to write recovery dump");
        }
    }
}

/// Read a recovery dump written by a previous run
///
/// Unreadable lines are skipped with a warning; a missing file yields an
/// empty queue.
pub fn load_recovery_dump(path: &Path) -> VariationCollection {
    let bytes = match storage::read_optional(path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Failed to read recovery dump");
            return Vec::new();
        }
    };

    String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.parse::<Variation>() {
            Ok(v) if v.is_empty() => {
                warn!("Skipping empty recovery line");
                None
            }
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable recovery line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{MemoryBook, MemoryEngine, Position};
    use crate::variation::Move;
    use tempfile::TempDir;

    /// A distinct line of `len` moves, unique per `seed`
    fn line(seed: usize, len: usize, delta: i32, best: i32) -> Variation {
        let mut moves: Vec<Move> = (0..len)
            .map(|i| Move::new(((seed + i * 7) % 64) as u8).unwrap())
            .collect();
        // make every line unique regardless of length
        moves.insert(0, Move::new((seed % 64) as u8).unwrap());
        moves.insert(0, Move::new(((seed / 64) % 64) as u8).unwrap());
        Variation::new(moves, delta, best)
    }

    fn selector() -> VariationSelector {
        VariationSelector::new(ExtractionBounds::default())
    }

    #[test]
    fn test_many_draws_truncate_to_keep_draws() {
        let mut queue: Vec<Variation> = (0..200).map(|i| line(i, 4, 0, 0)).collect();
        queue.extend((200..220).map(|i| line(i, 4, 2, 1)));
        queue.sort();

        let outcome = selector().prioritize(&mut queue, 5);

        assert_eq!(queue.len(), 150);
        assert!(queue.iter().all(Variation::is_draw));
        assert_eq!(outcome, Prioritization::DrawsOnly { draws: 200, kept: 150 });
    }

    #[test]
    fn test_wide_length_spread_truncates() {
        let mut queue: Vec<Variation> = (0..300)
            .map(|i| line(i, if i % 2 == 0 { 2 } else { 20 }, 1, 1))
            .collect();

        let outcome = selector().prioritize(&mut queue, 5);

        assert_eq!(queue.len(), 150);
        assert!(matches!(outcome, Prioritization::Truncated { kept: 150, .. }));
    }

    #[test]
    fn test_homogeneous_lengths_unchanged() {
        let mut queue: Vec<Variation> = (0..300).map(|i| line(i, 10, 1, 1)).collect();
        let before = queue.clone();

        let outcome = selector().prioritize(&mut queue, 5);

        assert_eq!(queue, before);
        assert!(matches!(outcome, Prioritization::Unchanged { deviation: Some(d) } if d < 1e-9));
    }

    #[test]
    fn test_short_queue_with_spread_unchanged() {
        // spread is wide but the queue is not longer than keep
        let mut queue: Vec<Variation> = (0..100)
            .map(|i| line(i, if i % 2 == 0 { 2 } else { 20 }, 1, 1))
            .collect();

        selector().prioritize(&mut queue, 5);

        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn test_single_entry_skips_deviation() {
        let mut queue = vec![line(1, 3, 1, 1)];
        let outcome = selector().prioritize(&mut queue, 5);
        assert_eq!(outcome, Prioritization::Unchanged { deviation: None });
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_recovery_dump_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("variations.txt");
        let selector = selector().with_recovery_path(&path);

        let mut queue = vec![line(1, 3, 1, -1), line(2, 5, 0, 0)];
        selector.prioritize(&mut queue, 5);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);

        let restored = load_recovery_dump(&path);
        assert_eq!(restored, queue);
        assert_eq!(restored[0].delta(), queue[0].delta());
    }

    #[test]
    fn test_recovery_dump_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_recovery_dump(&dir.path().join("variations.txt")).is_empty());
    }

    #[test]
    fn test_select_from_book() {
        let mut book = MemoryBook::new();
        for text in ["f5d6", "f5f6", "f5d6c3"] {
            book.insert(crate::variation::parse_moves(text).unwrap(), Position::new(1, 0));
        }
        let engine = MemoryEngine::default();

        let queue = selector().select(&engine, &book, 10, 5);

        // f5d6 continues into f5d6c3 and is not handed out itself
        assert_eq!(queue.len(), 2);
        assert!(queue.windows(2).all(|w| w[0] <= w[1]));
        assert!(!queue.contains(&Variation::from_moves(crate::variation::parse_moves("f5d6").unwrap())));
    }

    /// Engine reporting a fixed set of candidates
    struct FixedEngine(Vec<crate::book::CandidateLine>);

    impl Engine<MemoryBook> for FixedEngine {
        fn perfect_solve_depth(&self) -> usize {
            20
        }

        fn search_params(&self) -> crate::book::SearchParams {
            crate::book::SearchParams::default()
        }

        fn set_search_params(&mut self, _params: crate::book::SearchParams) {}

        fn analyze_line(
            &mut self,
            _book: &mut MemoryBook,
            _line: &[Move],
            _budget: std::time::Duration,
        ) -> Result<(), crate::book::BookError> {
            Ok(())
        }

        fn extract_candidate_lines(
            &self,
            _book: &MemoryBook,
            _bounds: &ExtractionBounds,
            _max_count: usize,
        ) -> Vec<crate::book::CandidateLine> {
            self.0.clone()
        }
    }

    #[test]
    fn test_empty_line_never_reaches_queue() {
        // An empty line with a large gap would break the queue order
        let a = line(1, 1, 0, 0);
        let b = line(2, 0, 1, 0);
        let engine = FixedEngine(vec![
            (a.moves().to_vec(), a.delta(), a.best_score()),
            (b.moves().to_vec(), b.delta(), b.best_score()),
            (Vec::new(), 10, 0),
        ]);

        let queue = selector().extract_candidates(&engine, &MemoryBook::new(), 10);

        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|v| !v.is_empty()));
        assert!(queue.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_recovery_dump_skips_empty_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("variations.txt");
        std::fs::write(&path, "10 0 \n1 1 f5d6\n").unwrap();

        let restored = load_recovery_dump(&path);

        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].len(), 2);
    }
}
