//! In-memory book and engine
//!
//! [`MemoryBook`] keys every position by the move sequence that reaches it.
//! Scores follow negamax: a parent's best score is the maximum of its
//! children's negated best scores, and a child's delta is how far it falls
//! short of that best.
//!
//! [`MemoryEngine`] stands in for a real search: analyzing a line records
//! the depth it was searched at, and a full expansion marks it solved.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::variation::{Move, Variation};

use super::{Book, BookError, CandidateLine, Engine, ExtractionBounds, SearchParams};

/// Evaluation stored for one position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Gap between this move and the best move of the parent
    pub delta: i32,

    /// Best achievable score from this position
    pub best_score: i32,

    /// Depth of the deepest search run on this position
    pub depth: u32,

    /// Score is exact
    pub solved: bool,
}

impl Position {
    pub fn new(delta: i32, best_score: i32) -> Self {
        Self {
            delta,
            best_score,
            ..Default::default()
        }
    }

    /// An exactly solved position
    pub fn solved(delta: i32, best_score: i32) -> Self {
        Self {
            solved: true,
            ..Self::new(delta, best_score)
        }
    }

    /// Whether `self` carries at least as much information as `other`
    fn supersedes(&self, other: &Self) -> bool {
        if self.solved != other.solved {
            return self.solved;
        }
        self.depth >= other.depth
    }
}

/// Book held entirely in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryBook {
    positions: BTreeMap<Vec<Move>, Position>,
    prune_height: usize,
}

impl MemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book whose default prune drops positions shallower than `height`
    pub fn with_prune_height(height: usize) -> Self {
        Self {
            prune_height: height,
            ..Self::default()
        }
    }

    /// Insert or overwrite a position
    pub fn insert(&mut self, moves: Vec<Move>, position: Position) {
        self.positions.insert(moves, position);
    }

    pub fn get(&self, moves: &[Move]) -> Option<&Position> {
        self.positions.get(moves)
    }

    pub fn contains(&self, moves: &[Move]) -> bool {
        self.positions.contains_key(moves)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<Move>, &Position)> {
        self.positions.iter()
    }

    fn children(&self, moves: &[Move]) -> Vec<(Vec<Move>, Position)> {
        self.positions
            .range(moves.to_vec()..)
            .skip_while(|(k, _)| k.as_slice() == moves)
            .take_while(|(k, _)| k.starts_with(moves))
            .filter(|(k, _)| k.len() == moves.len() + 1)
            .map(|(k, p)| (k.clone(), *p))
            .collect()
    }

    /// Record a search result for `line`, creating the position if needed
    fn record(&mut self, line: &[Move], depth: u32, solved: bool) {
        for len in 0..line.len() {
            self.positions.entry(line[..len].to_vec()).or_default();
        }
        let position = self.positions.entry(line.to_vec()).or_default();
        position.depth = position.depth.max(depth);
        position.solved |= solved;
    }
}

impl Book for MemoryBook {
    fn merge(&mut self, other: &Self) {
        for (moves, incoming) in &other.positions {
            match self.positions.get_mut(moves) {
                Some(existing) => {
                    if incoming.supersedes(existing) {
                        *existing = *incoming;
                    }
                }
                None => {
                    self.positions.insert(moves.clone(), *incoming);
                }
            }
        }
    }

    fn prune(&mut self, height: Option<usize>) {
        let height = height.unwrap_or(self.prune_height);
        if height > 0 {
            self.positions.retain(|moves, _| moves.len() >= height);
        }
    }

    fn prune_height(&self) -> usize {
        self.prune_height
    }

    fn recompute_consistency(&mut self) -> usize {
        let mut corrections = 0;

        let keys: Vec<Vec<Move>> = self.positions.keys().cloned().collect();
        for key in &keys {
            for len in 0..key.len() {
                if !self.positions.contains_key(&key[..len]) {
                    self.positions.insert(key[..len].to_vec(), Position::default());
                    corrections += 1;
                }
            }
        }

        let mut deepest_first: Vec<Vec<Move>> = self.positions.keys().cloned().collect();
        deepest_first.sort_by_key(|k| Reverse(k.len()));

        for key in deepest_first {
            let children = self.children(&key);
            let Some(best) = children.iter().map(|(_, p)| -p.best_score).max() else {
                continue;
            };

            for (child, position) in &children {
                let delta = best + position.best_score;
                if position.delta != delta {
                    if let Some(p) = self.positions.get_mut(child) {
                        p.delta = delta;
                    }
                    corrections += 1;
                }
            }

            if let Some(parent) = self.positions.get_mut(&key) {
                if parent.best_score != best {
                    parent.best_score = best;
                    corrections += 1;
                }
            }
        }

        corrections
    }

    fn extract_subtree_for(&self, variations: &[Variation]) -> Self {
        let mut subtree = Self::with_prune_height(self.prune_height);
        for variation in variations {
            let moves = variation.moves();
            for len in 0..=moves.len() {
                if let Some(position) = self.positions.get(&moves[..len]) {
                    subtree.positions.insert(moves[..len].to_vec(), *position);
                }
            }
        }
        subtree
    }

    fn position_count(&self) -> usize {
        self.positions.len()
    }
}

/// Engine stand-in operating on a [`MemoryBook`]
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    params: SearchParams,
    perfect_solve_depth: usize,
    lines_analyzed: u64,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(SearchParams::default(), 20)
    }
}

impl MemoryEngine {
    pub fn new(params: SearchParams, perfect_solve_depth: usize) -> Self {
        Self {
            params,
            perfect_solve_depth,
            lines_analyzed: 0,
        }
    }

    /// Lines analyzed since creation
    pub fn lines_analyzed(&self) -> u64 {
        self.lines_analyzed
    }
}

impl Engine<MemoryBook> for MemoryEngine {
    fn perfect_solve_depth(&self) -> usize {
        self.perfect_solve_depth
    }

    fn search_params(&self) -> SearchParams {
        self.params
    }

    fn set_search_params(&mut self, params: SearchParams) {
        self.params = params;
    }

    fn analyze_line(
        &mut self,
        book: &mut MemoryBook,
        line: &[Move],
        _budget: Duration,
    ) -> Result<(), BookError> {
        book.record(line, self.params.depth, self.params.exhaustive);
        self.lines_analyzed += 1;
        Ok(())
    }

    fn extract_candidate_lines(
        &self,
        book: &MemoryBook,
        bounds: &ExtractionBounds,
        max_count: usize,
    ) -> Vec<CandidateLine> {
        // Keys are sorted, so a line with descendants is directly followed by one
        let mut entries = book.iter().peekable();
        let mut lines: Vec<Variation> = Vec::new();
        while let Some((moves, p)) = entries.next() {
            let interior = entries
                .peek()
                .is_some_and(|(next, _)| next.starts_with(moves));
            if moves.is_empty() || interior {
                continue;
            }
            if !p.solved && p.depth < self.params.depth && bounds.contains(moves.len(), p.delta) {
                lines.push(Variation::new(moves.clone(), p.delta, p.best_score));
            }
        }
        lines.sort();
        lines.truncate(max_count);
        lines
            .into_iter()
            .map(|v| (v.moves().to_vec(), v.delta(), v.best_score()))
            .collect()
    }
}
