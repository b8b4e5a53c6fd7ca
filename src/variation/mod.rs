//! Candidate lines handed out to workers
//!
//! A [`Variation`] is an immutable move sequence together with the score
//! gap (`delta`) and best score the book currently assigns to it. Equality
//! and hashing only look at the moves; ordering surfaces short decisive
//! lines first while still keeping draws in the queue.
//!
//! # Example
//!
//! ```
//! use bookfleet::variation::{Move, Variation};
//!
//! let moves: Vec<Move> = ["f5", "d6", "c3"].iter().filter_map(|m| Move::parse(m)).collect();
//! let line = Variation::new(moves, 2, -4);
//! assert_eq!(line.len(), 3);
//! assert!(!line.is_draw());
//! ```

pub mod transcript;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub use transcript::{parse_transcript, TranscriptError};

/// Length weight applied to a line compared against a non-drawn line
pub const LENGTH_FACTOR: i64 = 5;

/// Length weight applied to a line compared against a drawn line
pub const DRAW_LENGTH_FACTOR: i64 = 1000;

/// Number of empty squares on the standard starting position
pub const INITIAL_EMPTIES: usize = 60;

/// Ordered collection of variations as produced by extraction
pub type VariationCollection = Vec<Variation>;

// ============================================================================
// Move
// ============================================================================

/// A board square, `a1` = 0 through `h8` = 63
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Move(u8);

impl Move {
    /// Create a move from a square index
    pub fn new(square: u8) -> Option<Self> {
        (square < 64).then_some(Self(square))
    }

    /// Parse a coordinate such as `f5` (case insensitive)
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let col = chars.next()?.to_ascii_lowercase();
        let row = chars.next()?;
        if chars.next().is_some() || !('a'..='h').contains(&col) || !('1'..='8').contains(&row) {
            return None;
        }
        let square = (row as u8 - b'1') * 8 + (col as u8 - b'a');
        Some(Self(square))
    }

    /// Square index
    pub fn square(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col = (b'a' + self.0 % 8) as char;
        let row = (b'1' + self.0 / 8) as char;
        write!(f, "{col}{row}")
    }
}

/// Parse a compact move list such as `f5d6c3`
pub fn parse_moves(text: &str) -> Option<Vec<Move>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| Move::parse(&text[i..i + 2]))
        .collect()
}

/// Format a move list compactly (`f5d6c3`)
pub fn format_moves(moves: &[Move]) -> String {
    moves.iter().map(ToString::to_string).collect()
}

// ============================================================================
// Variation
// ============================================================================

/// A candidate line selected for deeper analysis
///
/// Field order is part of the wire format (`delta`, `best_score`, `moves`)
/// and must not be rearranged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    delta: i32,
    best_score: i32,
    moves: Vec<Move>,
}

impl Variation {
    /// Create a new variation
    pub fn new(moves: Vec<Move>, delta: i32, best_score: i32) -> Self {
        Self {
            delta,
            best_score,
            moves,
        }
    }

    /// Create a variation with no score information
    pub fn from_moves(moves: Vec<Move>) -> Self {
        Self::new(moves, 0, 0)
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn delta(&self) -> i32 {
        self.delta
    }

    pub fn best_score(&self) -> i32 {
        self.best_score
    }

    /// Number of moves in the line
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// A line whose analysis concluded in a game-theoretic tie
    pub fn is_draw(&self) -> bool {
        self.delta == 0 && self.best_score == 0
    }

    /// Empty squares remaining at the end of the line
    pub fn empties(&self) -> usize {
        INITIAL_EMPTIES.saturating_sub(self.moves.len())
    }

    /// Render as a single-line game record
    pub fn to_transcript(&self) -> String {
        transcript::encode(&self.moves)
    }

    /// Priority key of this line when compared against `other`
    fn weight_against(&self, other: &Self) -> i64 {
        let factor = if other.delta == 0 {
            DRAW_LENGTH_FACTOR
        } else {
            LENGTH_FACTOR
        };
        i64::from(self.delta) + factor * self.moves.len() as i64
    }
}

impl PartialEq for Variation {
    fn eq(&self, other: &Self) -> bool {
        self.moves == other.moves
    }
}

impl Eq for Variation {}

impl Hash for Variation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.moves.hash(state);
    }
}

/// Orders by weighted length, then by moves
///
/// The weight depends on both sides, so the order is only total over
/// non-empty lines. Queues never hold the empty line.
impl Ord for Variation {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.moves == other.moves {
            return Ordering::Equal;
        }
        self.weight_against(other)
            .cmp(&other.weight_against(self))
            .then_with(|| self.moves.cmp(&other.moves))
    }
}

impl PartialOrd for Variation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Plain-text form used by the recovery dump: `<delta> <best> <moves>`
impl fmt::Display for Variation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.delta,
            self.best_score,
            format_moves(&self.moves)
        )
    }
}

impl FromStr for Variation {
    type Err = TranscriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let mut number = |name: &str| -> Result<i32, TranscriptError> {
            fields
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| TranscriptError::InvalidLine(format!("missing {name}: {s}")))
        };
        let delta = number("delta")?;
        let best_score = number("best score")?;
        let moves = match fields.next() {
            Some(text) => parse_moves(text)
                .ok_or_else(|| TranscriptError::InvalidLine(format!("bad moves: {s}")))?,
            None => Vec::new(),
        };
        Ok(Self::new(moves, delta, best_score))
    }
}
