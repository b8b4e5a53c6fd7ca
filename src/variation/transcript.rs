//! Single-line game records
//!
//! Lines are exchanged with legacy workers as GGF-style records: a fixed
//! header describing the standard starting position followed by
//! alternating `B[..]` / `W[..]` move tags.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use super::Move;

const HEADER: &str = "(;GM[Othello]PC[bookfleet]PB[?]PW[?]RE[?]TY[8]\
BO[8 -------- -------- -------- ---O*--- ---*O--- -------- -------- -------- *]";

const FOOTER: &str = ";)";

/// Errors produced while reading a game record or a dumped line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    /// Not framed as a game record
    #[error("not a game record: {0}")]
    NotARecord(String),

    /// Record describes another game type
    #[error("unsupported game type in record: {0}")]
    UnsupportedGame(String),

    /// Line in a plain-text dump could not be read
    #[error("invalid line: {0}")]
    InvalidLine(String),
}

/// Encode a move sequence as a game record
pub fn encode(moves: &[Move]) -> String {
    let mut out = String::with_capacity(HEADER.len() + moves.len() * 6 + FOOTER.len());
    out.push_str(HEADER);
    for (ply, mv) in moves.iter().enumerate() {
        let color = if ply % 2 == 0 { 'B' } else { 'W' };
        out.push(color);
        out.push('[');
        out.push_str(&mv.to_string());
        out.push(']');
    }
    out.push_str(FOOTER);
    out
}

/// Parse the move sequence out of a game record
pub fn parse_transcript(record: &str) -> Result<Vec<Move>, TranscriptError> {
    static MOVE_RE: OnceLock<Regex> = OnceLock::new();

    let record = record.trim();
    if !record.starts_with("(;") || !record.ends_with(";)") {
        return Err(TranscriptError::NotARecord(truncate(record)));
    }
    if !record.contains("GM[Othello]") {
        return Err(TranscriptError::UnsupportedGame(truncate(record)));
    }

    let re = MOVE_RE.get_or_init(|| {
        Regex::new(r"\]([BW])\[([a-hA-H][1-8])").expect("Invalid regex pattern")
    });

    Ok(re
        .captures_iter(record)
        .filter_map(|caps| Move::parse(&caps[2]))
        .collect())
}

fn truncate(text: &str) -> String {
    text.chars().take(40).collect()
}
