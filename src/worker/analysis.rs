//! Local analysis of a fetched batch
//!
//! Lines close enough to the end of the game are solved exactly: the
//! engine's search parameters are swapped for a full expansion while the
//! line is analyzed, then restored. Everything else gets the engine's
//! normal search. The whole batch shares one time box.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::book::{Book, BookError, Engine};
use crate::error::{Error, Result};
use crate::metrics;
use crate::variation::Variation;

/// How a line was analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Full expansion to the end of the game
    Solve,
    /// Normal-depth search
    Search,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solve => "solve",
            Self::Search => "search",
        }
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Lines analyzed, in the order they were received
    pub completed: Vec<Variation>,

    /// How many of them were solved exactly
    pub solved: usize,

    /// The time box ran out before every line was analyzed
    pub timed_out: bool,
}

/// Mode a line of `variation` gets from `engine`
pub fn mode_for<B: Book, E: Engine<B>>(engine: &E, variation: &Variation) -> AnalysisMode {
    if variation.empties() <= engine.perfect_solve_depth() {
        AnalysisMode::Solve
    } else {
        AnalysisMode::Search
    }
}

/// Analyze one line, restoring the engine's parameters afterwards
fn analyze_one<B: Book, E: Engine<B>>(
    engine: &mut E,
    book: &mut B,
    variation: &Variation,
    mode: AnalysisMode,
    budget: Duration,
) -> std::result::Result<(), BookError> {
    match mode {
        AnalysisMode::Search => engine.analyze_line(book, variation.moves(), budget),
        AnalysisMode::Solve => {
            let saved = engine.search_params();
            engine.set_search_params(saved.full_expansion());
            let result = engine.analyze_line(book, variation.moves(), budget);
            engine.set_search_params(saved);
            result
        }
    }
}

/// Analyze every line of a batch into `book`
///
/// Stops early, keeping what was finished, once `budget` is spent. An
/// engine failure aborts the batch.
pub fn analyze_batch<B: Book, E: Engine<B>>(
    engine: &mut E,
    book: &mut B,
    variations: &[Variation],
    budget: Duration,
) -> std::result::Result<BatchReport, BookError> {
    let deadline = Instant::now() + budget;
    let mut report = BatchReport::default();

    for (index, variation) in variations.iter().enumerate() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                analyzed = index,
                total = variations.len(),
                "Analysis budget spent, stopping early"
            );
            report.timed_out = true;
            break;
        }

        let mode = mode_for(engine, variation);
        debug!(
            index,
            plies = variation.len(),
            empties = variation.empties(),
            mode = mode.as_str(),
            "Analyzing line"
        );
        analyze_one(engine, book, variation, mode, remaining)?;

        metrics::record_line_analyzed(mode.as_str());
        if mode == AnalysisMode::Solve {
            report.solved += 1;
        }
        report.completed.push(variation.clone());
    }

    info!(
        completed = report.completed.len(),
        solved = report.solved,
        positions = book.position_count(),
        timed_out = report.timed_out,
        "Batch analyzed"
    );
    Ok(report)
}

/// Run [`analyze_batch`] on the blocking pool, handing ownership back afterwards
pub async fn analyze_in_background<B, E>(
    mut engine: E,
    mut book: B,
    variations: Vec<Variation>,
    budget: Duration,
) -> Result<(E, B, std::result::Result<BatchReport, BookError>)>
where
    B: Book,
    E: Engine<B>,
{
    tokio::task::spawn_blocking(move || {
        let result = analyze_batch(&mut engine, &mut book, &variations, budget);
        (engine, book, result)
    })
    .await
    .map_err(Error::from)
}
