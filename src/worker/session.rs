//! Worker session loop
//!
//! ```text
//! IDENTITY --announce--> DEFAULT
//! DEFAULT  --------------> FETCH2 (v2, v3) | FETCH (v1)
//! FETCH2   --fetch2, analyze--> SYNC
//! FETCH    --fetch, analyze---> SYNC
//! SYNC     --sync/sync2/sync3, rotate book--> DEFAULT
//! ```
//!
//! Any failure is logged, followed by a random pause, and the loop goes on.
//! A failed fetch starts over from `DEFAULT`; a failed sync keeps its
//! results and retries the upload. The loop ends when the lifetime cap
//! runs out.

use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::book::{self, Book, BookError, Engine};
use crate::error::{BookfleetErrorTrait, Error, Result};
use crate::metrics;
use crate::protocol::ProtocolError;
use crate::utils::{format_duration, Backoff, Lifetime};
use crate::variation::{parse_transcript, Variation};

use super::analysis::{analyze_in_background, BatchReport};
use super::client::CoordinatorClient;
use super::config::{ProtocolVersion, WorkerConfig};

/// Where the session loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Legacy fetch of game records
    Fetch,
    /// Fetch of a batch plus its sub-book
    Fetch2,
    /// Upload of analysis results
    Sync,
    /// Announce only
    Identity,
    /// Pick the fetch state of the configured protocol
    Default,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "FETCH",
            Self::Fetch2 => "FETCH2",
            Self::Sync => "SYNC",
            Self::Identity => "IDENTITY",
            Self::Default => "DEFAULT",
        })
    }
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Batches fetched
    pub fetches: u64,
    /// Result uploads accepted
    pub syncs: u64,
    /// Lines analyzed
    pub lines: u64,
    /// Failed exchanges
    pub failures: u64,
}

/// One worker process talking to one coordinator
pub struct WorkerSession<B, E> {
    config: WorkerConfig,
    client: CoordinatorClient,
    book: B,
    engine: Option<E>,
    state: WorkerState,
    completed: Vec<Variation>,
    backoff: Backoff,
    lifetime: Lifetime,
    summary: SessionSummary,
}

impl<B, E> WorkerSession<B, E>
where
    B: Book,
    E: Engine<B>,
{
    /// Create a session around an already loaded book
    pub fn new(config: WorkerConfig, book: B, engine: E) -> Self {
        let client = CoordinatorClient::from_config(&config);
        let backoff = Backoff::new(config.backoff());
        let lifetime = Lifetime::new(config.lifetime());
        Self {
            config,
            client,
            book,
            engine: Some(engine),
            state: WorkerState::Identity,
            completed: Vec::new(),
            backoff,
            lifetime,
            summary: SessionSummary::default(),
        }
    }

    /// Load the local book (empty when the file does not exist yet)
    pub fn open(config: WorkerConfig, engine: E) -> Result<Self> {
        let book = load_local_book(&config.book_path)?;
        Ok(Self::new(config, book, engine))
    }

    /// Replace the lifetime tracker
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Replace the backoff source
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start from `state` instead of announcing
    pub fn with_state(mut self, state: WorkerState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn book(&self) -> &B {
        &self.book
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Lines analyzed but not yet uploaded
    pub fn pending_results(&self) -> &[Variation] {
        &self.completed
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    fn fetch_state(&self) -> WorkerState {
        match self.config.protocol {
            ProtocolVersion::V1 => WorkerState::Fetch,
            ProtocolVersion::V2 | ProtocolVersion::V3 => WorkerState::Fetch2,
        }
    }

    /// Run until the lifetime cap
    pub async fn run(mut self) -> Result<SessionSummary> {
        info!(
            worker = self.client.worker_id(),
            coordinator = self.client.address(),
            protocol = %self.config.protocol,
            lifetime = %format_duration(self.lifetime.cap()),
            "Worker session starting"
        );

        while !self.lifetime.expired() {
            let remaining = self.lifetime.remaining();
            let failure = match tokio::time::timeout(remaining, self.step()).await {
                Err(_) => break,
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
            };

            self.summary.failures += 1;
            metrics::record_session_failure();

            if !failure.is_recoverable() || self.engine.is_none() {
                warn!(error = %failure, "Worker session cannot continue");
                return Err(failure);
            }

            let delay = self.backoff.next_delay().min(self.lifetime.remaining());
            warn!(
                state = %self.state,
                category = %failure.category(),
                error = %failure,
                delay_ms = delay.as_millis() as u64,
                failures = self.backoff.failures(),
                "Exchange failed, backing off"
            );
            if self.state != WorkerState::Sync {
                self.state = WorkerState::Default;
            }
            tokio::time::sleep(delay).await;
        }

        info!(
            fetches = self.summary.fetches,
            syncs = self.summary.syncs,
            lines = self.summary.lines,
            failures = self.summary.failures,
            "Worker lifetime reached"
        );
        Ok(self.summary)
    }

    /// Perform the exchange of the current state and advance
    pub async fn step(&mut self) -> Result<()> {
        let next = match self.state {
            WorkerState::Identity => {
                self.client.identity().await?;
                info!(worker = self.client.worker_id(), "Announced to coordinator");
                WorkerState::Default
            }
            WorkerState::Default => self.fetch_state(),
            WorkerState::Fetch => {
                let batch = self.client.fetch_legacy().await?;
                self.summary.fetches += 1;
                info!(batch = batch.len(), "Fetched legacy batch");
                self.analyze(batch).await?;
                WorkerState::Sync
            }
            WorkerState::Fetch2 => {
                let reply = self.client.fetch2::<B>().await?;
                self.summary.fetches += 1;
                self.book.merge(&reply.book);

                let batch = if reply.variations.is_empty() {
                    reply
                        .transcripts
                        .iter()
                        .map(|record| Ok(Variation::from_moves(parse_transcript(record)?)))
                        .collect::<std::result::Result<Vec<_>, ProtocolError>>()?
                } else {
                    reply.variations
                };
                info!(
                    batch = batch.len(),
                    positions = reply.book.position_count(),
                    "Fetched batch"
                );
                self.analyze(batch).await?;
                WorkerState::Sync
            }
            WorkerState::Sync => {
                self.upload().await?;
                WorkerState::Default
            }
        };

        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    async fn analyze(&mut self, batch: Vec<Variation>) -> Result<()> {
        let engine = self.engine.take().ok_or_else(|| {
            Error::from(BookError::Analysis {
                line: String::from("-"),
                reason: String::from("engine lost by an earlier failure"),
            })
        })?;
        let book = std::mem::take(&mut self.book);

        let (engine, book, result) =
            analyze_in_background(engine, book, batch, self.config.analysis_budget()).await?;
        self.engine = Some(engine);
        self.book = book;

        let BatchReport {
            completed,
            timed_out,
            ..
        } = result?;
        if timed_out && completed.is_empty() {
            return Err(Error::AnalysisTimeout(self.config.analysis_budget()));
        }
        self.summary.lines += completed.len() as u64;
        self.completed.extend(completed);
        Ok(())
    }

    async fn upload(&mut self) -> Result<()> {
        match self.config.protocol {
            ProtocolVersion::V1 => self.client.sync(&self.book).await?,
            ProtocolVersion::V2 => self.client.sync2(&self.book, &self.completed).await?,
            ProtocolVersion::V3 => self.client.sync3(&self.book, &self.completed).await?,
        }
        info!(
            completed = self.completed.len(),
            positions = self.book.position_count(),
            "Results uploaded"
        );

        self.completed.clear();
        self.summary.syncs += 1;
        self.backoff.reset();
        metrics::record_sync();

        match book::rotate(&self.book, &self.config.book_path) {
            Ok(reopened) => self.book = reopened,
            Err(e) => warn!(
                path = %self.config.book_path.display(),
                error = %e,
                "Local book rotation failed, previous file stays authoritative"
            ),
        }
        Ok(())
    }
}

/// Local book at `path`, or an empty one if the file does not exist
fn load_local_book<B: Book>(path: &Path) -> Result<B> {
    if path.exists() {
        let book: B = book::load(path)?;
        info!(path = %path.display(), positions = book.position_count(), "Local book loaded");
        Ok(book)
    } else {
        info!(path = %path.display(), "No local book yet, starting empty");
        Ok(B::default())
    }
}
