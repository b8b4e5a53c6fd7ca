//! bookfleet - Distributed opening-book builder
//!
//! A single coordinator owns the master book and hands out unfinished
//! lines to a fleet of untrusted analysis workers over plain TCP. Workers
//! analyze their batch locally and upload their book back; the coordinator
//! merges it and paces batch sizes from the observed round-trip times.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`variation`] - Move sequences, their priority order and game records
//! - [`book`] - The book and engine contracts, plus an in-memory reference
//! - [`selector`] - Extraction and prioritization of lines to hand out
//! - [`protocol`] - Command lines and binary payloads on the wire
//! - [`coordinator`] - Master book owner, batch controller, accept loop
//! - [`worker`] - Fetch, analyze, sync session loop
//! - [`storage`] - Durable file replacement and per-worker counters
//! - [`metrics`] - Prometheus metrics
//! - [`config`] - Configuration management and settings
//! - [`utils`] - Lifetime caps, backoff, small helpers
//!
//! # Example
//!
//! ```no_run
//! use bookfleet::book::{MemoryBook, MemoryEngine};
//! use bookfleet::config::Config;
//! use bookfleet::worker::WorkerSession;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let session = WorkerSession::<MemoryBook, _>::open(config.worker, MemoryEngine::default())?;
//!     session.run().await?;
//!     Ok(())
//! }
//! ```

pub mod book;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod selector;
pub mod storage;
pub mod utils;
pub mod variation;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::book::{Book, Engine, MemoryBook, MemoryEngine};
    pub use crate::config::Config;
    pub use crate::coordinator::{CoordinatorConfig, CoordinatorServer, CoordinatorState};
    pub use crate::error::{BookfleetErrorTrait, Error, ErrorCategory, Result};
    pub use crate::variation::{Move, Variation};
    pub use crate::worker::{CoordinatorClient, WorkerConfig, WorkerSession};
}

// Direct re-exports for convenience
pub use variation::{Move, Variation};
