//! Analysis worker
//!
//! A worker fetches a batch of lines plus the sub-book needed for them,
//! analyzes the batch locally and uploads its book back. It never trusts
//! the network to stay up: every failed exchange is followed by a random
//! pause and another attempt, until the worker's lifetime runs out.
//!
//! # Usage
//!
//! ```ignore
//! use bookfleet::book::{MemoryBook, MemoryEngine};
//! use bookfleet::worker::{WorkerConfig, WorkerSession};
//!
//! let config = WorkerConfig::from_env()?;
//! let session = WorkerSession::<MemoryBook, _>::open(config, MemoryEngine::default())?;
//! let summary = session.run().await?;
//! ```

pub mod analysis;
pub mod client;
pub mod config;
pub mod session;

pub use analysis::{analyze_batch, analyze_in_background, AnalysisMode, BatchReport};
pub use client::CoordinatorClient;
pub use config::{ProtocolVersion, WorkerConfig, WorkerConfigBuilder};
pub use session::{SessionSummary, WorkerSession, WorkerState};
