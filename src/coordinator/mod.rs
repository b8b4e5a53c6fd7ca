//! Coordinator for distributed book building
//!
//! The coordinator owns the master book and hands out unfinished lines to
//! workers, one TCP exchange at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            Coordinator Server            │
//! │   sequential accept loop, lifetime cap   │
//! │                                          │
//! │  ┌────────────────────────────────────┐  │
//! │  │         Coordinator State          │  │
//! │  │  - Master book (merge, prune)      │  │
//! │  │  - Variation queue                 │  │
//! │  │  - Batch controller (median pace)  │  │
//! │  │  - Per-worker counters             │  │
//! │  └────────────────────────────────────┘  │
//! │                                          │
//! │  fetch  fetch2  sync  sync2  sync3       │
//! │  merge  identity  quit                   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bookfleet::book::{MemoryBook, MemoryEngine};
//! use bookfleet::coordinator::{CoordinatorConfig, CoordinatorServer, CoordinatorState};
//!
//! let config = CoordinatorConfig::default();
//! let state = CoordinatorState::<MemoryBook, _>::open(config, MemoryEngine::default())?;
//! let (_state, reason) = CoordinatorServer::bind(state).await?.run().await?;
//! ```

pub mod config;
pub mod controller;
pub mod queue;
pub mod server;
pub mod state;

// Re-export main types
pub use config::CoordinatorConfig;
pub use controller::{Adjustment, BatchController};
pub use queue::VariationQueue;
pub use server::{CoordinatorServer, StopReason};
pub use state::{CoordinatorState, SyncOutcome};
