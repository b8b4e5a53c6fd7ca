pub mod coordinator;
pub mod stats;
pub mod worker;

// Re-export command functions for convenience
pub use coordinator::{coordinator, CoordinatorParams};
pub use stats::stats;
pub use worker::{worker, WorkerParams};
