//! Unified error handling for the bookfleet crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`BookfleetErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Loop bodies in the coordinator and the worker catch every error, log it
//! with its category and carry on. Only [`ErrorCategory::Config`] is fatal,
//! and only at startup.

use std::time::Duration;
use thiserror::Error;

pub use crate::book::BookError;
pub use crate::config::ConfigError;
pub use crate::protocol::ProtocolError;
pub use crate::storage::StorageError;

/// Common trait for all bookfleet error types
pub trait BookfleetErrorTrait: std::error::Error {
    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// Check if this error can be left behind by retrying the loop
    fn is_recoverable(&self) -> bool {
        self.category() != ErrorCategory::Config
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connect refused, stream reset, partial read, empty fetch
    TransientIo,
    /// Peer sent something this side cannot understand
    Protocol,
    /// Local file could not be read or written
    Storage,
    /// Bad settings or missing files at startup
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientIo => "transient_io",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BookfleetErrorTrait for ProtocolError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) | Self::ConnectionClosed | Self::EmptyFetch => ErrorCategory::TransientIo,
            Self::UnknownCommand(_)
            | Self::MalformedCommandLine(_)
            | Self::InvalidCount(_)
            | Self::Codec(_)
            | Self::MessageTooLarge { .. }
            | Self::Transcript(_) => ErrorCategory::Protocol,
        }
    }
}

impl BookfleetErrorTrait for StorageError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}

impl BookfleetErrorTrait for BookError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(_) | Self::Encoding(_) => ErrorCategory::Storage,
            Self::Analysis { .. } => ErrorCategory::Other,
        }
    }
}

impl BookfleetErrorTrait for ConfigError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Config
    }
}

/// Unified error type for the bookfleet crate
#[derive(Error, Debug)]
pub enum Error {
    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// File persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Book and engine errors
    #[error("Book error: {0}")]
    Book(#[from] BookError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Local analysis ran past its time box
    #[error("Analysis exceeded its {0:?} budget")]
    AnalysisTimeout(Duration),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BookfleetErrorTrait for Error {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(e) => e.category(),
            Self::Storage(e) => e.category(),
            Self::Book(e) => e.category(),
            Self::Config(e) => e.category(),
            Self::AnalysisTimeout(_) | Self::Task(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error for an invalid field
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::Config(ConfigError::invalid(field, reason))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
