//! Error types for page-walker
//!
//! This module defines the error hierarchy for:
//! - Page fetch failures reported by the caller's fetcher
//! - Worker thread lifecycle errors
//! - Configuration validation
//! - Record sink output
//!
//! Only the first fetch failure of a run is ever returned. Dropped
//! continuation tokens (queue overflow) are not errors; they are counted
//! in the fetch report and logged.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by a parallel fetch
///
/// Generic over the fetcher's own error type so the first failure is
/// handed back to the caller untouched.
#[derive(Error, Debug)]
pub enum PagerError<E>
where
    E: std::error::Error + 'static,
{
    /// The page fetcher failed (first failure of the run)
    #[error("worker {worker} failed to fetch page: {source}")]
    Fetch {
        worker: usize,
        #[source]
        source: E,
    },

    /// Worker thread errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl<E> PagerError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the fetcher's error if this is a fetch failure
    pub fn fetch_error(&self) -> Option<&E> {
        match self {
            PagerError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consume and return the fetcher's error if this is a fetch failure
    pub fn into_fetch_error(self) -> Option<E> {
        match self {
            PagerError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Termination detector thread could not be spawned
    #[error("Failed to spawn termination detector: {0}")]
    DetectorSpawnFailed(String),

    /// Termination detector panicked
    #[error("Termination detector panicked")]
    DetectorPanicked,

    /// Initial token could not be queued
    #[error("Failed to seed the token queue")]
    SeedFailed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue capacity
    #[error("Invalid queue capacity {capacity}: must be at least {min}")]
    InvalidQueueCapacity { capacity: usize, min: usize },

    /// Zero-length timing parameter
    #[error("Invalid {name}: must be greater than zero")]
    InvalidTimeout { name: &'static str },

    /// Simulated source parameters out of range
    #[error("Invalid simulation setting '{name}': {reason}")]
    InvalidSimulation { name: &'static str, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Record sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O failure while writing records
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("Failed to serialize record {index}: {source}")]
    Serialize {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for SinkError
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for a parallel fetch
pub type Result<T, E> = std::result::Result<T, PagerError<E>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    struct ApiDown;

    impl fmt::Display for ApiDown {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "api down")
        }
    }

    impl std::error::Error for ApiDown {}

    #[test]
    fn test_fetch_error_accessors() {
        let err: PagerError<ApiDown> = PagerError::Fetch {
            worker: 3,
            source: ApiDown,
        };
        assert_eq!(err.to_string(), "worker 3 failed to fetch page: api down");
        assert_eq!(err.fetch_error(), Some(&ApiDown));
        assert_eq!(err.into_fetch_error(), Some(ApiDown));
    }

    #[test]
    fn test_error_conversion() {
        let cfg = ConfigError::InvalidWorkerCount { count: 0, max: 512 };
        let err: PagerError<ApiDown> = cfg.into();
        assert!(matches!(err, PagerError::Config(_)));
        assert!(err.fetch_error().is_none());
    }
}
