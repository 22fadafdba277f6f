//! Error types for dfs-walker
//!
//! This module defines the error hierarchy for the traversal engine and the
//! filesystem front end:
//! - Configuration errors, reported before any worker starts
//! - Per-node expansion errors, recorded and never fatal
//! - The single error value a traversal returns
//! - Worker thread failures
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Local per-node errors are recorded, only one error is returned
//! - Preserve the caller's visitor error so it can be downcast

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error type returned by visitors and enumeration callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for the filesystem front end and the CLI
#[derive(Error, Debug)]
pub enum WalkerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Traversal errors (visitor failure, cancellation, worker failure)
    #[error("Traversal error: {0}")]
    Traverse(#[from] TraverseError),

    /// I/O errors outside the traversal itself
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid steal chunk size
    #[error("Invalid steal chunk size {size}: must be at least 1")]
    InvalidChunkSize { size: usize },

    /// Invalid evaluator pool size
    #[error("Invalid evaluator count {count}: must be between 1 and {max}")]
    InvalidEvaluatorCount { count: usize, max: usize },

    /// Invalid evaluation queue capacity
    #[error("Invalid evaluation queue capacity {capacity}: must be at least 1")]
    InvalidQueueCapacity { capacity: usize },

    /// Invalid regex pattern
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Root could not be resolved
    #[error("Invalid root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Root node does not belong to the search space
    #[error("Unknown root {root}: {reason}")]
    UnknownRoot { root: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },

    /// Evaluator panicked
    #[error("Evaluator {id} panicked")]
    EvaluatorPanicked { id: usize },

    /// Thread could not be spawned
    #[error("Failed to spawn {name}: {reason}")]
    SpawnFailed { name: String, reason: String },
}

/// Failure to enumerate the children of a single node
///
/// Recorded in the traversal's error list; never aborts the traversal.
#[derive(Error, Debug)]
#[error("{node}: {source}")]
pub struct ExpandError {
    /// Display label of the node that failed
    pub node: String,

    /// Underlying cause
    #[source]
    pub source: BoxError,
}

impl ExpandError {
    /// Create an expansion error for a node label
    pub fn new(node: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Check if the failure is a path that vanished during the walk
    pub fn is_not_found(&self) -> bool {
        self.source
            .downcast_ref::<std::io::Error>()
            .map(|e| e.kind() == std::io::ErrorKind::NotFound)
            .unwrap_or(false)
    }
}

/// The single error value a traversal returns
#[derive(Error, Debug)]
pub enum TraverseError {
    /// First error reported by the visitor
    #[error("visitor failed: {0}")]
    Visit(#[source] BoxError),

    /// Caller-side cancellation
    #[error("traversal cancelled")]
    Cancelled,

    /// Caller-side deadline expired
    #[error("traversal deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration, detected before any worker started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Worker thread failure
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl TraverseError {
    /// Returns true if this error came from the caller's context
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TraverseError::Cancelled | TraverseError::DeadlineExceeded)
    }

    /// Borrow the visitor error, if this is one
    pub fn visit_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TraverseError::Visit(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias for WalkerError
pub type Result<T> = std::result::Result<T, WalkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_visit_error_downcast() {
        let err = TraverseError::Visit(Box::new(Boom));
        assert!(err.visit_error().unwrap().downcast_ref::<Boom>().is_some());
        assert!(!err.is_cancellation());
        assert_eq!(err.to_string(), "visitor failed: boom");
    }

    #[test]
    fn test_expand_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ExpandError::new("/data/x", io);
        assert_eq!(err.to_string(), "/data/x: gone");
        assert!(err.is_not_found());

        let perm = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!ExpandError::new("/data/y", perm).is_not_found());
    }

    #[test]
    fn test_error_conversion() {
        let cfg = ConfigError::InvalidChunkSize { size: 0 };
        let trav: TraverseError = cfg.clone().into();
        assert!(matches!(trav, TraverseError::Config(_)));

        let walker: WalkerError = cfg.into();
        assert!(matches!(walker, WalkerError::Config(_)));
        assert!(TraverseError::DeadlineExceeded.is_cancellation());
    }
}
