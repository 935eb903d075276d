//! Orchestrator-specific error types
//!
//! Fatal errors abort a run; the recoverable kinds (`ScoringError`,
//! `NumericAnomaly`) live next to the code that produces them and are turned
//! into logged sentinel values instead of propagating.

use shared::{ClusterId, SharedError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: missing or invalid keys [{}]", keys.join(", "))]
    ConfigurationError { keys: Vec<String> },

    #[error("Seeding failed: {reason}")]
    SeedingError { reason: String },

    #[error("Iteration {iteration} failed: {source}")]
    IterationFailure {
        iteration: u32,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("Checkpoint error: {message}")]
    CheckpointError { message: String },

    #[error("Checkpoint version {found} is not supported (expected {expected})")]
    CheckpointVersion { found: u32, expected: u32 },

    #[error("Storage operation failed: {operation} on {path}")]
    StorageError {
        operation: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run state error: {message}")]
    StateError { message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Binary serialization error: {message}")]
    SerializationError { message: String },
}

impl OrchestratorError {
    pub fn config_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ConfigurationError {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn seeding(reason: impl Into<String>) -> Self {
        Self::SeedingError { reason: reason.into() }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::CheckpointError { message: message.into() }
    }

    pub fn storage(operation: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::StorageError {
            operation: operation.to_string(),
            path: path.display().to_string(),
            source,
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::StateError { message: message.into() }
    }
}

impl From<bincode::Error> for OrchestratorError {
    fn from(err: bincode::Error) -> Self {
        Self::SerializationError { message: err.to_string() }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// A statistic that could not be computed for one cluster
///
/// Never fatal: the orchestrator substitutes [`crate::core::residual::SENTINEL_RESIDUAL`]
/// and logs the anomaly with its iteration and cluster.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericAnomaly {
    #[error("cluster {cluster} has no rows")]
    EmptyRows { cluster: ClusterId },

    #[error("cluster {cluster} has no columns")]
    EmptyColumns { cluster: ClusterId },

    #[error("cluster {cluster} has no finite values")]
    NoFiniteValues { cluster: ClusterId },

    #[error("cluster {cluster} produced non-finite value {value}")]
    NonFinite { cluster: ClusterId, value: f64 },
}
