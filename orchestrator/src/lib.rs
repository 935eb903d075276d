//! Orchestrator library for checkpointable iterative clustering
//!
//! A numeric matrix is partitioned into overlapping row and column clusters.
//! Each iteration, pluggable scoring modules rate how well every row and
//! column fits every cluster, the weighted scores drive a dampened membership
//! update, and progress is persisted. Periodic checkpoints let an interrupted
//! run resume exactly where it stopped.

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod scoring;
pub mod services;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use config::{RawConfig, RunConfig};
pub use context::RunContext;
pub use core::{ClusterMembership, ClusterResult, IterationStats, ScoreMatrix};
pub use error::{NumericAnomaly, OrchestratorError, OrchestratorResult};
pub use orchestrator::{RunOrchestrator, RunSummary};
pub use state::RunPhase;
pub use traits::{Checkpoint, CheckpointStore, PersistenceStore, RunMetadata, RunMetadataUpdate};
