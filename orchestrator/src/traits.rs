//! Storage trait definitions with mockall annotations for testing
//!
//! The orchestrator talks to durable storage only through these traits. They
//! are used for dependency injection: the binary wires in the file-backed
//! stores, tests use mocks or the in-memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::RunId;

use crate::config::RunConfig;
use crate::core::iteration::{ClusterResult, IterationStats, RunTally};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Layout version of [`Checkpoint`]
pub const CHECKPOINT_VERSION: u32 = 2;

/// Opaque state of one scoring module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCheckpoint {
    pub name: String,
    pub data: Vec<u8>,
}

/// Full resumable run state after `iteration`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Always the first field so it can be read ahead of the rest
    pub version: u32,
    pub run_id: RunId,
    pub iteration: u32,
    pub config: RunConfig,
    pub membership: Vec<u8>,
    pub row_modules: Vec<ModuleCheckpoint>,
    pub column_modules: Vec<ModuleCheckpoint>,
    pub tally: RunTally,
}

impl Checkpoint {
    pub fn to_bytes(&self) -> OrchestratorResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a checkpoint, rejecting other layout versions
    pub fn from_bytes(bytes: &[u8]) -> OrchestratorResult<Self> {
        let version: u32 = bincode::deserialize(bytes)?;
        if version != CHECKPOINT_VERSION {
            return Err(OrchestratorError::CheckpointVersion {
                found: version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Run-level bookkeeping kept next to the results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Option<RunId>,
    pub num_iterations: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    /// Last iteration whose results and stats are durable
    pub last_iteration: Option<u32>,
    #[serde(default)]
    pub resumed_at: Vec<DateTime<Utc>>,
    pub last_progress: Option<DateTime<Utc>>,
}

/// Partial update of [`RunMetadata`]; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadataUpdate {
    pub run_id: Option<RunId>,
    pub num_iterations: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub last_iteration: Option<u32>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl RunMetadataUpdate {
    pub fn started(run_id: RunId, num_iterations: u32, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Some(run_id),
            num_iterations: Some(num_iterations),
            start_time: Some(now),
            ..Self::default()
        }
    }

    pub fn resumed(now: DateTime<Utc>) -> Self {
        Self {
            resumed_at: Some(now),
            ..Self::default()
        }
    }

    pub fn completed_iteration(iteration: u32) -> Self {
        Self {
            last_iteration: Some(iteration),
            ..Self::default()
        }
    }

    pub fn finished(now: DateTime<Utc>) -> Self {
        Self {
            finish_time: Some(now),
            ..Self::default()
        }
    }
}

impl RunMetadata {
    /// Merge `update` in, stamping `now` as the last sign of progress
    pub fn apply(&mut self, update: RunMetadataUpdate, now: DateTime<Utc>) {
        if let Some(run_id) = update.run_id {
            // A fresh start wipes the previous run's bookkeeping
            *self = RunMetadata {
                run_id: Some(run_id),
                ..RunMetadata::default()
            };
        }
        if update.num_iterations.is_some() {
            self.num_iterations = update.num_iterations;
        }
        if update.start_time.is_some() {
            self.start_time = update.start_time;
        }
        if update.finish_time.is_some() {
            self.finish_time = update.finish_time;
        }
        if update.last_iteration.is_some() {
            self.last_iteration = update.last_iteration;
        }
        if let Some(at) = update.resumed_at {
            self.resumed_at.push(at);
            self.finish_time = None;
        }
        self.last_progress = Some(now);
    }
}

/// Durable results, statistics and run metadata
///
/// Calls are awaited one at a time; an implementation must have made a write
/// durable before its future resolves.
#[mockall::automock]
#[async_trait::async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Prepare an empty store for a fresh run, discarding earlier contents
    async fn create_schema(&self) -> OrchestratorResult<()>;

    /// Append the per-cluster results of one iteration
    ///
    /// # Parameters
    /// - `iteration`: Iteration the results belong to
    /// - `results`: One entry per cluster
    async fn write_results(&self, iteration: u32, results: &[ClusterResult]) -> OrchestratorResult<()>;

    /// Append the aggregate statistics of one iteration
    async fn write_stats(&self, stats: &IterationStats) -> OrchestratorResult<()>;

    /// Merge a partial update into the run metadata
    async fn write_run_metadata(&self, update: RunMetadataUpdate) -> OrchestratorResult<()>;

    async fn read_run_metadata(&self) -> OrchestratorResult<RunMetadata>;

    /// All stats records in write order
    async fn read_stats(&self) -> OrchestratorResult<Vec<IterationStats>>;

    /// Results of one iteration, or of all iterations with `None`
    async fn read_results(&self, iteration: Option<u32>) -> OrchestratorResult<Vec<ClusterResult>>;

    /// Drop results and stats of iterations after `iteration`
    ///
    /// Called when resuming from a checkpoint so the replayed iterations are
    /// not recorded twice. The progress marker is capped at `iteration`.
    async fn truncate_after(&self, iteration: u32) -> OrchestratorResult<()>;
}

/// Durable run checkpoints keyed by iteration
#[mockall::automock]
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint; must not leave a partial file behind on failure
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()>;

    async fn load(&self, iteration: u32) -> OrchestratorResult<Checkpoint>;

    /// Highest saved iteration, if any
    async fn latest(&self) -> OrchestratorResult<Option<u32>>;

    /// Remove every checkpoint
    async fn clear(&self) -> OrchestratorResult<()>;
}

/// Write a complete iteration: results, then stats, then the progress marker
pub async fn write_iteration<P: PersistenceStore + ?Sized>(
    store: &P,
    iteration: u32,
    results: &[ClusterResult],
    stats: &IterationStats,
) -> OrchestratorResult<()> {
    store.write_results(iteration, results).await?;
    store.write_stats(stats).await?;
    store
        .write_run_metadata(RunMetadataUpdate::completed_iteration(iteration))
        .await
}
