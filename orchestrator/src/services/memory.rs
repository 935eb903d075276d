//! In-memory store implementing both storage traits
//!
//! Clones share the same state, which lets a test keep a handle on what a run
//! wrote and hand the same store to a second, resumed run.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::core::iteration::{ClusterResult, IterationStats};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{Checkpoint, CheckpointStore, PersistenceStore, RunMetadata, RunMetadataUpdate};

#[derive(Debug, Default)]
struct Inner {
    metadata: RunMetadata,
    results: Vec<ClusterResult>,
    stats: Vec<IterationStats>,
    /// Encoded, so loads go through the same decoding as file checkpoints
    checkpoints: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn checkpoint_iterations(&self) -> Vec<u32> {
        self.inner.lock().await.checkpoints.keys().copied().collect()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn create_schema(&self) -> OrchestratorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.metadata = RunMetadata::default();
        inner.results.clear();
        inner.stats.clear();
        Ok(())
    }

    async fn write_results(&self, _iteration: u32, results: &[ClusterResult]) -> OrchestratorResult<()> {
        self.inner.lock().await.results.extend_from_slice(results);
        Ok(())
    }

    async fn write_stats(&self, stats: &IterationStats) -> OrchestratorResult<()> {
        self.inner.lock().await.stats.push(stats.clone());
        Ok(())
    }

    async fn write_run_metadata(&self, update: RunMetadataUpdate) -> OrchestratorResult<()> {
        self.inner.lock().await.metadata.apply(update, Utc::now());
        Ok(())
    }

    async fn read_run_metadata(&self) -> OrchestratorResult<RunMetadata> {
        Ok(self.inner.lock().await.metadata.clone())
    }

    async fn read_stats(&self) -> OrchestratorResult<Vec<IterationStats>> {
        Ok(self.inner.lock().await.stats.clone())
    }

    async fn read_results(&self, iteration: Option<u32>) -> OrchestratorResult<Vec<ClusterResult>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .results
            .iter()
            .filter(|r| iteration.map_or(true, |it| r.iteration == it))
            .cloned()
            .collect())
    }

    async fn truncate_after(&self, iteration: u32) -> OrchestratorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.results.retain(|r| r.iteration <= iteration);
        inner.stats.retain(|s| s.iteration <= iteration);
        inner.metadata.last_iteration = inner.metadata.last_iteration.map(|last| last.min(iteration));
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        let bytes = checkpoint.to_bytes()?;
        self.inner.lock().await.checkpoints.insert(checkpoint.iteration, bytes);
        Ok(())
    }

    async fn load(&self, iteration: u32) -> OrchestratorResult<Checkpoint> {
        let inner = self.inner.lock().await;
        let bytes = inner
            .checkpoints
            .get(&iteration)
            .ok_or_else(|| OrchestratorError::checkpoint(format!("no checkpoint for iteration {iteration}")))?;
        Checkpoint::from_bytes(bytes)
    }

    async fn latest(&self) -> OrchestratorResult<Option<u32>> {
        Ok(self.inner.lock().await.checkpoints.keys().next_back().copied())
    }

    async fn clear(&self) -> OrchestratorResult<()> {
        self.inner.lock().await.checkpoints.clear();
        Ok(())
    }
}
