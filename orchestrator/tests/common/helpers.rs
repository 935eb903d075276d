//! Test helpers: store wrappers, failing modules and assertions

use async_trait::async_trait;
use shared::ClusterId;

use orchestrator::core::{ClusterResult, IterationStats, ScoreMatrix};
use orchestrator::scoring::{ScoringError, ScoringFunction, ScoringInput, ScoringKind};
use orchestrator::services::InMemoryStore;
use orchestrator::{
    ClusterMembership, OrchestratorError, OrchestratorResult, PersistenceStore, RunMetadata, RunMetadataUpdate,
};

use super::fixtures::TestFixtures;

/// Persistence store that dies right after writing the results of one iteration
///
/// The results reach the inner store before the error is returned, which is
/// what a process kill between the results write and the stats write leaves
/// behind.
#[derive(Clone)]
pub struct FlakyPersistence {
    inner: InMemoryStore,
    crash_after_results_of: u32,
}

impl FlakyPersistence {
    pub fn new(inner: InMemoryStore, crash_after_results_of: u32) -> Self {
        Self {
            inner,
            crash_after_results_of,
        }
    }
}

#[async_trait]
impl PersistenceStore for FlakyPersistence {
    async fn create_schema(&self) -> OrchestratorResult<()> {
        self.inner.create_schema().await
    }

    async fn write_results(&self, iteration: u32, results: &[ClusterResult]) -> OrchestratorResult<()> {
        self.inner.write_results(iteration, results).await?;
        if iteration == self.crash_after_results_of {
            return Err(OrchestratorError::state(format!("simulated crash after results of {iteration}")));
        }
        Ok(())
    }

    async fn write_stats(&self, stats: &IterationStats) -> OrchestratorResult<()> {
        self.inner.write_stats(stats).await
    }

    async fn write_run_metadata(&self, update: RunMetadataUpdate) -> OrchestratorResult<()> {
        self.inner.write_run_metadata(update).await
    }

    async fn read_run_metadata(&self) -> OrchestratorResult<RunMetadata> {
        self.inner.read_run_metadata().await
    }

    async fn read_stats(&self) -> OrchestratorResult<Vec<IterationStats>> {
        self.inner.read_stats().await
    }

    async fn read_results(&self, iteration: Option<u32>) -> OrchestratorResult<Vec<ClusterResult>> {
        self.inner.read_results(iteration).await
    }

    async fn truncate_after(&self, iteration: u32) -> OrchestratorResult<()> {
        self.inner.truncate_after(iteration).await
    }
}

/// Row scoring module that fails on every call
pub struct AlwaysFailing {
    pub name: String,
}

impl AlwaysFailing {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl ScoringFunction for AlwaysFailing {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        ScoringKind::Row
    }

    fn compute(&mut self, _input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        Err(ScoringError::failed("upstream tool unavailable"))
    }
}

pub struct TestHelpers;

impl TestHelpers {
    /// Row and column labels of every cluster, in cluster id order
    pub fn assignment(membership: &ClusterMembership) -> Vec<(Vec<String>, Vec<String>)> {
        ClusterId::all(membership.num_clusters())
            .map(|k| (membership.rows_for_cluster(k), membership.columns_for_cluster(k)))
            .collect()
    }

    /// Share of a block's rows that belong to the block's most common cluster
    pub fn dominant_share(membership: &ClusterMembership, block: usize) -> f64 {
        let rows: Vec<usize> = (0..TestFixtures::ROWS)
            .filter(|&r| TestFixtures::block_of_row(r) == block)
            .collect();
        ClusterId::all(membership.num_clusters())
            .map(|k| rows.iter().filter(|&&r| membership.is_row_member(r, k)).count())
            .max()
            .unwrap_or(0) as f64
            / rows.len() as f64
    }

    /// Cluster holding most of a block's rows
    pub fn dominant_cluster(membership: &ClusterMembership, block: usize) -> ClusterId {
        ClusterId::all(membership.num_clusters())
            .max_by_key(|&k| {
                (0..TestFixtures::ROWS)
                    .filter(|&r| TestFixtures::block_of_row(r) == block && membership.is_row_member(r, k))
                    .count()
            })
            .expect("At least one cluster")
    }

    pub fn stats_iterations(stats: &[IterationStats]) -> Vec<u32> {
        stats.iter().map(|s| s.iteration).collect()
    }
}
