//! Main run orchestrator
//!
//! Drives one clustering run from seeding (or a checkpoint) to the final
//! post-adjustment. Storage is injected; everything else is computed in
//! process. The loop is strictly sequential: each store call is awaited
//! before the next step starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use shared::{logging, run_debug, run_info, run_warn, ClusterId, Matrix, RunId};

use crate::config::{RawConfig, RunConfig};
use crate::context::RunContext;
use crate::core::iteration::{median, ClusterResult, IterationResult, IterationStats, RunTally};
use crate::core::membership::ClusterMembership;
use crate::core::residual::{cluster_residual, SENTINEL_RESIDUAL};
use crate::core::scores::ScoreMatrix;
use crate::core::seeding::{column_seeder_for, row_seeder_for};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scoring::combiner::{member_mean, ScoringCombiner};
use crate::scoring::functions::build_function;
use crate::scoring::module::ScheduledModule;
use crate::scoring::traits::{ScoringFunction, ScoringInput};
use crate::scoring::types::{Scaling, Schedule, ScoreSide};
use crate::state::{RunPhase, RunState};
use crate::traits::{
    write_iteration, Checkpoint, CheckpointStore, PersistenceStore, RunMetadataUpdate, CHECKPOINT_VERSION,
};

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub first_iteration: u32,
    pub last_iteration: u32,
    pub postadjusted: bool,
    pub degradations: usize,
    pub anomalies: u32,
    pub final_median_residual: Option<f64>,
}

/// Everything a prepared or restored run needs to iterate
struct ActiveRun {
    config: RunConfig,
    ctx: RunContext,
    membership: ClusterMembership,
    row_scoring: ScoringCombiner,
    column_scoring: ScoringCombiner,
    start_iteration: u32,
    resumed: bool,
    tally: RunTally,
}

/// Orchestrates one run over an injected persistence and checkpoint store
pub struct RunOrchestrator<P, C>
where
    P: PersistenceStore,
    C: CheckpointStore,
{
    matrix: Arc<Matrix>,
    persistence: P,
    checkpoints: C,
    state: RunState,
    /// Modules added in code, merged with the configured ones
    extra_modules: Vec<ScheduledModule>,
    active: Option<ActiveRun>,
}

impl<P, C> RunOrchestrator<P, C>
where
    P: PersistenceStore,
    C: CheckpointStore,
{
    pub fn new(matrix: Arc<Matrix>, persistence: P, checkpoints: C) -> Self {
        Self {
            matrix,
            persistence,
            checkpoints,
            state: RunState::new(),
            extra_modules: Vec::new(),
            active: None,
        }
    }

    /// Add a scoring module that is not described by the configuration
    ///
    /// Must be called before [`Self::prepare_run`] or
    /// [`Self::init_from_checkpoint`]; a resumed run needs the same modules.
    pub fn with_module(mut self, function: Box<dyn ScoringFunction>, schedule: Schedule, scaling: Scaling) -> Self {
        self.extra_modules.push(ScheduledModule::new(function, schedule, scaling));
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase()
    }

    pub fn config(&self) -> Option<&RunConfig> {
        self.active.as_ref().map(|run| &run.config)
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| *run.ctx.run_id())
    }

    pub fn membership(&self) -> Option<&ClusterMembership> {
        self.active.as_ref().map(|run| &run.membership)
    }

    pub fn start_iteration(&self) -> Option<u32> {
        self.active.as_ref().map(|run| run.start_iteration)
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    fn ensure_not_started(&self) -> OrchestratorResult<()> {
        if self.state.phase() != RunPhase::NotStarted || self.active.is_some() {
            return Err(OrchestratorError::state("run has already been prepared"));
        }
        Ok(())
    }

    fn build_combiners(&mut self, config: &RunConfig) -> OrchestratorResult<(ScoringCombiner, ScoringCombiner)> {
        let mut rows = ScoringCombiner::new(ScoreSide::Rows, config.normalize_scores);
        let mut columns = ScoringCombiner::new(ScoreSide::Columns, config.normalize_scores);

        for module in config.row_scoring.iter().chain(&config.column_scoring) {
            let function = build_function(module)?;
            let scheduled = ScheduledModule::new(function, module.schedule.clone(), module.scaling);
            match scheduled.side() {
                ScoreSide::Rows => rows.push(scheduled)?,
                ScoreSide::Columns => columns.push(scheduled)?,
            }
        }
        for scheduled in self.extra_modules.drain(..) {
            match scheduled.side() {
                ScoreSide::Rows => rows.push(scheduled)?,
                ScoreSide::Columns => columns.push(scheduled)?,
            }
        }
        Ok((rows, columns))
    }

    /// Resolve the configuration, reset storage and seed a fresh membership
    pub async fn prepare_run(&mut self, raw: &RawConfig) -> OrchestratorResult<()> {
        self.ensure_not_started()?;
        let config = RunConfig::resolve(raw, self.matrix.num_rows())?;

        self.checkpoints.clear().await?;
        self.persistence.create_schema().await?;

        let ctx = RunContext::new(RunId::new(), config.random_seed);
        let row_seeder = row_seeder_for(config.row_seeding);
        let column_seeder = column_seeder_for(config.column_seeding);
        let membership = ClusterMembership::create(
            &ctx,
            &self.matrix,
            row_seeder.as_ref(),
            column_seeder.as_ref(),
            &config,
        )?;
        let (row_scoring, column_scoring) = self.build_combiners(&config)?;

        logging::log_startup(
            ctx.run_id(),
            &format!(
                "run on {}x{} matrix: {} clusters, {} iterations, seed {}",
                self.matrix.num_rows(),
                self.matrix.num_columns(),
                config.num_clusters,
                config.num_iterations,
                config.random_seed
            ),
        );

        self.active = Some(ActiveRun {
            start_iteration: config.start_iteration,
            config,
            ctx,
            membership,
            row_scoring,
            column_scoring,
            resumed: false,
            tally: RunTally::default(),
        });
        Ok(())
    }

    /// Restore a run from the checkpoint of `iteration`, or the latest one
    pub async fn init_from_checkpoint(&mut self, iteration: Option<u32>) -> OrchestratorResult<()> {
        self.ensure_not_started()?;
        let iteration = match iteration {
            Some(it) => it,
            None => self
                .checkpoints
                .latest()
                .await?
                .ok_or_else(|| OrchestratorError::checkpoint("no checkpoint to resume from"))?,
        };

        let checkpoint = self.checkpoints.load(iteration).await?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(OrchestratorError::CheckpointVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        let config = checkpoint.config;
        let membership = ClusterMembership::restore_from_checkpoint(&config, &checkpoint.membership)?;
        if !membership.fits_matrix(&self.matrix) {
            return Err(OrchestratorError::checkpoint(format!(
                "checkpoint {iteration} was written for a different matrix"
            )));
        }

        let (mut row_scoring, mut column_scoring) = self.build_combiners(&config)?;
        row_scoring.restore_modules(&checkpoint.row_modules)?;
        column_scoring.restore_modules(&checkpoint.column_modules)?;

        self.persistence.truncate_after(iteration).await?;

        let ctx = RunContext::new(checkpoint.run_id, config.random_seed);
        run_info!(
            ctx.run_id(),
            "♻️ Resuming from checkpoint at iteration {} of {}",
            iteration,
            config.num_iterations
        );

        self.active = Some(ActiveRun {
            start_iteration: iteration + 1,
            config,
            ctx,
            membership,
            row_scoring,
            column_scoring,
            resumed: true,
            tally: checkpoint.tally,
        });
        Ok(())
    }

    /// Run all remaining iterations and the optional post-adjustment
    pub async fn run(&mut self) -> OrchestratorResult<RunSummary> {
        let Self {
            matrix,
            persistence,
            checkpoints,
            state,
            active,
            ..
        } = self;
        let run = active
            .as_mut()
            .ok_or_else(|| OrchestratorError::state("run() called before prepare_run or init_from_checkpoint"))?;
        state.transition(RunPhase::Running)?;

        match run.execute(matrix, persistence, checkpoints, state).await {
            Ok(summary) => {
                state.transition(RunPhase::Finished)?;
                logging::log_success(
                    &summary.run_id,
                    &format!("Run finished after iteration {}", summary.last_iteration),
                );
                Ok(summary)
            }
            Err(err) => {
                state.fail();
                logging::log_error(run.ctx.run_id(), "Run", &err);
                Err(err)
            }
        }
    }
}

impl ActiveRun {
    async fn execute<P, C>(
        &mut self,
        matrix: &Matrix,
        persistence: &P,
        checkpoints: &C,
        state: &mut RunState,
    ) -> OrchestratorResult<RunSummary>
    where
        P: PersistenceStore,
        C: CheckpointStore,
    {
        if self.resumed {
            persistence
                .write_run_metadata(RunMetadataUpdate::resumed(Utc::now()))
                .await?;
        } else {
            persistence
                .write_run_metadata(RunMetadataUpdate::started(
                    *self.ctx.run_id(),
                    self.config.num_iterations,
                    Utc::now(),
                ))
                .await?;
        }

        let num_iterations = self.config.num_iterations;
        for iteration in self.start_iteration..=num_iterations {
            state.set_iteration(iteration);
            self.run_iteration(matrix, persistence, checkpoints, state, iteration)
                .await
                .map_err(|e| OrchestratorError::IterationFailure {
                    iteration,
                    source: Box::new(e),
                })?;
        }

        if self.config.postadjust {
            state.transition(RunPhase::PostAdjusting)?;
            let iteration = num_iterations + 1;
            state.set_iteration(iteration);
            self.postadjust(matrix, persistence)
                .await
                .map_err(|e| OrchestratorError::IterationFailure {
                    iteration,
                    source: Box::new(e),
                })?;
        }

        persistence
            .write_run_metadata(RunMetadataUpdate::finished(Utc::now()))
            .await?;

        Ok(RunSummary {
            run_id: *self.ctx.run_id(),
            first_iteration: self.start_iteration,
            last_iteration: num_iterations,
            postadjusted: self.config.postadjust,
            degradations: self.tally.total_degradations,
            anomalies: self.tally.total_anomalies,
            final_median_residual: self.tally.last_median,
        })
    }

    /// Row then column scores for the current membership
    fn score(&mut self, matrix: &Matrix, iteration: u32, force: bool, result: &mut IterationResult) -> (ScoreMatrix, ScoreMatrix) {
        let input = ScoringInput {
            ctx: &self.ctx,
            iteration,
            num_iterations: self.config.num_iterations,
            matrix,
            membership: &self.membership,
        };
        if force {
            let rows = self.row_scoring.compute_force(&input, result);
            let columns = self.column_scoring.compute_force(&input, result);
            (rows, columns)
        } else {
            let rows = self.row_scoring.compute(&input, result);
            let columns = self.column_scoring.compute(&input, result);
            (rows, columns)
        }
    }

    async fn run_iteration<P, C>(
        &mut self,
        matrix: &Matrix,
        persistence: &P,
        checkpoints: &C,
        state: &mut RunState,
        iteration: u32,
    ) -> OrchestratorResult<()>
    where
        P: PersistenceStore,
        C: CheckpointStore,
    {
        let mut result = IterationResult::new(iteration);
        let (row_scores, col_scores) = self.score(matrix, iteration, false, &mut result);
        self.membership.update(
            &self.ctx,
            matrix,
            &row_scores,
            &col_scores,
            self.config.num_iterations,
            &mut result,
        )?;
        self.tally.note_degradations(&result.degradations);

        let write_results = self.config.is_result_iteration(iteration);
        let write_stats = self.config.is_stats_iteration(iteration);
        if write_results || write_stats {
            let (results, anomalies) = self.cluster_results(matrix, iteration);
            if write_results {
                persistence.write_results(iteration, &results).await?;
            }
            if write_stats {
                let stats = self.iteration_stats(&result, &results, anomalies);
                persistence.write_stats(&stats).await?;
                persistence
                    .write_run_metadata(RunMetadataUpdate::completed_iteration(iteration))
                    .await?;
                logging::log_progress(
                    self.ctx.run_id(),
                    &format!("Iteration {}/{}", iteration, self.config.num_iterations),
                    &format!(
                        "median residual {:.4}, {} row / {} column changes",
                        stats.median_residual, stats.row_changes, stats.col_changes
                    ),
                );
            }
        } else {
            run_debug!(
                self.ctx.run_id(),
                "Iteration {} done: {} row / {} column changes",
                iteration,
                result.row_changes,
                result.col_changes
            );
        }

        // A checkpoint for iteration K implies K's records are already durable
        if self.config.is_checkpoint_iteration(iteration) {
            state.transition(RunPhase::Checkpointing)?;
            self.save_checkpoint(checkpoints, iteration).await?;
            state.transition(RunPhase::Running)?;
        }
        Ok(())
    }

    async fn save_checkpoint<C: CheckpointStore>(&self, checkpoints: &C, iteration: u32) -> OrchestratorResult<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            run_id: *self.ctx.run_id(),
            iteration,
            config: self.config.clone(),
            membership: self.membership.checkpoint_blob()?,
            row_modules: self.row_scoring.checkpoint_modules()?,
            column_modules: self.column_scoring.checkpoint_modules()?,
            tally: self.tally.clone(),
        };
        checkpoints.save(&checkpoint).await?;
        run_info!(self.ctx.run_id(), "💾 Checkpoint saved at iteration {}", iteration);
        Ok(())
    }

    /// Per-cluster membership and residuals; anomalies become the sentinel
    fn cluster_results(&mut self, matrix: &Matrix, iteration: u32) -> (Vec<ClusterResult>, u32) {
        let mut anomalies = 0;
        let results = ClusterId::all(self.config.num_clusters)
            .map(|cluster| {
                let rows = self.membership.row_indices_for_cluster(cluster);
                let columns = self.membership.column_indices_for_cluster(cluster);
                let residual = match cluster_residual(matrix, cluster, rows, columns) {
                    Ok(value) => value,
                    Err(anomaly) => {
                        anomalies += 1;
                        run_warn!(
                            self.ctx.run_id(),
                            iteration = iteration,
                            cluster = cluster.get(),
                            "Residual of cluster {} on iteration {} replaced by {}: {}",
                            cluster,
                            iteration,
                            SENTINEL_RESIDUAL,
                            anomaly
                        );
                        SENTINEL_RESIDUAL
                    }
                };
                ClusterResult {
                    iteration,
                    cluster,
                    rows: self.membership.rows_for_cluster(cluster),
                    columns: self.membership.columns_for_cluster(cluster),
                    residual,
                }
            })
            .collect();
        self.tally.total_anomalies += anomalies;
        (results, anomalies)
    }

    fn iteration_stats(&mut self, result: &IterationResult, clusters: &[ClusterResult], anomalies: u32) -> IterationStats {
        let cluster_residuals: Vec<f64> = clusters.iter().map(|c| c.residual).collect();
        let median_residual = median(&cluster_residuals).unwrap_or(SENTINEL_RESIDUAL);
        self.tally.last_median = Some(median_residual);

        let mut module_means = BTreeMap::new();
        for sub in &result.subresults {
            if let Some(mean) = member_mean(&sub.scores, &self.membership, sub.side) {
                module_means.insert(sub.module.clone(), mean);
            }
        }

        IterationStats {
            iteration: result.iteration,
            median_residual,
            cluster_residuals,
            fuzzy_coeff: result.fuzzy_coeff,
            module_means,
            row_changes: result.row_changes,
            col_changes: result.col_changes,
            anomalies,
            degradations: self.tally.take_pending(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Greedy clean-up pass, recorded as iteration `num_iterations + 1`
    async fn postadjust<P: PersistenceStore>(&mut self, matrix: &Matrix, persistence: &P) -> OrchestratorResult<()> {
        let iteration = self.config.num_iterations + 1;

        let mut adjust = IterationResult::new(iteration);
        let (row_scores, col_scores) = self.score(matrix, iteration, true, &mut adjust);
        let (row_changes, col_changes) = self.membership.postadjust(&row_scores, &col_scores)?;
        self.tally.note_degradations(&adjust.degradations);

        // The rescoring pass repeats the failures already noted above
        let mut result = IterationResult::new(iteration);
        self.score(matrix, iteration, true, &mut result);
        result.row_changes = row_changes;
        result.col_changes = col_changes;

        let (results, anomalies) = self.cluster_results(matrix, iteration);
        let stats = self.iteration_stats(&result, &results, anomalies);
        write_iteration(persistence, iteration, &results, &stats).await?;

        run_info!(
            self.ctx.run_id(),
            "🧹 Post-adjustment moved {} row and {} column memberships, median residual {:.4}",
            row_changes,
            col_changes,
            stats.median_residual
        );
        Ok(())
    }
}
