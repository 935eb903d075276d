//! Scheduled scoring modules
//!
//! Wraps a [`ScoringFunction`] with its schedule, its weight and the last
//! matrix it produced. Off-schedule iterations and failures both fall back to
//! that cached matrix.

use serde::{Deserialize, Serialize};
use shared::run_warn;

use super::traits::{ScoringError, ScoringFunction, ScoringInput};
use super::types::{Scaling, Schedule, ScoreSide, ScoringDegradation, ScoringKind};
use crate::core::iteration::IterationResult;
use crate::core::scores::ScoreMatrix;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Checkpointed state of one module
#[derive(Debug, Serialize, Deserialize)]
struct ModuleState {
    cache: Option<ScoreMatrix>,
    inner: Vec<u8>,
}

pub struct ScheduledModule {
    function: Box<dyn ScoringFunction>,
    schedule: Schedule,
    scaling: Scaling,
    cache: Option<ScoreMatrix>,
}

impl ScheduledModule {
    pub fn new(function: Box<dyn ScoringFunction>, schedule: Schedule, scaling: Scaling) -> Self {
        Self {
            function,
            schedule,
            scaling,
            cache: None,
        }
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn kind(&self) -> ScoringKind {
        self.function.kind()
    }

    pub fn side(&self) -> ScoreSide {
        self.kind().side()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn weight(&self, iteration: u32, num_iterations: u32) -> f64 {
        self.scaling.weight(iteration, num_iterations)
    }

    /// Most recent matrix, if any iteration has produced one
    pub fn cached(&self) -> Option<&ScoreMatrix> {
        self.cache.as_ref()
    }

    /// Scores for this iteration, recomputed only when scheduled
    pub fn compute(&mut self, input: &ScoringInput<'_>, result: &mut IterationResult) -> ScoreMatrix {
        if self.schedule.contains(input.iteration) || self.cache.is_none() {
            self.compute_force(input, result)
        } else {
            self.fallback(input)
        }
    }

    /// Recompute regardless of the schedule
    pub fn compute_force(&mut self, input: &ScoringInput<'_>, result: &mut IterationResult) -> ScoreMatrix {
        match self.try_compute(input) {
            Ok(scores) => {
                self.cache = Some(scores.clone());
                scores
            }
            Err(err) => {
                run_warn!(
                    input.ctx.run_id(),
                    iteration = input.iteration,
                    module = self.name(),
                    "Scoring module '{}' degraded on iteration {}: {}",
                    self.name(),
                    input.iteration,
                    err
                );
                result.degradations.push(ScoringDegradation {
                    iteration: input.iteration,
                    module: self.name().to_string(),
                    reason: err.to_string(),
                });
                self.fallback(input)
            }
        }
    }

    fn expected_shape(&self, input: &ScoringInput<'_>) -> (usize, usize) {
        let items = match self.side() {
            ScoreSide::Rows => input.matrix.num_rows(),
            ScoreSide::Columns => input.matrix.num_columns(),
        };
        (items, input.num_clusters())
    }

    fn try_compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        let expected = self.expected_shape(input);
        let scores = self.function.compute(input)?;
        let found = (scores.items(), scores.clusters());
        if found != expected {
            return Err(ScoringError::ShapeMismatch { expected, found });
        }
        Ok(scores)
    }

    fn fallback(&self, input: &ScoringInput<'_>) -> ScoreMatrix {
        let (items, clusters) = self.expected_shape(input);
        self.cache
            .clone()
            .unwrap_or_else(|| ScoreMatrix::zeros(items, clusters))
    }

    pub fn checkpoint_data(&self) -> OrchestratorResult<Vec<u8>> {
        let inner = self
            .function
            .checkpoint_data()
            .map_err(|e| OrchestratorError::checkpoint(format!("module '{}': {e}", self.name())))?;
        Ok(bincode::serialize(&ModuleState {
            cache: self.cache.clone(),
            inner,
        })?)
    }

    pub fn restore_checkpoint_data(&mut self, data: &[u8]) -> OrchestratorResult<()> {
        let state: ModuleState = bincode::deserialize(data)?;
        self.function
            .restore_checkpoint_data(&state.inner)
            .map_err(|e| OrchestratorError::checkpoint(format!("module '{}': {e}", self.name())))?;
        self.cache = state.cache;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::testing::{fixture_input, CountingFunction, FailingFunction};
    use shared::RunId;

    #[test]
    fn test_off_schedule_iterations_return_cached_matrix() {
        let ctx = crate::context::RunContext::new(RunId::new(), 1);
        let (matrix, membership) = fixture_input(&ctx);
        let mut module = ScheduledModule::new(
            Box::new(CountingFunction::new("count", ScoringKind::Row)),
            Schedule::every(1, 3),
            Scaling::default(),
        );

        let mut outputs = Vec::new();
        for iteration in 1..=6 {
            let input = ScoringInput {
                ctx: &ctx,
                iteration,
                num_iterations: 6,
                matrix: &matrix,
                membership: &membership,
            };
            let mut result = IterationResult::new(iteration);
            outputs.push(module.compute(&input, &mut result));
        }

        // Scheduled on 1 and 4
        assert_eq!(outputs[1], outputs[0]);
        assert_eq!(outputs[2], outputs[0]);
        assert_ne!(outputs[3], outputs[0]);
        assert_eq!(outputs[4], outputs[3]);
        assert_eq!(outputs[5], outputs[3]);
    }

    #[test]
    fn test_failure_falls_back_and_records_degradation() {
        let ctx = crate::context::RunContext::new(RunId::new(), 1);
        let (matrix, membership) = fixture_input(&ctx);
        let mut module = ScheduledModule::new(
            Box::new(FailingFunction::new("broken", ScoringKind::Row)),
            Schedule::always(),
            Scaling::default(),
        );

        let input = ScoringInput {
            ctx: &ctx,
            iteration: 2,
            num_iterations: 5,
            matrix: &matrix,
            membership: &membership,
        };
        let mut result = IterationResult::new(2);
        let scores = module.compute(&input, &mut result);

        assert_eq!(scores, ScoreMatrix::zeros(matrix.num_rows(), membership.num_clusters()));
        assert_eq!(result.degradations.len(), 1);
        assert_eq!(result.degradations[0].module, "broken");
        assert_eq!(result.degradations[0].iteration, 2);
    }

    #[test]
    fn test_checkpoint_restores_cache() {
        let ctx = crate::context::RunContext::new(RunId::new(), 1);
        let (matrix, membership) = fixture_input(&ctx);
        let mut module = ScheduledModule::new(
            Box::new(CountingFunction::new("count", ScoringKind::Row)),
            Schedule::every(1, 10),
            Scaling::default(),
        );
        let input = ScoringInput {
            ctx: &ctx,
            iteration: 1,
            num_iterations: 10,
            matrix: &matrix,
            membership: &membership,
        };
        let first = module.compute(&input, &mut IterationResult::new(1));
        let blob = module.checkpoint_data().unwrap();

        let mut restored = ScheduledModule::new(
            Box::new(CountingFunction::new("count", ScoringKind::Row)),
            Schedule::every(1, 10),
            Scaling::default(),
        );
        restored.restore_checkpoint_data(&blob).unwrap();
        let input = ScoringInput { iteration: 2, ..input };
        assert_eq!(restored.compute(&input, &mut IterationResult::new(2)), first);
    }
}
