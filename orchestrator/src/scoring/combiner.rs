//! Weighted combination of scoring modules
//!
//! One combiner per matrix side. Each module yields a matrix, optionally
//! standardised, which is weighted by the module's scaling for the current
//! iteration and summed cell by cell.

use shared::run_debug;

use super::module::ScheduledModule;
use super::traits::ScoringInput;
use super::types::ScoreSide;
use crate::core::iteration::{IterationResult, SubResult};
use crate::core::membership::ClusterMembership;
use crate::core::scores::ScoreMatrix;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::ModuleCheckpoint;

pub struct ScoringCombiner {
    side: ScoreSide,
    normalize: bool,
    modules: Vec<ScheduledModule>,
}

impl ScoringCombiner {
    pub fn new(side: ScoreSide, normalize: bool) -> Self {
        Self {
            side,
            normalize,
            modules: Vec::new(),
        }
    }

    pub fn side(&self) -> ScoreSide {
        self.side
    }

    pub fn push(&mut self, module: ScheduledModule) -> OrchestratorResult<()> {
        if module.side() != self.side {
            return Err(OrchestratorError::state(format!(
                "module '{}' scores {:?}, combiner scores {:?}",
                module.name(),
                module.side(),
                self.side
            )));
        }
        if self.modules.iter().any(|m| m.name() == module.name()) {
            return Err(OrchestratorError::state(format!("duplicate scoring module '{}'", module.name())));
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn modules(&self) -> &[ScheduledModule] {
        &self.modules
    }

    /// Combined scores for this iteration, honouring module schedules
    pub fn compute(&mut self, input: &ScoringInput<'_>, result: &mut IterationResult) -> ScoreMatrix {
        let parts: Vec<(ScoreMatrix, f64)> = self
            .modules
            .iter_mut()
            .map(|m| {
                let weight = m.weight(input.iteration, input.num_iterations);
                (m.compute(input, result), weight)
            })
            .collect();
        self.finish(input, parts, result)
    }

    /// Combined scores with every module recomputed
    pub fn compute_force(&mut self, input: &ScoringInput<'_>, result: &mut IterationResult) -> ScoreMatrix {
        let parts: Vec<(ScoreMatrix, f64)> = self
            .modules
            .iter_mut()
            .map(|m| {
                let weight = m.weight(input.iteration, input.num_iterations);
                (m.compute_force(input, result), weight)
            })
            .collect();
        self.finish(input, parts, result)
    }

    fn finish(
        &self,
        input: &ScoringInput<'_>,
        parts: Vec<(ScoreMatrix, f64)>,
        result: &mut IterationResult,
    ) -> ScoreMatrix {
        let items = match self.side {
            ScoreSide::Rows => input.matrix.num_rows(),
            ScoreSide::Columns => input.matrix.num_columns(),
        };
        let combined = combine(&parts, self.normalize, items, input.num_clusters());

        for (module, (scores, _)) in self.modules.iter().zip(parts) {
            result.subresults.push(SubResult {
                module: module.name().to_string(),
                side: self.side,
                scores,
            });
        }
        self.log_subresults(input, result);
        combined
    }

    fn log_subresults(&self, input: &ScoringInput<'_>, result: &IterationResult) {
        for sub in result.subresults.iter().filter(|s| s.side == self.side) {
            let finite: Vec<f64> = (0..sub.scores.items())
                .flat_map(|i| sub.scores.row(i).iter().copied())
                .filter(|v| v.is_finite())
                .collect();
            let mean = if finite.is_empty() {
                f64::NAN
            } else {
                finite.iter().sum::<f64>() / finite.len() as f64
            };
            run_debug!(
                input.ctx.run_id(),
                "Iteration {} module '{}': mean score {:.4} over {} finite cells",
                input.iteration,
                sub.module,
                mean,
                finite.len()
            );
        }
    }

    pub fn checkpoint_modules(&self) -> OrchestratorResult<Vec<ModuleCheckpoint>> {
        self.modules
            .iter()
            .map(|m| {
                Ok(ModuleCheckpoint {
                    name: m.name().to_string(),
                    data: m.checkpoint_data()?,
                })
            })
            .collect()
    }

    /// Restore every module of this combiner from `saved`, matched by name
    pub fn restore_modules(&mut self, saved: &[ModuleCheckpoint]) -> OrchestratorResult<()> {
        for module in &mut self.modules {
            let entry = saved
                .iter()
                .find(|s| s.name == module.name())
                .ok_or_else(|| OrchestratorError::checkpoint(format!("no saved state for module '{}'", module.name())))?;
            module.restore_checkpoint_data(&entry.data)?;
        }
        Ok(())
    }
}

/// Sum of weighted module matrices
///
/// A row every module leaves degenerate combines to uniform zero. Otherwise
/// finite contributions are summed and a cell no module could score stays `NaN`.
pub fn combine(parts: &[(ScoreMatrix, f64)], normalize: bool, items: usize, clusters: usize) -> ScoreMatrix {
    let prepared: Vec<(ScoreMatrix, f64)> = parts
        .iter()
        .map(|(m, w)| (if normalize { m.standardized() } else { m.clone() }, *w))
        .collect();

    let mut combined = ScoreMatrix::zeros(items, clusters);
    for item in 0..items {
        if parts.iter().all(|(m, _)| m.is_degenerate_row(item)) {
            continue;
        }
        for cluster in 0..clusters {
            let mut sum = 0.0;
            let mut any = false;
            for (m, w) in &prepared {
                let v = m.get(item, cluster);
                if v.is_finite() {
                    sum += v * w;
                    any = true;
                }
            }
            combined.set(item, cluster, if any { sum } else { f64::NAN });
        }
    }
    combined
}

/// Mean of finite scores over the cells where the item is a member
pub fn member_mean(scores: &ScoreMatrix, membership: &ClusterMembership, side: ScoreSide) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for item in 0..scores.items() {
        let clusters = match side {
            ScoreSide::Rows => membership.clusters_for_row(item),
            ScoreSide::Columns => membership.clusters_for_column(item),
        };
        for cluster in clusters {
            let v = scores.get(item, cluster.index());
            if v.is_finite() {
                sum += v;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}
