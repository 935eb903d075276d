//! Column scoring
//!
//! A column fits a cluster when the cluster's rows agree on it: the score is
//! `-var / (|mean| + 0.1)` of the column over the cluster's rows.

use crate::core::scores::ScoreMatrix;
use crate::scoring::traits::{ScoringError, ScoringFunction, ScoringInput};
use crate::scoring::types::ScoringKind;
use shared::ClusterId;

const MEAN_OFFSET: f64 = 0.1;

pub struct ColumnScoring {
    name: String,
}

impl ColumnScoring {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Sample mean and variance of the finite values, if at least two exist
fn mean_and_variance(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (finite.len() - 1) as f64;
    Some((mean, var))
}

impl ScoringFunction for ColumnScoring {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        ScoringKind::Column
    }

    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        let matrix = input.matrix;
        let clusters = input.num_clusters();
        let mut scores = ScoreMatrix::from_fn(matrix.num_columns(), clusters, |_, _| f64::NAN);

        for cluster in ClusterId::all(clusters) {
            let rows = input.membership.row_indices_for_cluster(cluster);
            for column in 0..matrix.num_columns() {
                if let Some((mean, var)) = mean_and_variance(rows.iter().map(|&r| matrix.get(r, column))) {
                    scores.set(column, cluster.index(), -var / (mean.abs() + MEAN_OFFSET));
                }
            }
        }
        Ok(scores)
    }
}
