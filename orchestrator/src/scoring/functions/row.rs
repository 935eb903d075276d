//! Intrinsic row scoring
//!
//! How closely a row follows a cluster's column profile: the negative mean
//! squared deviation from the cluster's column means over its columns.

use crate::core::scores::ScoreMatrix;
use crate::scoring::traits::{ScoringError, ScoringFunction, ScoringInput};
use crate::scoring::types::ScoringKind;
use shared::ClusterId;

pub struct RowScoring {
    name: String,
}

impl RowScoring {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ScoringFunction for RowScoring {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        ScoringKind::Row
    }

    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        let matrix = input.matrix;
        let membership = input.membership;
        let clusters = input.num_clusters();
        let mut scores = ScoreMatrix::from_fn(matrix.num_rows(), clusters, |_, _| f64::NAN);

        for cluster in ClusterId::all(clusters) {
            let rows = membership.row_indices_for_cluster(cluster);
            let columns = membership.column_indices_for_cluster(cluster);
            if rows.is_empty() || columns.is_empty() {
                continue;
            }
            let profile: Vec<Option<f64>> = columns.iter().map(|&c| matrix.column_mean_over(c, rows)).collect();

            for row in 0..matrix.num_rows() {
                let mut sum = 0.0;
                let mut count = 0usize;
                for (&c, mean) in columns.iter().zip(&profile) {
                    let value = matrix.get(row, c);
                    if let (true, Some(m)) = (value.is_finite(), mean) {
                        sum += (value - m).powi(2);
                        count += 1;
                    }
                }
                if count > 0 {
                    scores.set(row, cluster.index(), -(sum / count as f64));
                }
            }
        }
        Ok(scores)
    }
}
