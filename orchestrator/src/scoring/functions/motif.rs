//! Motif scoring
//!
//! Asks a [`MotifSearcher`] for per-row p-values of every cluster and scores
//! `-log10(p)`. Results are memoised per cluster and reused while the
//! cluster's rows stay the same.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::ClusterId;

use crate::core::scores::ScoreMatrix;
use crate::scoring::traits::{MotifSearcher, ScoringError, ScoringFunction, ScoringInput};
use crate::scoring::types::ScoringKind;

pub const MAX_MOTIF_SCORE: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MemoEntry {
    rows: Vec<String>,
    pvalues: BTreeMap<String, f64>,
}

pub struct MotifScoring {
    name: String,
    searcher: Box<dyn MotifSearcher>,
    memo: BTreeMap<u32, MemoEntry>,
}

impl MotifScoring {
    pub fn new(name: impl Into<String>, searcher: Box<dyn MotifSearcher>) -> Self {
        Self {
            name: name.into(),
            searcher,
            memo: BTreeMap::new(),
        }
    }

    fn pvalues_for(&mut self, cluster: ClusterId, rows: Vec<String>) -> Result<&BTreeMap<String, f64>, ScoringError> {
        let fresh = self.memo.get(&cluster.get()).is_some_and(|entry| entry.rows == rows);
        if !fresh {
            let pvalues = if rows.is_empty() {
                BTreeMap::new()
            } else {
                self.searcher.search(cluster, &rows)?
            };
            self.memo.insert(cluster.get(), MemoEntry { rows, pvalues });
        }
        self.memo
            .get(&cluster.get())
            .map(|entry| &entry.pvalues)
            .ok_or_else(|| ScoringError::failed("motif memo lost an entry"))
    }
}

/// `-log10(p)` clamped to `[0, MAX_MOTIF_SCORE]`; invalid p-values score nothing
pub fn pvalue_score(p: f64) -> f64 {
    if !(p.is_finite() && p >= 0.0) {
        return 0.0;
    }
    if p == 0.0 {
        return MAX_MOTIF_SCORE;
    }
    (-p.log10()).clamp(0.0, MAX_MOTIF_SCORE)
}

impl ScoringFunction for MotifScoring {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        ScoringKind::Motif
    }

    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        let matrix = input.matrix;
        let clusters = input.num_clusters();
        let mut scores = ScoreMatrix::zeros(matrix.num_rows(), clusters);

        for cluster in ClusterId::all(clusters) {
            let rows = input.membership.rows_for_cluster(cluster);
            let pvalues = self.pvalues_for(cluster, rows)?;
            for (label, &p) in pvalues {
                if let Some(row) = matrix.row_index(label) {
                    scores.set(row, cluster.index(), pvalue_score(p));
                }
            }
        }
        Ok(scores)
    }

    fn checkpoint_data(&self) -> Result<Vec<u8>, ScoringError> {
        bincode::serialize(&self.memo).map_err(|e| ScoringError::State { message: e.to_string() })
    }

    fn restore_checkpoint_data(&mut self, data: &[u8]) -> Result<(), ScoringError> {
        self.memo = bincode::deserialize(data).map_err(|e| ScoringError::State { message: e.to_string() })?;
        Ok(())
    }
}
