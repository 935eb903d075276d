//! Per-iteration records
//!
//! [`IterationResult`] lives for one iteration only. What outlives it is
//! written to the persistence store as [`ClusterResult`] rows and one
//! [`IterationStats`] record.

use serde::{Deserialize, Serialize};
use shared::ClusterId;
use std::collections::BTreeMap;

use super::scores::ScoreMatrix;
use crate::scoring::types::{ScoreSide, ScoringDegradation};

/// Unweighted output of one module, kept for diagnostics
#[derive(Debug, Clone)]
pub struct SubResult {
    pub module: String,
    pub side: ScoreSide,
    pub scores: ScoreMatrix,
}

/// Everything computed during a single iteration
#[derive(Debug, Clone, Default)]
pub struct IterationResult {
    pub iteration: u32,
    pub subresults: Vec<SubResult>,
    pub degradations: Vec<ScoringDegradation>,
    pub fuzzy_coeff: f64,
    pub row_changes: usize,
    pub col_changes: usize,
}

impl IterationResult {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            ..Self::default()
        }
    }
}

/// Membership and residual of one cluster at one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub iteration: u32,
    pub cluster: ClusterId,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub residual: f64,
}

/// Aggregate statistics of one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: u32,
    pub median_residual: f64,
    /// Indexed by cluster id - 1
    pub cluster_residuals: Vec<f64>,
    pub fuzzy_coeff: f64,
    /// Mean unweighted score of each module over member cells
    pub module_means: BTreeMap<String, f64>,
    pub row_changes: usize,
    pub col_changes: usize,
    /// Residuals replaced by the sentinel value
    pub anomalies: u32,
    pub degradations: Vec<ScoringDegradation>,
    pub timestamp: String,
}

/// Run-level counters that outlive single iterations
///
/// Part of every checkpoint, so a resumed run reports the same totals and
/// the same pending degradations as one that never stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTally {
    /// Degradations not yet written to a stats record
    pub pending_degradations: Vec<ScoringDegradation>,
    pub total_degradations: usize,
    pub total_anomalies: u32,
    pub last_median: Option<f64>,
}

impl RunTally {
    pub fn note_degradations(&mut self, degradations: &[ScoringDegradation]) {
        self.total_degradations += degradations.len();
        self.pending_degradations.extend(degradations.iter().cloned());
    }

    /// Hand the pending degradations to the next stats record
    pub fn take_pending(&mut self) -> Vec<ScoringDegradation> {
        std::mem::take(&mut self.pending_degradations)
    }
}

/// Median of a slice of finite values, `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
