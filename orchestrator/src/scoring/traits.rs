//! Scoring module interfaces
//!
//! A [`ScoringFunction`] turns the current membership into a score matrix for
//! one side of the data matrix. Functions are synchronous and own whatever
//! state they need between iterations; that state travels in checkpoints as
//! an opaque byte blob.

use shared::{ClusterId, Matrix};
use std::collections::BTreeMap;
use thiserror::Error;

use super::types::ScoringKind;
use crate::context::RunContext;
use crate::core::membership::ClusterMembership;
use crate::core::scores::ScoreMatrix;

/// Recoverable scoring failure
///
/// Never aborts a run: the caller records a degradation and falls back to
/// the module's previous result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("computation failed: {reason}")]
    Failed { reason: String },

    #[error("score matrix is {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("external command '{command}' failed: {message}")]
    External { command: String, message: String },

    #[error("module state could not be restored: {message}")]
    State { message: String },
}

impl ScoringError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }
}

/// Read-only view handed to scoring functions
pub struct ScoringInput<'a> {
    pub ctx: &'a RunContext,
    pub iteration: u32,
    pub num_iterations: u32,
    pub matrix: &'a Matrix,
    pub membership: &'a ClusterMembership,
}

impl ScoringInput<'_> {
    pub fn num_clusters(&self) -> usize {
        self.membership.num_clusters()
    }
}

pub trait ScoringFunction: Send {
    /// Unique name within one side of the run
    fn name(&self) -> &str;

    fn kind(&self) -> ScoringKind;

    /// Scores of every item on this module's side against every cluster
    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError>;

    /// Internal state to persist; stateless functions keep the default
    fn checkpoint_data(&self) -> Result<Vec<u8>, ScoringError> {
        Ok(Vec::new())
    }

    fn restore_checkpoint_data(&mut self, _data: &[u8]) -> Result<(), ScoringError> {
        Ok(())
    }
}

/// External per-cluster motif search
///
/// Given the labels of a cluster's rows, returns a p-value per row label.
/// Rows missing from the answer are treated as unscored.
#[mockall::automock]
pub trait MotifSearcher: Send + Sync {
    fn search(&self, cluster: ClusterId, rows: &[String]) -> Result<BTreeMap<String, f64>, ScoringError>;
}
