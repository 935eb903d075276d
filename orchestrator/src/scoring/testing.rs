//! Test doubles shared by the scoring unit tests

use shared::Matrix;

use super::traits::{ScoringError, ScoringFunction, ScoringInput};
use super::types::ScoringKind;
use crate::config::{RawConfig, RunConfig};
use crate::context::RunContext;
use crate::core::membership::ClusterMembership;
use crate::core::scores::ScoreMatrix;
use crate::core::seeding::{RandomColumnSeeder, RandomRowSeeder};

/// 12 x 6 matrix seeded into 3 clusters
pub fn fixture_input(ctx: &RunContext) -> (Matrix, ClusterMembership) {
    let values = (0..72).map(|i| ((i * 7) % 13) as f64).collect();
    let matrix = Matrix::new(
        (0..12).map(|r| format!("g{r}")).collect(),
        (0..6).map(|c| format!("s{c}")).collect(),
        values,
    )
    .unwrap();
    let raw = RawConfig {
        num_clusters: Some(3),
        clusters_per_col: Some(2),
        num_iterations: Some(10),
        checkpoint_interval: Some(5),
        ..RawConfig::default()
    };
    let config = RunConfig::resolve(&raw, 12).unwrap();
    let membership = ClusterMembership::create(ctx, &matrix, &RandomRowSeeder, &RandomColumnSeeder, &config).unwrap();
    (matrix, membership)
}

fn side_len(kind: ScoringKind, input: &ScoringInput<'_>) -> usize {
    match kind.side() {
        super::types::ScoreSide::Rows => input.matrix.num_rows(),
        super::types::ScoreSide::Columns => input.matrix.num_columns(),
    }
}

/// Returns a matrix filled with its call count
pub struct CountingFunction {
    name: String,
    kind: ScoringKind,
    calls: u32,
}

impl CountingFunction {
    pub fn new(name: &str, kind: ScoringKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            calls: 0,
        }
    }
}

impl ScoringFunction for CountingFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        self.kind
    }

    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        self.calls += 1;
        let calls = f64::from(self.calls);
        Ok(ScoreMatrix::from_fn(side_len(self.kind, input), input.num_clusters(), |i, k| {
            calls * 100.0 + (i * 3 + k) as f64
        }))
    }
}

/// Fails on every call
pub struct FailingFunction {
    name: String,
    kind: ScoringKind,
}

impl FailingFunction {
    pub fn new(name: &str, kind: ScoringKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

impl ScoringFunction for FailingFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        self.kind
    }

    fn compute(&mut self, _input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        Err(ScoringError::failed("always fails"))
    }
}

/// Returns a fixed matrix
pub struct FixedFunction {
    pub name: String,
    pub kind: ScoringKind,
    pub scores: ScoreMatrix,
}

impl ScoringFunction for FixedFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        self.kind
    }

    fn compute(&mut self, _input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        Ok(self.scores.clone())
    }
}
