//! Network neighbourhood scoring
//!
//! A row fits a cluster when much of its edge weight points at the cluster's
//! rows. Rows without edges score zero everywhere and so express no preference.

use std::collections::BTreeMap;
use std::path::Path;

use shared::{ClusterId, Matrix, SharedError};

use crate::core::scores::ScoreMatrix;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scoring::traits::{ScoringError, ScoringFunction, ScoringInput};
use crate::scoring::types::ScoringKind;

/// Undirected weighted graph over row labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    edges: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Network {
    /// Parse a whitespace separated `source target weight` edge list
    ///
    /// Blank lines and `#` comments are skipped. Repeated edges keep the
    /// larger weight.
    pub fn from_edge_list(text: &str) -> OrchestratorResult<Self> {
        let mut network = Network::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parse_error = |message: &str| SharedError::ParseError {
                line: number + 1,
                message: message.to_string(),
            };
            if fields.len() != 3 {
                return Err(parse_error("expected 'source target weight'").into());
            }
            let weight: f64 = fields[2].parse().map_err(|_| parse_error("weight is not a number"))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(parse_error("weight must be finite and non-negative").into());
            }
            network.add_edge(fields[0], fields[1], weight);
        }
        Ok(network)
    }

    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OrchestratorError::storage("read network", path, e))?;
        Self::from_edge_list(&text)
    }

    pub fn add_edge(&mut self, a: &str, b: &str, weight: f64) {
        if a == b {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            let slot = self
                .edges
                .entry(from.to_string())
                .or_default()
                .entry(to.to_string())
                .or_insert(weight);
            *slot = slot.max(weight);
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.edges.len()
    }

    /// Adjacency by matrix row index; edges to unknown labels are dropped
    fn index(&self, matrix: &Matrix) -> Vec<Vec<(usize, f64)>> {
        (0..matrix.num_rows())
            .map(|row| {
                self.edges
                    .get(matrix.row_name(row))
                    .map(|neighbours| {
                        neighbours
                            .iter()
                            .filter_map(|(label, &w)| matrix.row_index(label).map(|i| (i, w)))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

pub struct NetworkScoring {
    name: String,
    network: Network,
    adjacency: Option<Vec<Vec<(usize, f64)>>>,
}

impl NetworkScoring {
    pub fn new(name: impl Into<String>, network: Network) -> Self {
        Self {
            name: name.into(),
            network,
            adjacency: None,
        }
    }
}

impl ScoringFunction for NetworkScoring {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScoringKind {
        ScoringKind::Network
    }

    fn compute(&mut self, input: &ScoringInput<'_>) -> Result<ScoreMatrix, ScoringError> {
        let matrix = input.matrix;
        let adjacency = self.adjacency.get_or_insert_with(|| self.network.index(matrix));
        if adjacency.len() != matrix.num_rows() {
            return Err(ScoringError::failed("network index does not match the matrix"));
        }

        let clusters = input.num_clusters();
        let mut scores = ScoreMatrix::zeros(matrix.num_rows(), clusters);
        for (row, neighbours) in adjacency.iter().enumerate() {
            let total: f64 = neighbours.iter().map(|(_, w)| w).sum();
            if total <= 0.0 {
                continue;
            }
            for cluster in ClusterId::all(clusters) {
                let inside: f64 = neighbours
                    .iter()
                    .filter(|(n, _)| input.membership.is_row_member(*n, cluster))
                    .map(|(_, w)| w)
                    .sum();
                scores.set(row, cluster.index(), inside / total);
            }
        }
        Ok(scores)
    }
}
