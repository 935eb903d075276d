//! Score matrices
//!
//! An `items × clusters` table of fit scores, higher meaning a better fit.
//! `NaN` marks a cell that could not be scored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreMatrix {
    items: usize,
    clusters: usize,
    values: Vec<f64>,
}

impl ScoreMatrix {
    pub fn zeros(items: usize, clusters: usize) -> Self {
        Self {
            items,
            clusters,
            values: vec![0.0; items * clusters],
        }
    }

    pub fn from_fn(items: usize, clusters: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = Vec::with_capacity(items * clusters);
        for item in 0..items {
            for cluster in 0..clusters {
                values.push(f(item, cluster));
            }
        }
        Self { items, clusters, values }
    }

    pub fn items(&self) -> usize {
        self.items
    }

    pub fn clusters(&self) -> usize {
        self.clusters
    }

    /// Score of `item` for the cluster at zero-based `cluster` index
    #[inline]
    pub fn get(&self, item: usize, cluster: usize) -> f64 {
        self.values[item * self.clusters + cluster]
    }

    #[inline]
    pub fn set(&mut self, item: usize, cluster: usize, value: f64) {
        self.values[item * self.clusters + cluster] = value;
    }

    pub fn row(&self, item: usize) -> &[f64] {
        &self.values[item * self.clusters..(item + 1) * self.clusters]
    }

    pub fn row_mut(&mut self, item: usize) -> &mut [f64] {
        &mut self.values[item * self.clusters..(item + 1) * self.clusters]
    }

    pub fn same_shape(&self, other: &ScoreMatrix) -> bool {
        self.items == other.items && self.clusters == other.clusters
    }

    /// True when an item's row carries no usable signal
    pub fn is_degenerate_row(&self, item: usize) -> bool {
        self.row(item).iter().all(|v| !v.is_finite() || *v == 0.0)
    }

    /// Z-score standardisation over the finite cells
    ///
    /// Matrices without spread are returned unchanged.
    pub fn standardized(&self) -> ScoreMatrix {
        let finite: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 2 {
            return self.clone();
        }
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (finite.len() - 1) as f64;
        let sd = var.sqrt();
        if !(sd > 0.0) {
            return self.clone();
        }

        ScoreMatrix {
            items: self.items,
            clusters: self.clusters,
            values: self
                .values
                .iter()
                .map(|v| if v.is_finite() { (v - mean) / sd } else { *v })
                .collect(),
        }
    }
}

/// Bitwise comparison so that `NaN` cells compare equal to themselves
impl PartialEq for ScoreMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(other)
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
