//! Test fixtures: synthetic matrices and configurations

use std::sync::Arc;

use orchestrator::RawConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Matrix;

pub struct TestFixtures;

impl TestFixtures {
    pub const BLOCKS: usize = 4;
    pub const ROWS: usize = 40;
    pub const COLUMNS: usize = 20;
    pub const BLOCK_VALUE: f64 = 5.0;

    /// Block of a row or column in the synthetic matrix
    pub fn block_of_row(row: usize) -> usize {
        row / (Self::ROWS / Self::BLOCKS)
    }

    pub fn block_of_column(column: usize) -> usize {
        column / (Self::COLUMNS / Self::BLOCKS)
    }

    /// 40 x 20 matrix with four coherent 10 x 5 blocks on a noisy background
    ///
    /// Block cells are `5.0 ± 0.1`, background cells uniform in `[-1, 1]`.
    pub fn block_matrix() -> Arc<Matrix> {
        let mut rng = StdRng::seed_from_u64(20240101);
        let mut values = Vec::with_capacity(Self::ROWS * Self::COLUMNS);
        for row in 0..Self::ROWS {
            for column in 0..Self::COLUMNS {
                let value = if Self::block_of_row(row) == Self::block_of_column(column) {
                    Self::BLOCK_VALUE + rng.gen_range(-0.1..0.1)
                } else {
                    rng.gen_range(-1.0..1.0)
                };
                values.push(value);
            }
        }
        let matrix = Matrix::new(
            (0..Self::ROWS).map(|r| format!("gene{r:02}")).collect(),
            (0..Self::COLUMNS).map(|c| format!("cond{c:02}")).collect(),
            values,
        )
        .expect("Valid fixture matrix");
        Arc::new(matrix)
    }

    /// Same labels as [`Self::block_matrix`] but shuffled row names
    pub fn relabeled_matrix() -> Arc<Matrix> {
        let base = Self::block_matrix();
        let mut values = Vec::new();
        for row in 0..base.num_rows() {
            values.extend_from_slice(base.row(row));
        }
        let matrix = Matrix::new(
            (0..Self::ROWS).map(|r| format!("other{r:02}")).collect(),
            base.column_names().to_vec(),
            values,
        )
        .expect("Valid fixture matrix");
        Arc::new(matrix)
    }

    /// Four clusters, two per row and column, ten iterations, checkpoint every five
    pub fn scenario_config() -> RawConfig {
        RawConfig {
            num_clusters: Some(4),
            clusters_per_row: Some(2),
            clusters_per_col: Some(2),
            num_iterations: Some(10),
            checkpoint_interval: Some(5),
            result_freq: Some(1),
            stats_freq: Some(1),
            random_seed: Some(42),
            ..RawConfig::default()
        }
    }

    pub fn short_config(num_iterations: u32) -> RawConfig {
        RawConfig {
            num_iterations: Some(num_iterations),
            checkpoint_interval: Some(0),
            postadjust: Some(false),
            ..Self::scenario_config()
        }
    }
}
