//! Initial membership seeding strategies
//!
//! Row seeders give every row exactly one starting cluster; column seeders
//! then place every column in `clusters_per_col` clusters, usually guided by
//! the seeded rows.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{ClusterId, Matrix};

use crate::config::{ColumnSeeding, RowSeeding};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Strategy assigning each row its first cluster
pub trait RowSeeder: Send + Sync {
    fn name(&self) -> &str;

    /// One cluster per row, every cluster id in `[1, num_clusters]`
    fn seed(&self, matrix: &Matrix, num_clusters: usize, rng: &mut StdRng) -> OrchestratorResult<Vec<ClusterId>>;
}

/// Strategy assigning each column its starting clusters
pub trait ColumnSeeder: Send + Sync {
    fn name(&self) -> &str;

    /// Between 1 and `clusters_per_col` distinct clusters per column
    fn seed(
        &self,
        matrix: &Matrix,
        row_seeds: &[ClusterId],
        num_clusters: usize,
        clusters_per_col: usize,
        rng: &mut StdRng,
    ) -> OrchestratorResult<Vec<Vec<ClusterId>>>;
}

pub fn row_seeder_for(kind: RowSeeding) -> Box<dyn RowSeeder> {
    match kind {
        RowSeeding::Kmeans => Box::new(KMeansRowSeeder::default()),
        RowSeeding::Random => Box::new(RandomRowSeeder),
    }
}

pub fn column_seeder_for(kind: ColumnSeeding) -> Box<dyn ColumnSeeder> {
    match kind {
        ColumnSeeding::Variance => Box::new(VarianceColumnSeeder),
        ColumnSeeding::Random => Box::new(RandomColumnSeeder),
    }
}

/// Shuffled round-robin: every cluster receives rows, sizes differ by at most one
pub struct RandomRowSeeder;

impl RowSeeder for RandomRowSeeder {
    fn name(&self) -> &str {
        "random"
    }

    fn seed(&self, matrix: &Matrix, num_clusters: usize, rng: &mut StdRng) -> OrchestratorResult<Vec<ClusterId>> {
        let mut order: Vec<usize> = (0..matrix.num_rows()).collect();
        order.shuffle(rng);

        let mut seeds = vec![ClusterId::from_index(0); matrix.num_rows()];
        for (position, row) in order.into_iter().enumerate() {
            seeds[row] = ClusterId::from_index(position % num_clusters);
        }
        Ok(seeds)
    }
}

/// k-means++ initialisation followed by Lloyd iterations
pub struct KMeansRowSeeder {
    pub max_iterations: usize,
}

impl Default for KMeansRowSeeder {
    fn default() -> Self {
        Self { max_iterations: 25 }
    }
}

impl KMeansRowSeeder {
    /// Squared distance over the columns where both vectors are finite,
    /// rescaled to the full width
    fn distance(a: &[f64], b: &[f64]) -> f64 {
        let (sum, shared) = a
            .iter()
            .zip(b)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .fold((0.0, 0usize), |(s, n), (x, y)| (s + (x - y).powi(2), n + 1));
        if shared == 0 {
            f64::INFINITY
        } else {
            sum * a.len() as f64 / shared as f64
        }
    }

    fn nearest(row: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
        centers
            .iter()
            .enumerate()
            .map(|(k, c)| (k, Self::distance(row, c)))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
    }

    fn initial_centers(matrix: &Matrix, num_clusters: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
        let n = matrix.num_rows();
        let mut centers = vec![matrix.row(rng.gen_range(0..n)).to_vec()];

        while centers.len() < num_clusters {
            let weights: Vec<f64> = (0..n)
                .map(|r| {
                    let d = Self::nearest(matrix.row(r), &centers).1;
                    if d.is_finite() {
                        d
                    } else {
                        0.0
                    }
                })
                .collect();
            let total: f64 = weights.iter().sum();

            let chosen = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut pick = n - 1;
                for (r, w) in weights.iter().enumerate() {
                    if *w <= 0.0 {
                        continue;
                    }
                    target -= w;
                    if target <= 0.0 {
                        pick = r;
                        break;
                    }
                }
                pick
            } else {
                rng.gen_range(0..n)
            };
            centers.push(matrix.row(chosen).to_vec());
        }
        centers
    }

    fn recompute_centers(matrix: &Matrix, assignment: &[usize], centers: &mut [Vec<f64>]) {
        for (k, center) in centers.iter_mut().enumerate() {
            let members: Vec<usize> = (0..assignment.len()).filter(|&r| assignment[r] == k).collect();
            if members.is_empty() {
                continue;
            }
            for (c, value) in center.iter_mut().enumerate() {
                *value = matrix.column_mean_over(c, &members).unwrap_or(f64::NAN);
            }
        }
    }

    /// Give every empty cluster the row that fits its own center worst
    fn fill_empty_clusters(matrix: &Matrix, assignment: &mut [usize], centers: &[Vec<f64>]) {
        for k in 0..centers.len() {
            if assignment.iter().any(|&a| a == k) {
                continue;
            }
            let mut counts = vec![0usize; centers.len()];
            for &a in assignment.iter() {
                counts[a] += 1;
            }
            let candidate = (0..assignment.len())
                .filter(|&r| counts[assignment[r]] > 1)
                .map(|r| {
                    let d = Self::distance(matrix.row(r), &centers[assignment[r]]);
                    (r, if d.is_finite() { d } else { f64::MAX })
                })
                .fold(None, |best: Option<(usize, f64)>, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });
            if let Some((row, _)) = candidate {
                assignment[row] = k;
            }
        }
    }
}

impl RowSeeder for KMeansRowSeeder {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn seed(&self, matrix: &Matrix, num_clusters: usize, rng: &mut StdRng) -> OrchestratorResult<Vec<ClusterId>> {
        if matrix.num_rows() < num_clusters {
            return Err(OrchestratorError::seeding(format!(
                "k-means needs at least {num_clusters} rows, matrix has {}",
                matrix.num_rows()
            )));
        }

        let mut centers = Self::initial_centers(matrix, num_clusters, rng);
        let mut assignment: Vec<usize> = (0..matrix.num_rows())
            .map(|r| Self::nearest(matrix.row(r), &centers).0)
            .collect();

        for _ in 0..self.max_iterations {
            Self::fill_empty_clusters(matrix, &mut assignment, &centers);
            Self::recompute_centers(matrix, &assignment, &mut centers);
            let next: Vec<usize> = (0..matrix.num_rows())
                .map(|r| Self::nearest(matrix.row(r), &centers).0)
                .collect();
            if next == assignment {
                break;
            }
            assignment = next;
        }
        Self::fill_empty_clusters(matrix, &mut assignment, &centers);

        Ok(assignment.into_iter().map(ClusterId::from_index).collect())
    }
}

/// Each column joins distinct random clusters
pub struct RandomColumnSeeder;

impl ColumnSeeder for RandomColumnSeeder {
    fn name(&self) -> &str {
        "random"
    }

    fn seed(
        &self,
        matrix: &Matrix,
        _row_seeds: &[ClusterId],
        num_clusters: usize,
        clusters_per_col: usize,
        rng: &mut StdRng,
    ) -> OrchestratorResult<Vec<Vec<ClusterId>>> {
        let take = clusters_per_col.min(num_clusters);
        Ok((0..matrix.num_columns())
            .map(|_| {
                rand::seq::index::sample(rng, num_clusters, take)
                    .into_iter()
                    .map(ClusterId::from_index)
                    .collect()
            })
            .collect())
    }
}

/// Each column joins the clusters whose seeded rows vary least on it
pub struct VarianceColumnSeeder;

impl VarianceColumnSeeder {
    fn variance(matrix: &Matrix, column: usize, rows: &[usize]) -> f64 {
        let values: Vec<f64> = rows.iter().map(|&r| matrix.get(r, column)).filter(|v| v.is_finite()).collect();
        if values.len() < 2 {
            return f64::INFINITY;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
    }
}

impl ColumnSeeder for VarianceColumnSeeder {
    fn name(&self) -> &str {
        "variance"
    }

    fn seed(
        &self,
        matrix: &Matrix,
        row_seeds: &[ClusterId],
        num_clusters: usize,
        clusters_per_col: usize,
        _rng: &mut StdRng,
    ) -> OrchestratorResult<Vec<Vec<ClusterId>>> {
        let cluster_rows: Vec<Vec<usize>> = ClusterId::all(num_clusters)
            .map(|k| (0..row_seeds.len()).filter(|&r| row_seeds[r] == k).collect())
            .collect();

        Ok((0..matrix.num_columns())
            .map(|column| {
                let mut ranked: Vec<(usize, f64)> = cluster_rows
                    .iter()
                    .enumerate()
                    .map(|(k, rows)| (k, Self::variance(matrix, column, rows)))
                    .collect();
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                ranked
                    .into_iter()
                    .take(clusters_per_col.min(num_clusters))
                    .map(|(k, _)| ClusterId::from_index(k))
                    .collect()
            })
            .collect())
    }
}
