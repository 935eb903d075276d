//! Cluster residuals
//!
//! Mean squared residue of a cluster's submatrix: the mean of
//! `(x[i,j] - rowmean[i] - colmean[j] + mean)²` over the finite cells.
//! Lower means a tighter cluster.

use shared::{matrix::mean, ClusterId, Matrix};

use crate::error::NumericAnomaly;

/// Value substituted for a residual that could not be computed
pub const SENTINEL_RESIDUAL: f64 = 1.0;

pub fn cluster_residual(
    matrix: &Matrix,
    cluster: ClusterId,
    rows: &[usize],
    columns: &[usize],
) -> Result<f64, NumericAnomaly> {
    if rows.is_empty() {
        return Err(NumericAnomaly::EmptyRows { cluster });
    }
    if columns.is_empty() {
        return Err(NumericAnomaly::EmptyColumns { cluster });
    }

    let row_means: Vec<Option<f64>> = rows.iter().map(|&r| matrix.row_mean_over(r, columns)).collect();
    let col_means: Vec<Option<f64>> = columns.iter().map(|&c| matrix.column_mean_over(c, rows)).collect();
    let overall = mean(rows.iter().flat_map(|&r| columns.iter().map(move |&c| matrix.get(r, c))))
        .ok_or(NumericAnomaly::NoFiniteValues { cluster })?;

    let mut sum = 0.0;
    let mut count = 0usize;
    for (ri, &r) in rows.iter().enumerate() {
        for (ci, &c) in columns.iter().enumerate() {
            let value = matrix.get(r, c);
            if let (true, Some(rm), Some(cm)) = (value.is_finite(), row_means[ri], col_means[ci]) {
                let residue = value - rm - cm + overall;
                sum += residue * residue;
                count += 1;
            }
        }
    }

    if count == 0 {
        return Err(NumericAnomaly::NoFiniteValues { cluster });
    }
    let residual = sum / count as f64;
    if !residual.is_finite() {
        return Err(NumericAnomaly::NonFinite { cluster, value: residual });
    }
    Ok(residual)
}
