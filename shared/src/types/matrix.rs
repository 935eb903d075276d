//! Immutable labelled numeric matrix
//!
//! The optimisation target of a run. Values are stored row-major; missing
//! values are represented as `NaN` and skipped by every statistic.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{SharedError, SharedResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    row_names: Vec<String>,
    column_names: Vec<String>,
    values: Vec<f64>,
}

impl Matrix {
    /// Build a matrix from labels and row-major values
    pub fn new(row_names: Vec<String>, column_names: Vec<String>, values: Vec<f64>) -> SharedResult<Self> {
        let expected = row_names.len() * column_names.len();
        if values.len() != expected {
            return Err(SharedError::ShapeMismatch {
                expected,
                found: values.len(),
            });
        }
        check_unique("row", &row_names)?;
        check_unique("column", &column_names)?;

        Ok(Self {
            row_names,
            column_names,
            values,
        })
    }

    /// Parse a tab-separated matrix
    ///
    /// The first line holds column labels (its first cell is ignored), every
    /// following line holds a row label and one value per column. `NA` and
    /// empty cells become `NaN`.
    pub fn from_tsv(text: &str) -> SharedResult<Self> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or(SharedError::ParseError {
            line: 1,
            message: "missing header line".to_string(),
        })?;
        let column_names: Vec<String> = header.split('\t').skip(1).map(|s| s.trim().to_string()).collect();
        if column_names.is_empty() {
            return Err(SharedError::ParseError {
                line: 1,
                message: "header has no column labels".to_string(),
            });
        }

        let mut row_names = Vec::new();
        let mut values = Vec::new();
        for (idx, line) in lines {
            let mut cells = line.split('\t');
            let label = cells.next().unwrap_or_default().trim().to_string();
            let row: Vec<&str> = cells.collect();
            if row.len() != column_names.len() {
                return Err(SharedError::ParseError {
                    line: idx + 1,
                    message: format!("expected {} values, found {}", column_names.len(), row.len()),
                });
            }
            for cell in row {
                values.push(parse_cell(cell).ok_or_else(|| SharedError::ParseError {
                    line: idx + 1,
                    message: format!("invalid number '{cell}'"),
                })?);
            }
            row_names.push(label);
        }

        Self::new(row_names, column_names, values)
    }

    pub fn num_rows(&self) -> usize {
        self.row_names.len()
    }

    pub fn num_columns(&self) -> usize {
        self.column_names.len()
    }

    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn row_name(&self, row: usize) -> &str {
        &self.row_names[row]
    }

    pub fn column_name(&self, column: usize) -> &str {
        &self.column_names[column]
    }

    pub fn row_index(&self, name: &str) -> Option<usize> {
        self.row_names.iter().position(|n| n == name)
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.values[row * self.column_names.len() + column]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.column_names.len();
        &self.values[row * width..(row + 1) * width]
    }

    /// Mean of the finite values of one column restricted to `rows`
    pub fn column_mean_over(&self, column: usize, rows: &[usize]) -> Option<f64> {
        mean(rows.iter().map(|&r| self.get(r, column)))
    }

    /// Mean of the finite values of one row restricted to `columns`
    pub fn row_mean_over(&self, row: usize, columns: &[usize]) -> Option<f64> {
        mean(columns.iter().map(|&c| self.get(row, c)))
    }
}

/// Mean of the finite values of an iterator, `None` when there are none
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cell.parse().ok()
}

fn check_unique(axis: &str, labels: &[String]) -> SharedResult<()> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(SharedError::DuplicateLabel {
                axis: axis.to_string(),
                label: label.clone(),
            });
        }
    }
    Ok(())
}
