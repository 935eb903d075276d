//! Row and column cluster membership
//!
//! Each side keeps two views of the same assignment: the clusters of every
//! item and the members of every cluster, both in insertion order. The
//! views are updated together so lookups in either direction stay cheap.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use shared::{run_debug, ClusterId, Matrix};

use super::iteration::IterationResult;
use super::scores::ScoreMatrix;
use super::seeding::{ColumnSeeder, RowSeeder};
use super::update::{fuzzy_coefficient, greedy_selection, DampenedUpdate, Move, UpdateLimits, UpdatePolicy};
use crate::config::{MembershipParams, RunConfig};
use crate::context::{RngStream, RunContext};
use crate::error::{OrchestratorError, OrchestratorResult};

pub const MEMBERSHIP_SNAPSHOT_VERSION: u32 = 1;

/// One side of the membership: items to clusters and clusters to items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    item_clusters: Vec<Vec<ClusterId>>,
    cluster_items: Vec<Vec<usize>>,
}

impl Assignment {
    fn new(num_items: usize, num_clusters: usize) -> Self {
        Self {
            item_clusters: vec![Vec::new(); num_items],
            cluster_items: vec![Vec::new(); num_clusters],
        }
    }

    fn add(&mut self, item: usize, cluster: ClusterId) {
        if self.item_clusters[item].contains(&cluster) {
            return;
        }
        self.item_clusters[item].push(cluster);
        self.cluster_items[cluster.index()].push(item);
    }

    fn remove(&mut self, item: usize, cluster: ClusterId) {
        self.item_clusters[item].retain(|&k| k != cluster);
        self.cluster_items[cluster.index()].retain(|&i| i != item);
    }

    /// Swap `from` for `to` keeping the position in the item's list
    fn replace(&mut self, item: usize, from: ClusterId, to: ClusterId) {
        if let Some(slot) = self.item_clusters[item].iter().position(|&k| k == from) {
            self.item_clusters[item][slot] = to;
            self.cluster_items[from.index()].retain(|&i| i != item);
            self.cluster_items[to.index()].push(item);
        }
    }

    fn num_items(&self) -> usize {
        self.item_clusters.len()
    }

    fn num_clusters(&self) -> usize {
        self.cluster_items.len()
    }

    /// Both views agree, ids are in range and item counts within `[1, cap]`
    fn is_consistent(&self, cap: usize) -> bool {
        let bounded = self
            .item_clusters
            .iter()
            .all(|clusters| !clusters.is_empty() && clusters.len() <= cap);
        let in_range = self
            .item_clusters
            .iter()
            .flatten()
            .all(|k| k.get() >= 1 && k.index() < self.num_clusters());
        let mirrored = self.item_clusters.iter().enumerate().all(|(item, clusters)| {
            clusters
                .iter()
                .all(|k| self.cluster_items[k.index()].iter().filter(|&&i| i == item).count() == 1)
        }) && self.cluster_items.iter().map(Vec::len).sum::<usize>()
            == self.item_clusters.iter().map(Vec::len).sum::<usize>();
        bounded && in_range && mirrored
    }

    fn apply(&mut self, item: usize, moves: &[Move]) -> usize {
        for mv in moves {
            match *mv {
                Move::Add(k) => self.add(item, ClusterId::from_index(k)),
                Move::Replace { from, to } => {
                    self.replace(item, ClusterId::from_index(from), ClusterId::from_index(to))
                }
            }
        }
        moves.len()
    }

    /// Run `policy` over every item in index order, returning the change count
    fn update(
        &mut self,
        scores: &ScoreMatrix,
        policy: &dyn UpdatePolicy,
        limits: &UpdateLimits,
        fuzzy_coeff: f64,
        rng: &mut StdRng,
    ) -> usize {
        let mut changes = 0;
        for item in 0..self.num_items() {
            let members: Vec<usize> = self.item_clusters[item].iter().map(|k| k.index()).collect();
            let moves = policy.decide(&members, scores.row(item), limits, fuzzy_coeff, rng);
            changes += self.apply(item, &moves);
        }
        changes
    }

    /// Greedy reassignment of every item with a preference
    fn postadjust(&mut self, scores: &ScoreMatrix, cap: usize) -> usize {
        let mut changes = 0;
        for item in 0..self.num_items() {
            let Some(chosen) = greedy_selection(scores.row(item), cap) else {
                continue;
            };
            let chosen: Vec<ClusterId> = chosen.into_iter().map(ClusterId::from_index).collect();

            let dropped: Vec<ClusterId> = self.item_clusters[item]
                .iter()
                .copied()
                .filter(|k| !chosen.contains(k))
                .collect();
            for k in dropped {
                self.remove(item, k);
                changes += 1;
            }
            for k in chosen {
                if !self.item_clusters[item].contains(&k) {
                    self.add(item, k);
                    changes += 1;
                }
            }
        }
        changes
    }
}

/// Serialized form of a [`ClusterMembership`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub version: u32,
    pub num_clusters: usize,
    pub row_names: Vec<String>,
    pub column_names: Vec<String>,
    pub rows: Assignment,
    pub columns: Assignment,
}

pub struct ClusterMembership {
    num_clusters: usize,
    row_names: Vec<String>,
    column_names: Vec<String>,
    rows: Assignment,
    columns: Assignment,
    params: MembershipParams,
    policy: Box<dyn UpdatePolicy>,
}

impl std::fmt::Debug for ClusterMembership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMembership")
            .field("num_clusters", &self.num_clusters)
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .finish()
    }
}

impl ClusterMembership {
    /// Seed a fresh membership for `matrix`
    pub fn create(
        ctx: &RunContext,
        matrix: &Matrix,
        row_seeder: &dyn RowSeeder,
        column_seeder: &dyn ColumnSeeder,
        config: &RunConfig,
    ) -> OrchestratorResult<Self> {
        let k = config.num_clusters;
        let params = &config.membership;
        let required = k * params.min_cluster_rows;
        if matrix.num_rows() < required {
            return Err(OrchestratorError::seeding(format!(
                "matrix has {} rows, {k} clusters of at least {} rows need {required}",
                matrix.num_rows(),
                params.min_cluster_rows
            )));
        }

        let mut row_rng = ctx.rng(0, RngStream::RowSeeding);
        let row_seeds = row_seeder.seed(matrix, k, &mut row_rng)?;
        if row_seeds.len() != matrix.num_rows() || row_seeds.iter().any(|c| c.index() >= k) {
            return Err(OrchestratorError::seeding(format!(
                "row seeder '{}' returned an invalid assignment",
                row_seeder.name()
            )));
        }

        let mut col_rng = ctx.rng(0, RngStream::ColumnSeeding);
        let col_seeds = column_seeder.seed(matrix, &row_seeds, k, params.clusters_per_col, &mut col_rng)?;
        let valid_columns = col_seeds.len() == matrix.num_columns()
            && col_seeds
                .iter()
                .all(|cs| !cs.is_empty() && cs.len() <= params.clusters_per_col && cs.iter().all(|c| c.index() < k));
        if !valid_columns {
            return Err(OrchestratorError::seeding(format!(
                "column seeder '{}' returned an invalid assignment",
                column_seeder.name()
            )));
        }

        let mut rows = Assignment::new(matrix.num_rows(), k);
        for (row, cluster) in row_seeds.into_iter().enumerate() {
            rows.add(row, cluster);
        }
        let mut columns = Assignment::new(matrix.num_columns(), k);
        for (column, clusters) in col_seeds.into_iter().enumerate() {
            for cluster in clusters {
                columns.add(column, cluster);
            }
        }

        run_debug!(
            ctx.run_id(),
            "Seeded {} clusters with '{}' rows and '{}' columns",
            k,
            row_seeder.name(),
            column_seeder.name()
        );

        Ok(Self {
            num_clusters: k,
            row_names: matrix.row_names().to_vec(),
            column_names: matrix.column_names().to_vec(),
            rows,
            columns,
            params: params.clone(),
            policy: Box::new(DampenedUpdate),
        })
    }

    /// Replace the default update policy
    pub fn with_policy(mut self, policy: Box<dyn UpdatePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// True when this membership was built for a matrix with the same labels
    pub fn fits_matrix(&self, matrix: &Matrix) -> bool {
        self.row_names == matrix.row_names() && self.column_names == matrix.column_names()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.num_items()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.num_items()
    }

    /// Row labels of `cluster` in insertion order
    pub fn rows_for_cluster(&self, cluster: ClusterId) -> Vec<String> {
        self.row_indices_for_cluster(cluster)
            .iter()
            .map(|&r| self.row_names[r].clone())
            .collect()
    }

    /// Column labels of `cluster` in insertion order
    pub fn columns_for_cluster(&self, cluster: ClusterId) -> Vec<String> {
        self.column_indices_for_cluster(cluster)
            .iter()
            .map(|&c| self.column_names[c].clone())
            .collect()
    }

    pub fn row_indices_for_cluster(&self, cluster: ClusterId) -> &[usize] {
        self.rows.cluster_items.get(cluster.index()).map_or(&[], Vec::as_slice)
    }

    pub fn column_indices_for_cluster(&self, cluster: ClusterId) -> &[usize] {
        self.columns.cluster_items.get(cluster.index()).map_or(&[], Vec::as_slice)
    }

    pub fn clusters_for_row(&self, row: usize) -> &[ClusterId] {
        &self.rows.item_clusters[row]
    }

    pub fn clusters_for_column(&self, column: usize) -> &[ClusterId] {
        &self.columns.item_clusters[column]
    }

    pub fn is_row_member(&self, row: usize, cluster: ClusterId) -> bool {
        self.rows.item_clusters[row].contains(&cluster)
    }

    pub fn is_column_member(&self, column: usize, cluster: ClusterId) -> bool {
        self.columns.item_clusters[column].contains(&cluster)
    }

    /// Both sides hold 1 to `clusters_per_*` valid cluster ids per item
    pub fn satisfies_bounds(&self) -> bool {
        self.rows.is_consistent(self.params.clusters_per_row)
            && self.columns.is_consistent(self.params.clusters_per_col)
    }

    /// Apply one dampened update step to rows and then columns
    pub fn update(
        &mut self,
        ctx: &RunContext,
        matrix: &Matrix,
        row_scores: &ScoreMatrix,
        col_scores: &ScoreMatrix,
        num_iterations: u32,
        result: &mut IterationResult,
    ) -> OrchestratorResult<()> {
        self.check_shapes(matrix, row_scores, col_scores)?;

        let iteration = result.iteration;
        let fuzzy = if self.params.use_fuzzy {
            fuzzy_coefficient(iteration, num_iterations)
        } else {
            0.0
        };

        let row_limits = UpdateLimits {
            cap: self.params.clusters_per_row,
            max_changes: self.params.max_changes_per_row,
            prob_change: self.params.prob_row_change,
        };
        let col_limits = UpdateLimits {
            cap: self.params.clusters_per_col,
            max_changes: self.params.max_changes_per_col,
            prob_change: self.params.prob_col_change,
        };

        let mut row_rng = ctx.rng(iteration, RngStream::RowUpdate);
        result.row_changes = self
            .rows
            .update(row_scores, self.policy.as_ref(), &row_limits, fuzzy, &mut row_rng);
        let mut col_rng = ctx.rng(iteration, RngStream::ColumnUpdate);
        result.col_changes = self
            .columns
            .update(col_scores, self.policy.as_ref(), &col_limits, fuzzy, &mut col_rng);
        result.fuzzy_coeff = fuzzy;

        run_debug!(
            ctx.run_id(),
            "Iteration {}: {} row and {} column membership changes (fuzzy {:.4})",
            iteration,
            result.row_changes,
            result.col_changes,
            fuzzy
        );
        Ok(())
    }

    /// Greedy one-shot reassignment, returning (row, column) change counts
    pub fn postadjust(&mut self, row_scores: &ScoreMatrix, col_scores: &ScoreMatrix) -> OrchestratorResult<(usize, usize)> {
        if row_scores.items() != self.num_rows()
            || col_scores.items() != self.num_columns()
            || row_scores.clusters() != self.num_clusters
            || col_scores.clusters() != self.num_clusters
        {
            return Err(OrchestratorError::state("post-adjustment scores do not match the membership"));
        }
        let rows = self.rows.postadjust(row_scores, self.params.clusters_per_row);
        let columns = self.columns.postadjust(col_scores, self.params.clusters_per_col);
        Ok((rows, columns))
    }

    fn check_shapes(&self, matrix: &Matrix, row_scores: &ScoreMatrix, col_scores: &ScoreMatrix) -> OrchestratorResult<()> {
        let expected_rows = (matrix.num_rows(), self.num_clusters);
        let expected_cols = (matrix.num_columns(), self.num_clusters);
        if (row_scores.items(), row_scores.clusters()) != expected_rows {
            return Err(OrchestratorError::state(format!(
                "row scores are {}x{}, expected {}x{}",
                row_scores.items(),
                row_scores.clusters(),
                expected_rows.0,
                expected_rows.1
            )));
        }
        if (col_scores.items(), col_scores.clusters()) != expected_cols {
            return Err(OrchestratorError::state(format!(
                "column scores are {}x{}, expected {}x{}",
                col_scores.items(),
                col_scores.clusters(),
                expected_cols.0,
                expected_cols.1
            )));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            version: MEMBERSHIP_SNAPSHOT_VERSION,
            num_clusters: self.num_clusters,
            row_names: self.row_names.clone(),
            column_names: self.column_names.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
        }
    }

    /// Serialized full state for a checkpoint
    pub fn checkpoint_blob(&self) -> OrchestratorResult<Vec<u8>> {
        Ok(bincode::serialize(&self.snapshot())?)
    }

    /// Rebuild a membership from a checkpoint blob written for `config`
    pub fn restore_from_checkpoint(config: &RunConfig, blob: &[u8]) -> OrchestratorResult<Self> {
        let snapshot: MembershipSnapshot = bincode::deserialize(blob)?;
        if snapshot.version != MEMBERSHIP_SNAPSHOT_VERSION {
            return Err(OrchestratorError::CheckpointVersion {
                found: snapshot.version,
                expected: MEMBERSHIP_SNAPSHOT_VERSION,
            });
        }
        if snapshot.num_clusters != config.num_clusters
            || snapshot.rows.num_clusters() != config.num_clusters
            || snapshot.columns.num_clusters() != config.num_clusters
            || snapshot.rows.num_items() != snapshot.row_names.len()
            || snapshot.columns.num_items() != snapshot.column_names.len()
        {
            return Err(OrchestratorError::checkpoint(
                "membership snapshot does not match the run configuration",
            ));
        }
        if !snapshot.rows.is_consistent(config.membership.clusters_per_row)
            || !snapshot.columns.is_consistent(config.membership.clusters_per_col)
        {
            return Err(OrchestratorError::checkpoint("membership snapshot violates cluster bounds"));
        }

        Ok(Self {
            num_clusters: snapshot.num_clusters,
            row_names: snapshot.row_names,
            column_names: snapshot.column_names,
            rows: snapshot.rows,
            columns: snapshot.columns,
            params: config.membership.clone(),
            policy: Box::new(DampenedUpdate),
        })
    }
}
