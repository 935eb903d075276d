//! Run configuration
//!
//! A [`RawConfig`] is what the user wrote: every key optional. It is resolved
//! exactly once, at run start, into an immutable [`RunConfig`]; resolution
//! reports every missing or invalid key at once.

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scoring::types::{ModuleConfig, ScoreSide, ScoringKind};

/// Unresolved configuration as read from a JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub num_clusters: Option<usize>,
    #[serde(rename = "memb.clusters_per_row")]
    pub clusters_per_row: Option<usize>,
    #[serde(rename = "memb.clusters_per_col")]
    pub clusters_per_col: Option<usize>,
    #[serde(rename = "memb.min_cluster_rows")]
    pub min_cluster_rows: Option<usize>,
    #[serde(rename = "memb.prob_row_change")]
    pub prob_row_change: Option<f64>,
    #[serde(rename = "memb.prob_col_change")]
    pub prob_col_change: Option<f64>,
    #[serde(rename = "memb.max_changes_per_row")]
    pub max_changes_per_row: Option<usize>,
    #[serde(rename = "memb.max_changes_per_col")]
    pub max_changes_per_col: Option<usize>,
    #[serde(rename = "memb.use_fuzzy")]
    pub use_fuzzy: Option<bool>,
    pub num_iterations: Option<u32>,
    pub start_iteration: Option<u32>,
    pub checkpoint_interval: Option<u32>,
    pub result_freq: Option<u32>,
    pub stats_freq: Option<u32>,
    pub postadjust: Option<bool>,
    pub random_seed: Option<u64>,
    #[serde(rename = "seeding.rows")]
    pub row_seeding: Option<RowSeeding>,
    #[serde(rename = "seeding.columns")]
    pub column_seeding: Option<ColumnSeeding>,
    pub normalize_scores: Option<bool>,
    pub row_scoring: Option<Vec<ModuleConfig>>,
    pub column_scoring: Option<Vec<ModuleConfig>>,
}

impl RawConfig {
    pub fn from_json_str(json: &str) -> OrchestratorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Row seeding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSeeding {
    Kmeans,
    Random,
}

/// Column seeding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSeeding {
    Variance,
    Random,
}

/// Membership bounds and update dampening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipParams {
    pub clusters_per_row: usize,
    pub clusters_per_col: usize,
    pub min_cluster_rows: usize,
    pub prob_row_change: f64,
    pub prob_col_change: f64,
    pub max_changes_per_row: usize,
    pub max_changes_per_col: usize,
    pub use_fuzzy: bool,
}

/// Resolved, immutable run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub num_clusters: usize,
    pub membership: MembershipParams,
    pub num_iterations: u32,
    pub start_iteration: u32,
    /// Zero disables checkpointing
    pub checkpoint_interval: u32,
    pub result_freq: u32,
    pub stats_freq: u32,
    pub postadjust: bool,
    pub random_seed: u64,
    pub row_seeding: RowSeeding,
    pub column_seeding: ColumnSeeding,
    pub normalize_scores: bool,
    pub row_scoring: Vec<ModuleConfig>,
    pub column_scoring: Vec<ModuleConfig>,
}

impl RunConfig {
    /// Resolve a raw configuration against a matrix with `num_rows` rows
    pub fn resolve(raw: &RawConfig, num_rows: usize) -> OrchestratorResult<Self> {
        let mut bad: Vec<String> = Vec::new();

        let num_iterations = required(&mut bad, "num_iterations", raw.num_iterations);
        let checkpoint_interval = required(&mut bad, "checkpoint_interval", raw.checkpoint_interval);

        let clusters_per_row = raw.clusters_per_row.unwrap_or(2);
        let num_clusters = raw
            .num_clusters
            .unwrap_or_else(|| ((num_rows * clusters_per_row) as f64 / 20.0).round().max(1.0) as usize);
        let clusters_per_col = raw
            .clusters_per_col
            .unwrap_or_else(|| ((num_clusters as f64 * 2.0 / 3.0).round() as usize).clamp(1, num_clusters.max(1)));

        if num_clusters == 0 {
            bad.push("num_clusters".to_string());
        }
        if clusters_per_row == 0 || clusters_per_row > num_clusters.max(1) {
            bad.push("memb.clusters_per_row".to_string());
        }
        if clusters_per_col == 0 || clusters_per_col > num_clusters.max(1) {
            bad.push("memb.clusters_per_col".to_string());
        }

        let min_cluster_rows = raw.min_cluster_rows.unwrap_or(2);
        if min_cluster_rows == 0 {
            bad.push("memb.min_cluster_rows".to_string());
        }

        let prob_row_change = raw.prob_row_change.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&prob_row_change) {
            bad.push("memb.prob_row_change".to_string());
        }
        let prob_col_change = raw.prob_col_change.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&prob_col_change) {
            bad.push("memb.prob_col_change".to_string());
        }

        let max_changes_per_row = raw.max_changes_per_row.unwrap_or(1);
        if max_changes_per_row == 0 {
            bad.push("memb.max_changes_per_row".to_string());
        }
        let max_changes_per_col = raw.max_changes_per_col.unwrap_or(5);
        if max_changes_per_col == 0 {
            bad.push("memb.max_changes_per_col".to_string());
        }

        if num_iterations == Some(0) {
            bad.push("num_iterations".to_string());
        }
        let start_iteration = raw.start_iteration.unwrap_or(1);
        if start_iteration == 0 || num_iterations.is_some_and(|n| start_iteration > n) {
            bad.push("start_iteration".to_string());
        }

        let result_freq = raw.result_freq.unwrap_or(10);
        if result_freq == 0 {
            bad.push("result_freq".to_string());
        }
        let stats_freq = raw.stats_freq.unwrap_or(10);
        if stats_freq == 0 {
            bad.push("stats_freq".to_string());
        }

        let row_scoring = raw
            .row_scoring
            .clone()
            .unwrap_or_else(|| vec![ModuleConfig::new("row", ScoringKind::Row)]);
        let column_scoring = raw
            .column_scoring
            .clone()
            .unwrap_or_else(|| vec![ModuleConfig::new("column", ScoringKind::Column)]);
        // Module names are unique across both sides; stats are keyed by them
        let mut names = std::collections::HashSet::new();
        validate_modules(&mut bad, &mut names, "row_scoring", &row_scoring, ScoreSide::Rows);
        validate_modules(&mut bad, &mut names, "column_scoring", &column_scoring, ScoreSide::Columns);

        if !bad.is_empty() {
            return Err(OrchestratorError::ConfigurationError { keys: bad });
        }

        Ok(Self {
            num_clusters,
            membership: MembershipParams {
                clusters_per_row,
                clusters_per_col,
                min_cluster_rows,
                prob_row_change,
                prob_col_change,
                max_changes_per_row,
                max_changes_per_col,
                use_fuzzy: raw.use_fuzzy.unwrap_or(true),
            },
            // Both are Some when `bad` is empty
            num_iterations: num_iterations.unwrap_or_default(),
            start_iteration,
            checkpoint_interval: checkpoint_interval.unwrap_or_default(),
            result_freq,
            stats_freq,
            postadjust: raw.postadjust.unwrap_or(true),
            random_seed: raw.random_seed.unwrap_or(1),
            row_seeding: raw.row_seeding.unwrap_or(RowSeeding::Kmeans),
            column_seeding: raw.column_seeding.unwrap_or(ColumnSeeding::Variance),
            normalize_scores: raw.normalize_scores.unwrap_or(true),
            row_scoring,
            column_scoring,
        })
    }

    pub fn is_checkpoint_iteration(&self, iteration: u32) -> bool {
        self.checkpoint_interval > 0 && iteration > 0 && iteration % self.checkpoint_interval == 0
    }

    pub fn is_result_iteration(&self, iteration: u32) -> bool {
        iteration == 1 || iteration % self.result_freq == 0
    }

    pub fn is_stats_iteration(&self, iteration: u32) -> bool {
        iteration == 1 || iteration % self.stats_freq == 0
    }
}

fn required<T>(bad: &mut Vec<String>, key: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        bad.push(key.to_string());
    }
    value
}

fn validate_modules<'a>(
    bad: &mut Vec<String>,
    names: &mut std::collections::HashSet<&'a str>,
    key: &str,
    modules: &'a [ModuleConfig],
    side: ScoreSide,
) {
    for module in modules {
        let prefix = format!("{key}.{}", module.name);
        if module.name.is_empty() || !names.insert(module.name.as_str()) {
            bad.push(format!("{prefix}.name"));
        }
        if module.kind.side() != side {
            bad.push(format!("{prefix}.kind"));
        }
        if !module.scaling.is_valid() {
            bad.push(format!("{prefix}.scaling"));
        }
        let needs_source = matches!(module.kind, ScoringKind::Network | ScoringKind::Motif);
        if needs_source && module.source.as_deref().map_or(true, str::is_empty) {
            bad.push(format!("{prefix}.source"));
        }
    }
}
