//! Core business logic modules
//!
//! Pure computation with no I/O: membership state and its update rules,
//! seeding, residuals and the per-iteration records. Everything here is
//! deterministic for a given [`crate::context::RunContext`].

pub mod iteration;
pub mod membership;
pub mod residual;
pub mod scores;
pub mod seeding;
pub mod update;

pub use iteration::{ClusterResult, IterationResult, IterationStats, RunTally, SubResult};
pub use membership::{ClusterMembership, MembershipSnapshot};
pub use residual::{cluster_residual, SENTINEL_RESIDUAL};
pub use scores::ScoreMatrix;
pub use seeding::{ColumnSeeder, KMeansRowSeeder, RandomColumnSeeder, RandomRowSeeder, RowSeeder, VarianceColumnSeeder};
pub use update::{DampenedUpdate, Move, UpdateLimits, UpdatePolicy, SENTINEL_LOW_SCORE};
