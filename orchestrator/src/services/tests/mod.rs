//! Service-specific tests
//!
//! File-backed stores are exercised against temporary directories.


// Common test utilities for services
pub mod common {
    use shared::{ClusterId, RunId};

    use crate::config::{RawConfig, RunConfig};
    use crate::core::iteration::{ClusterResult, IterationStats, RunTally};
    use crate::traits::{Checkpoint, CHECKPOINT_VERSION};

    pub fn test_run_id() -> RunId {
        RunId::from_string("550e8400-e29b-41d4-a716-446655440000").expect("Valid test run ID")
    }

    pub fn cluster_result(iteration: u32, cluster: usize) -> ClusterResult {
        ClusterResult {
            iteration,
            cluster: ClusterId::from_index(cluster),
            rows: vec![format!("g{cluster}"), format!("g{}", cluster + 10)],
            columns: vec!["s1".to_string()],
            residual: 0.1 * cluster as f64,
        }
    }

    pub fn stats(iteration: u32) -> IterationStats {
        IterationStats {
            iteration,
            median_residual: 0.2,
            cluster_residuals: vec![0.1, 0.3],
            fuzzy_coeff: 0.4,
            module_means: Default::default(),
            row_changes: 3,
            col_changes: 1,
            anomalies: 0,
            degradations: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn checkpoint(iteration: u32) -> Checkpoint {
        let raw = RawConfig {
            num_iterations: Some(20),
            checkpoint_interval: Some(5),
            ..RawConfig::default()
        };
        Checkpoint {
            version: CHECKPOINT_VERSION,
            run_id: test_run_id(),
            iteration,
            config: RunConfig::resolve(&raw, 40).expect("Valid test config"),
            membership: vec![iteration as u8; 16],
            row_modules: Vec::new(),
            column_modules: Vec::new(),
            tally: RunTally::default(),
        }
    }
}
