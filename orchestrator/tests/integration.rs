//! Integration tests for the run orchestrator
//!
//! End-to-end runs over the synthetic block matrix with in-memory and
//! file-backed stores: convergence, crash and resume, degraded modules and
//! the write ordering of per-iteration records.

mod common;

use std::sync::{Arc, Mutex};

use common::{AlwaysFailing, FlakyPersistence, TestFixtures, TestHelpers};
use orchestrator::core::ScoreMatrix;
use orchestrator::monitor::RunStatus;
use orchestrator::scoring::{Scaling, Schedule};
use orchestrator::services::{FileCheckpointStore, FileResultStore, InMemoryStore};
use orchestrator::traits::MockPersistenceStore;
use orchestrator::{OrchestratorError, PersistenceStore, RawConfig, RunOrchestrator, RunPhase};
use shared::Matrix;

fn in_memory(matrix: Arc<Matrix>) -> (RunOrchestrator<InMemoryStore, InMemoryStore>, InMemoryStore) {
    let store = InMemoryStore::new();
    (RunOrchestrator::new(matrix, store.clone(), store.clone()), store)
}

#[tokio::test]
async fn test_blocks_converge_to_dominant_clusters() {
    // Arrange
    let (mut orchestrator, store) = in_memory(TestFixtures::block_matrix());
    orchestrator.prepare_run(&TestFixtures::scenario_config()).await.unwrap();

    // Act
    let summary = orchestrator.run().await.unwrap();

    // Assert
    assert_eq!(orchestrator.phase(), RunPhase::Finished);
    assert_eq!(summary.first_iteration, 1);
    assert_eq!(summary.last_iteration, 10);
    assert!(summary.postadjusted);

    let membership = orchestrator.membership().unwrap();
    assert!(membership.satisfies_bounds());
    let mut dominant = Vec::new();
    for block in 0..TestFixtures::BLOCKS {
        let share = TestHelpers::dominant_share(membership, block);
        assert!(share >= 0.9, "block {block} only has {share:.2} of its rows in one cluster");
        dominant.push(TestHelpers::dominant_cluster(membership, block));
    }
    dominant.sort();
    dominant.dedup();
    assert_eq!(dominant.len(), TestFixtures::BLOCKS, "blocks must not share a cluster");

    let stats = store.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), (1..=11).collect::<Vec<_>>());
    assert!(stats.iter().all(|s| s.degradations.is_empty()));

    let metadata = store.read_run_metadata().await.unwrap();
    assert_eq!(metadata.run_id, Some(summary.run_id));
    assert_eq!(metadata.last_iteration, Some(11));
    assert!(metadata.finish_time.is_some());
    assert_eq!(store.checkpoint_iterations().await, vec![5, 10]);
}

#[tokio::test]
async fn test_resume_after_crash_matches_uninterrupted_run() {
    // Arrange: reference run without interruption
    let (mut reference, reference_store) = in_memory(TestFixtures::block_matrix());
    reference.prepare_run(&TestFixtures::scenario_config()).await.unwrap();
    reference.run().await.unwrap();
    let expected = reference.membership().unwrap().snapshot();

    // Act: crash right after the results of iteration 6 are durable
    let store = InMemoryStore::new();
    let mut crashing = RunOrchestrator::new(
        TestFixtures::block_matrix(),
        FlakyPersistence::new(store.clone(), 6),
        store.clone(),
    );
    crashing.prepare_run(&TestFixtures::scenario_config()).await.unwrap();
    let err = crashing.run().await.unwrap_err();
    let crashed_run_id = crashing.run_id().unwrap();

    // Assert: the marker never points past the last complete iteration
    assert!(matches!(err, OrchestratorError::IterationFailure { iteration: 6, .. }));
    assert_eq!(crashing.phase(), RunPhase::Failed);
    let metadata = store.read_run_metadata().await.unwrap();
    assert_eq!(metadata.last_iteration, Some(5));
    assert!(metadata.finish_time.is_none());
    assert_eq!(store.read_results(Some(6)).await.unwrap().len(), 4);

    // Act: restart from the latest checkpoint
    let mut resumed = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store.clone());
    resumed.init_from_checkpoint(None).await.unwrap();
    assert_eq!(resumed.start_iteration(), Some(6));
    let summary = resumed.run().await.unwrap();

    // Assert: same final membership, no duplicated records
    assert_eq!(summary.run_id, crashed_run_id);
    assert_eq!(summary.first_iteration, 6);
    assert_eq!(resumed.membership().unwrap().snapshot(), expected);

    let stats = store.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), (1..=11).collect::<Vec<_>>());
    assert_eq!(store.read_results(Some(6)).await.unwrap().len(), 4);

    let final_results = store.read_results(Some(11)).await.unwrap();
    let reference_results = reference_store.read_results(Some(11)).await.unwrap();
    for (got, want) in final_results.iter().zip(&reference_results) {
        assert_eq!(got.cluster, want.cluster);
        assert_eq!(got.rows, want.rows);
        assert_eq!(got.columns, want.columns);
        assert_eq!(got.residual, want.residual);
    }

    let metadata = store.read_run_metadata().await.unwrap();
    assert_eq!(metadata.resumed_at.len(), 1);
    assert_eq!(metadata.last_iteration, Some(11));
}

#[tokio::test]
async fn test_failing_module_degrades_every_iteration() {
    // Arrange
    let store = InMemoryStore::new();
    let mut orchestrator = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store.clone())
        .with_module(
            Box::new(AlwaysFailing::new("motif")),
            Schedule::always(),
            Scaling::Constant(1.0),
        );
    orchestrator.prepare_run(&TestFixtures::scenario_config()).await.unwrap();

    // Act
    let summary = orchestrator.run().await.unwrap();

    // Assert
    assert!(orchestrator.membership().unwrap().satisfies_bounds());
    // one failure per scored iteration, post-adjustment included
    assert_eq!(summary.degradations, 11);

    let stats = store.read_stats().await.unwrap();
    assert_eq!(stats.len(), 11);
    for record in &stats {
        assert_eq!(record.degradations.len(), 1, "iteration {}", record.iteration);
        assert!(record
            .degradations
            .iter()
            .all(|d| d.module == "motif" && d.iteration == record.iteration));
    }
}

#[tokio::test]
async fn test_crash_on_checkpoint_iteration_replays_it() {
    // Arrange
    let (mut reference, _) = in_memory(TestFixtures::block_matrix());
    reference.prepare_run(&TestFixtures::scenario_config()).await.unwrap();
    reference.run().await.unwrap();
    let expected = reference.membership().unwrap().snapshot();

    let store = InMemoryStore::new();
    let mut crashing = RunOrchestrator::new(
        TestFixtures::block_matrix(),
        FlakyPersistence::new(store.clone(), 10),
        store.clone(),
    );
    crashing.prepare_run(&TestFixtures::scenario_config()).await.unwrap();

    // Act: die between the results and the stats of checkpoint iteration 10
    let err = crashing.run().await.unwrap_err();

    // Assert: no checkpoint exists for an iteration whose stats are missing
    assert!(matches!(err, OrchestratorError::IterationFailure { iteration: 10, .. }));
    assert_eq!(store.checkpoint_iterations().await, vec![5]);
    assert_eq!(store.read_run_metadata().await.unwrap().last_iteration, Some(9));

    // Act
    let mut resumed = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store.clone());
    resumed.init_from_checkpoint(None).await.unwrap();
    resumed.run().await.unwrap();

    // Assert
    assert_eq!(resumed.start_iteration(), Some(6));
    let stats = store.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), (1..=11).collect::<Vec<_>>());
    assert_eq!(resumed.membership().unwrap().snapshot(), expected);
    assert_eq!(store.checkpoint_iterations().await, vec![5, 10]);
}

#[tokio::test]
async fn test_crash_before_first_checkpoint_leaves_none() {
    let store = InMemoryStore::new();
    let mut crashing = RunOrchestrator::new(
        TestFixtures::block_matrix(),
        FlakyPersistence::new(store.clone(), 5),
        store.clone(),
    );
    crashing.prepare_run(&TestFixtures::scenario_config()).await.unwrap();

    assert!(crashing.run().await.is_err());

    assert!(store.checkpoint_iterations().await.is_empty());
    assert_eq!(store.read_run_metadata().await.unwrap().last_iteration, Some(4));
}

#[tokio::test]
async fn test_resume_keeps_degradations_pending_at_checkpoint() {
    // Arrange: stats only every ten iterations, checkpoints every five
    let config = RawConfig {
        stats_freq: Some(10),
        ..TestFixtures::scenario_config()
    };
    let store = InMemoryStore::new();
    let mut crashing = RunOrchestrator::new(
        TestFixtures::block_matrix(),
        FlakyPersistence::new(store.clone(), 7),
        store.clone(),
    )
    .with_module(Box::new(AlwaysFailing::new("motif")), Schedule::always(), Scaling::default());
    crashing.prepare_run(&config).await.unwrap();
    assert!(crashing.run().await.is_err());

    // Act
    let mut resumed = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store.clone())
        .with_module(Box::new(AlwaysFailing::new("motif")), Schedule::always(), Scaling::default());
    resumed.init_from_checkpoint(None).await.unwrap();
    let summary = resumed.run().await.unwrap();

    // Assert: every iteration's degradation is recorded exactly once
    let stats = store.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), vec![1, 10, 11]);
    let recorded: Vec<u32> = stats
        .iter()
        .flat_map(|s| s.degradations.iter().map(|d| d.iteration))
        .collect();
    assert_eq!(recorded, (1..=11).collect::<Vec<_>>());
    assert_eq!(summary.degradations, 11);
}

#[tokio::test]
async fn test_degradations_survive_sparse_stats() {
    // Arrange
    let store = InMemoryStore::new();
    let config = RawConfig {
        stats_freq: Some(4),
        ..TestFixtures::short_config(8)
    };
    let mut orchestrator = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store.clone())
        .with_module(Box::new(AlwaysFailing::new("motif")), Schedule::always(), Scaling::default());
    orchestrator.prepare_run(&config).await.unwrap();

    // Act
    orchestrator.run().await.unwrap();

    // Assert: degradations of unrecorded iterations land in the next record
    let stats = store.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), vec![1, 4, 8]);
    let counts: Vec<usize> = stats.iter().map(|s| s.degradations.len()).collect();
    assert_eq!(counts, vec![1, 3, 4]);
}

#[tokio::test]
async fn test_results_are_written_before_stats_and_marker() {
    // Arrange
    let mut store = MockPersistenceStore::new();
    let mut seq = mockall::Sequence::new();
    store
        .expect_create_schema()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    store
        .expect_write_run_metadata()
        .withf(|u| u.start_time.is_some() && u.num_iterations == Some(2))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    for iteration in 1..=2u32 {
        store
            .expect_write_results()
            .withf(move |it, results| *it == iteration && results.len() == 4)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_write_stats()
            .withf(move |stats| stats.iteration == iteration)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_write_run_metadata()
            .withf(move |u| u.last_iteration == Some(iteration))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }
    store
        .expect_write_run_metadata()
        .withf(|u| u.finish_time.is_some())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let mut orchestrator = RunOrchestrator::new(TestFixtures::block_matrix(), store, InMemoryStore::new());
    orchestrator.prepare_run(&TestFixtures::short_config(2)).await.unwrap();

    // Act & Assert: the mock panics on any out-of-order write
    orchestrator.run().await.unwrap();
}

#[tokio::test]
async fn test_stats_failure_leaves_marker_behind() {
    // Arrange
    let markers = Arc::new(Mutex::new(Vec::new()));
    let mut store = MockPersistenceStore::new();
    store.expect_create_schema().returning(|| Ok(()));
    let recorded = Arc::clone(&markers);
    store.expect_write_run_metadata().returning(move |update| {
        if let Some(iteration) = update.last_iteration {
            recorded.lock().unwrap().push(iteration);
        }
        Ok(())
    });
    store.expect_write_results().returning(|_, _| Ok(()));
    store.expect_write_stats().returning(|stats| match stats.iteration {
        1 => Ok(()),
        _ => Err(OrchestratorError::state("disk full")),
    });

    let mut orchestrator = RunOrchestrator::new(TestFixtures::block_matrix(), store, InMemoryStore::new());
    orchestrator.prepare_run(&TestFixtures::short_config(3)).await.unwrap();

    // Act
    let err = orchestrator.run().await.unwrap_err();

    // Assert
    assert!(matches!(err, OrchestratorError::IterationFailure { iteration: 2, .. }));
    assert_eq!(*markers.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_missing_required_keys_are_reported() {
    // Arrange
    let (mut orchestrator, _store) = in_memory(TestFixtures::block_matrix());
    let config = RawConfig {
        num_iterations: None,
        checkpoint_interval: None,
        ..TestFixtures::scenario_config()
    };

    // Act
    let err = orchestrator.prepare_run(&config).await.unwrap_err();

    // Assert
    match err {
        OrchestratorError::ConfigurationError { keys } => {
            assert!(keys.contains(&"num_iterations".to_string()));
            assert!(keys.contains(&"checkpoint_interval".to_string()));
        }
        other => panic!("expected a configuration error, got {other}"),
    }
    assert_eq!(orchestrator.phase(), RunPhase::NotStarted);
}

#[tokio::test]
async fn test_too_many_clusters_fail_seeding() {
    // Arrange: 40 rows cannot give 30 clusters two rows each
    let (mut orchestrator, _store) = in_memory(TestFixtures::block_matrix());
    let config = RawConfig {
        num_clusters: Some(30),
        ..TestFixtures::scenario_config()
    };

    // Act
    let err = orchestrator.prepare_run(&config).await.unwrap_err();

    // Assert
    assert!(matches!(err, OrchestratorError::SeedingError { .. }));
}

#[tokio::test]
async fn test_resume_rejects_other_matrix() {
    // Arrange
    let (mut first, store) = in_memory(TestFixtures::block_matrix());
    first.prepare_run(&TestFixtures::scenario_config()).await.unwrap();
    first.run().await.unwrap();

    // Act
    let mut other = RunOrchestrator::new(TestFixtures::relabeled_matrix(), store.clone(), store.clone());
    let err = other.init_from_checkpoint(Some(5)).await.unwrap_err();

    // Assert
    assert!(matches!(err, OrchestratorError::CheckpointError { .. }));
}

#[tokio::test]
async fn test_resume_without_checkpoint_fails() {
    let (mut orchestrator, _store) = in_memory(TestFixtures::block_matrix());
    let err = orchestrator.init_from_checkpoint(None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CheckpointError { .. }));
    assert!(orchestrator.run().await.is_err());
}

#[tokio::test]
async fn test_file_stores_end_to_end() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let results = FileResultStore::new(dir.path());
    let checkpoints = FileCheckpointStore::new(dir.path());
    let mut orchestrator = RunOrchestrator::new(TestFixtures::block_matrix(), results, checkpoints);
    let config = RawConfig {
        num_iterations: Some(6),
        checkpoint_interval: Some(3),
        result_freq: Some(2),
        stats_freq: Some(3),
        ..TestFixtures::scenario_config()
    };
    orchestrator.prepare_run(&config).await.unwrap();

    // Act
    let summary = orchestrator.run().await.unwrap();

    // Assert
    let reader = FileResultStore::new(dir.path());
    let stats = reader.read_stats().await.unwrap();
    assert_eq!(TestHelpers::stats_iterations(&stats), vec![1, 3, 6, 7]);
    let mut written: Vec<u32> = reader
        .read_results(None)
        .await
        .unwrap()
        .iter()
        .map(|r| r.iteration)
        .collect();
    written.dedup();
    assert_eq!(written, vec![1, 2, 4, 6, 7]);

    let metadata = reader.read_run_metadata().await.unwrap();
    let status = RunStatus::infer(&metadata, chrono::Utc::now(), chrono::Duration::minutes(10));
    assert_eq!(status, RunStatus::Finished { last_iteration: Some(7) });
    assert_eq!(metadata.run_id, Some(summary.run_id));

    assert!(dir.path().join("checkpoints").join("checkpoint-000003.bin").exists());
    assert!(dir.path().join("checkpoints").join("checkpoint-000006.bin").exists());
}

#[tokio::test]
async fn test_zero_weight_module_does_not_change_outcome() {
    // Arrange
    struct Constant;
    impl orchestrator::scoring::ScoringFunction for Constant {
        fn name(&self) -> &str {
            "flat"
        }
        fn kind(&self) -> orchestrator::scoring::ScoringKind {
            orchestrator::scoring::ScoringKind::Row
        }
        fn compute(
            &mut self,
            input: &orchestrator::scoring::ScoringInput<'_>,
        ) -> Result<ScoreMatrix, orchestrator::scoring::ScoringError> {
            Ok(ScoreMatrix::from_fn(input.matrix.num_rows(), input.num_clusters(), |_, _| 7.0))
        }
    }

    let (mut plain, _) = in_memory(TestFixtures::block_matrix());
    plain.prepare_run(&TestFixtures::short_config(4)).await.unwrap();
    plain.run().await.unwrap();

    let store = InMemoryStore::new();
    let mut weighted = RunOrchestrator::new(TestFixtures::block_matrix(), store.clone(), store)
        .with_module(Box::new(Constant), Schedule::always(), Scaling::Constant(0.0));
    weighted.prepare_run(&TestFixtures::short_config(4)).await.unwrap();

    // Act
    weighted.run().await.unwrap();

    // Assert
    assert_eq!(
        weighted.membership().unwrap().snapshot().rows,
        plain.membership().unwrap().snapshot().rows
    );
}
