//! Integration tests for the sampling loop

use std::collections::HashSet;
use std::sync::Arc;

use random_mod_collector::sampling::{
    BeatmapPool, FailedBeatmapPolicy, SamplingEngine, SamplingError, SamplingMode, SamplingOptions,
};
use random_mod_collector::shutdown::ShutdownCoordinator;

use crate::support::{FakeOracle, FakeSource};

fn options(beatmaps: usize, samples: usize) -> SamplingOptions {
    SamplingOptions {
        beatmaps_per_run: beatmaps,
        samples_per_beatmap: samples,
        ..SamplingOptions::default()
    }
}

fn engine(source: Arc<FakeSource>, oracle: Arc<FakeOracle>, options: SamplingOptions) -> SamplingEngine {
    SamplingEngine::new(source, oracle, options, ShutdownCoordinator::shared()).with_rng_seed(42)
}

#[tokio::test]
async fn test_two_beatmaps_three_samples() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new(vec![10, 20]);

    let report = engine(source.clone(), oracle, options(2, 3)).run(&pool).await.unwrap();

    assert_eq!(report.records.len(), 6);
    assert_eq!(report.records.iter().filter(|r| r.id == 10).count(), 3);
    assert_eq!(report.records.iter().filter(|r| r.id == 20).count(), 3);
    assert_eq!(report.succeeded, 2);
    assert!(report.failures.is_empty());

    for record in &report.records {
        assert_eq!(record.base_difficulty, FakeOracle::baseline_for(record.id));
        let expected = record.base_difficulty + f64::from(record.angle_sharpness) / 10.0;
        assert!((record.new_difficulty - expected).abs() < 1e-9);
    }

    // Records of one beatmap are contiguous.
    let first_id = report.records[0].id;
    assert!(report.records[..3].iter().all(|r| r.id == first_id));
}

#[tokio::test]
async fn test_failed_fetch_is_skipped() {
    let source = Arc::new(FakeSource::new().failing(&[2]));
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new(vec![1, 2, 3]);

    let report = engine(source, oracle, options(3, 4)).run(&pool).await.unwrap();

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.records.len(), 8);
    assert!(report.records.iter().all(|r| r.id != 2));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, 2);
    assert!(report.failures[0].reason.contains("empty"));
}

#[tokio::test]
async fn test_failed_variant_discards_whole_beatmap() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new().failing_variants(&[20]));
    let pool = BeatmapPool::new(vec![10, 20]);

    let report = engine(source, oracle, options(2, 5)).run(&pool).await.unwrap();

    assert_eq!(report.records.len(), 5);
    assert!(report.records.iter().all(|r| r.id == 10));
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].reason.contains("unsupported beatmap"));
}

#[tokio::test]
async fn test_every_fetched_beatmap_is_released() {
    let source = Arc::new(FakeSource::new().failing(&[30]));
    let oracle = Arc::new(FakeOracle::new().failing_variants(&[20]));
    let pool = BeatmapPool::new(vec![10, 20, 30]);

    engine(source, oracle.clone(), options(3, 2)).run(&pool).await.unwrap();

    let released: HashSet<_> = oracle.released().into_iter().collect();
    assert_eq!(released, HashSet::from([10, 20]));
    assert_eq!(oracle.released().len(), 2);
}

#[tokio::test]
async fn test_selection_is_distinct() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new((1..=100).collect());

    let report = engine(source.clone(), oracle, options(30, 1)).run(&pool).await.unwrap();

    let selected: HashSet<_> = report.selected.iter().copied().collect();
    assert_eq!(report.selected.len(), 30);
    assert_eq!(selected.len(), 30);
    assert_eq!(source.fetched().len(), 30);
}

#[tokio::test]
async fn test_run_ends_when_pool_exhausted() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new(vec![7, 7, 8]);

    let report = engine(source, oracle, options(10, 2)).run(&pool).await.unwrap();

    assert_eq!(report.attempted(), 2);
    assert_eq!(report.records.len(), 4);
}

#[tokio::test]
async fn test_parameters_stay_in_range() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new((1..=50).collect());

    let report = engine(source, oracle.clone(), options(50, 20)).run(&pool).await.unwrap();

    assert_eq!(report.records.len(), 1000);
    for record in &report.records {
        assert!((1.0..=10.0).contains(&record.angle_sharpness));
        assert!(record.validate().is_ok());
    }
    for (_, mods) in oracle.evaluations() {
        assert!((1.0..=10.0).contains(&mods.angle_sharpness()));
    }
}

#[tokio::test]
async fn test_sweep_mode_spans_range() {
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new(vec![3]);
    let options = SamplingOptions {
        mode: SamplingMode::Sweep,
        ..options(1, 10)
    };

    let report = engine(source, oracle, options).run(&pool).await.unwrap();

    let angles: Vec<f32> = report.records.iter().map(|r| r.angle_sharpness).collect();
    assert_eq!(angles.len(), 10);
    assert_eq!(angles[0], 1.0);
    assert_eq!(angles[9], 10.0);
}

#[tokio::test]
async fn test_retain_policy_redraws_failed_beatmap() {
    let pool = BeatmapPool::new(vec![1, 2]);

    let excluded = engine(
        Arc::new(FakeSource::new().failing(&[2])),
        Arc::new(FakeOracle::new()),
        options(4, 2),
    )
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(excluded.attempted(), 2);

    let retained_options = SamplingOptions {
        failed_policy: FailedBeatmapPolicy::Retain,
        ..options(4, 2)
    };
    let retained = engine(
        Arc::new(FakeSource::new().failing(&[2])),
        Arc::new(FakeOracle::new()),
        retained_options,
    )
    .run(&pool)
    .await
    .unwrap();
    assert_eq!(retained.attempted(), 4);
    assert!(retained.succeeded <= 1);
    assert_eq!(retained.failures.len(), 4 - retained.succeeded);
    assert_eq!(retained.records.len(), retained.succeeded * 2);
    assert!(retained.failures.iter().all(|failure| failure.id == 2));
}

#[tokio::test]
async fn test_auth_failure_aborts_with_partial_records() {
    let source = Arc::new(FakeSource::new().auth_failing(&[6]));
    let oracle = Arc::new(FakeOracle::new());
    let pool = BeatmapPool::new(vec![5, 6]);

    let err = engine(source.clone(), oracle, options(2, 3)).run(&pool).await.unwrap_err();

    assert!(matches!(err, SamplingError::Auth { .. }));
    let partial = err.into_partial().unwrap();
    assert!(partial.records.iter().all(|r| r.id == 5));
    assert!(partial.records.is_empty() || partial.records.len() == 3);
    assert_eq!(source.fetched().last(), Some(&6));
}

#[tokio::test]
async fn test_cancellation_keeps_completed_beatmaps() {
    let shutdown = ShutdownCoordinator::shared();
    let source = Arc::new(FakeSource::new());
    let oracle = Arc::new(FakeOracle::new().shutdown_after(4, shutdown.clone()));
    let pool = BeatmapPool::new(vec![1, 2, 3]);

    let mut engine = SamplingEngine::new(source, oracle, options(3, 3), shutdown).with_rng_seed(1);
    let err = engine.run(&pool).await.unwrap_err();

    assert!(matches!(err, SamplingError::Cancelled { .. }));
    let partial = err.into_partial().unwrap();
    assert_eq!(partial.records.len(), 3);
    assert_eq!(partial.succeeded, 1);
}

#[tokio::test]
async fn test_same_rng_seed_reproduces_run() {
    let pool = BeatmapPool::new((1..=20).collect());

    let first = engine(Arc::new(FakeSource::new()), Arc::new(FakeOracle::new()), options(5, 4))
        .run(&pool)
        .await
        .unwrap();
    let second = engine(Arc::new(FakeSource::new()), Arc::new(FakeOracle::new()), options(5, 4))
        .run(&pool)
        .await
        .unwrap();

    assert_eq!(first.records, second.records);
}
