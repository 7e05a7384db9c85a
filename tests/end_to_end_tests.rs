//! Full sessions at benchmark scale

use std::sync::Arc;

use tickbench::config::Config;
use tickbench::report::{self, SessionReport};
use tickbench::{
    build_sessions, BenchmarkError, BenchmarkMetrics, BenchmarkSuite, EngineKind, MemoryEngine,
    PhaseKind, PhaseOutcome, SessionState, INTERVAL_COUNT,
};
use tickbench_tests::{init_test_environment, test_session, RecordingObserver, ShufflingEngine};
use tokio_util::sync::CancellationToken;

const RECORDS: u64 = 1_000_000;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_flows_one_million_records() {
    init_test_environment();
    let mut session = test_session(Arc::new(MemoryEngine::new()), 4, RECORDS, 0.0, CancellationToken::new());

    assert_eq!(session.init().await.unwrap(), PhaseOutcome::Completed);
    assert_eq!(session.write().await.unwrap(), PhaseOutcome::Completed);
    assert_eq!(session.records(PhaseKind::Write), RECORDS);

    assert_eq!(session.read().await.unwrap(), PhaseOutcome::Completed);
    assert_eq!(session.records_read(), RECORDS);
    assert_eq!(session.secondary_read().await.unwrap(), PhaseOutcome::Completed);
    assert_eq!(session.records_read(), RECORDS);

    let size = session.finish().await.unwrap();
    assert!(size > 0);
    assert_eq!(session.state(), SessionState::Finished);

    for kind in PhaseKind::MEASURED {
        let snapshot = session.snapshot(kind).unwrap();
        assert_eq!(snapshot.speed_samples.len(), INTERVAL_COUNT);
        assert!(snapshot.average_speed > 0.0);
        assert!(snapshot
            .average_speeds()
            .iter()
            .all(|(records, speed)| *records > 0 && *speed >= 0.0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_swapped_keys_fail_the_million_record_read() {
    init_test_environment();
    let mut session = test_session(
        Arc::new(ShufflingEngine::new(654_321)),
        4,
        RECORDS,
        0.0,
        CancellationToken::new(),
    );

    session.init().await.unwrap();
    session.write().await.unwrap();

    let err = session.read().await.unwrap_err();
    assert!(matches!(
        err,
        BenchmarkError::KeyOrderingViolation {
            previous: 654_322,
            key: 654_321,
            records_read: 654_322,
        }
    ));
    assert!(session.records_read() < RECORDS);
    assert!(session.snapshot(PhaseKind::Read).unwrap().is_empty());

    assert!(session.secondary_read().await.unwrap_err().is_ordering_violation());
    assert!(session.finish().await.unwrap() > 0);
    assert_eq!(session.state(), SessionState::Finished);
}

#[tokio::test]
async fn test_random_keys_stay_ordered_in_a_sorted_engine() {
    init_test_environment();
    let mut session = test_session(Arc::new(MemoryEngine::new()), 3, 30_000, 0.5, CancellationToken::new());

    session.init().await.unwrap();
    session.write().await.unwrap();
    assert_eq!(session.records(PhaseKind::Write), 30_000);

    // Colliding random keys overwrite each other.
    assert_eq!(session.read().await.unwrap(), PhaseOutcome::Completed);
    assert!(session.records_read() < 30_000);
    assert!(session.records_read() > 0);
}

#[tokio::test]
async fn test_configured_run_produces_reports() {
    init_test_environment();
    let dir = tempfile::TempDir::new().unwrap();

    let mut config = Config::default();
    config.session.flow_count = 2;
    config.session.record_count = 5_000;
    config.session.seed = Some(17);
    config.engines.enabled = vec![EngineKind::Memory, EngineKind::FlowFile];
    config.engines.data_directory = dir.path().to_path_buf();
    config.validate().unwrap();

    let observer = Arc::new(RecordingObserver::new());
    let metrics = Arc::new(BenchmarkMetrics::new().unwrap());
    let suite = BenchmarkSuite::with_observers(vec![observer.clone(), metrics.clone()]);

    let sessions = suite.run(build_sessions(&config, &CancellationToken::new())).await;
    let reports: Vec<SessionReport> = sessions.iter().map(SessionReport::from_session).collect();

    assert!(observer.exceptions().is_empty());
    assert_eq!(metrics.session_count(), 2);
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.records_read, 5_000);
        assert!(report.engine_size > 0);
        assert!(!report.failed);
        assert!(report
            .phases
            .iter()
            .all(|phase| phase.outcome == Some(PhaseOutcome::Completed)));
    }
    assert_eq!(reports[1].engine, "FlowFile");

    let csv = report::to_csv(&reports).unwrap();
    assert_eq!(csv.lines().count(), 1 + 2 * 3);
    let json = report::to_json(&reports).unwrap();
    assert!(json.contains("\"engine\": \"FlowFile\""));
}
