//! Full simulation runs through the public engine and store APIs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use pubsim::engine::random::{FailureCheck, RngSource, ScriptedSource};
use pubsim::engine::SimulationEngine;
use pubsim::settings::{Settings, SettingsPatch};
use pubsim::store::history::{HistoryFilter, HISTORY_CAPACITY};
use pubsim::store::{SimulationStore, StoreEvent};
use pubsim::types::{LogStatus, RunStatus, SimError};

use crate::recording_source::RecordingSource;

/// check + download + resolve at the scripted lower bounds, 1000 ms base.
const OPERATION_MS: u64 = 300 + 1000 + 500;
const INTER_OPERATION_MS: u64 = 1000;

fn store_with(auto_clear_cache: bool) -> Arc<SimulationStore> {
    Arc::new(SimulationStore::new(Settings {
        auto_clear_cache,
        ..Settings::default()
    }))
}

fn engine(auto_clear_cache: bool) -> SimulationEngine {
    SimulationEngine::new(store_with(auto_clear_cache), ScriptedSource::never_fail())
}

#[tokio::test(start_paused = true)]
async fn completed_run_logs_in_order() {
    let engine = engine(false);
    let entry = assert_ok!(engine.run("http", 3).await);

    assert_eq!(entry.status(), RunStatus::Completed);
    assert_eq!(entry.run().success_count, 3);
    assert_eq!(entry.run().failure_count, 0);
    assert!(entry.run().completed_at.is_some());

    let logs = entry.logs();
    assert_eq!(logs[0].operation, "INIT");
    assert_eq!(
        logs[0].message,
        "Starting simulation for package 'http' with 3 operations"
    );
    assert_eq!(logs.iter().filter(|l| l.operation == "COMPLETE").count(), 1);
    assert_eq!(logs.last().unwrap().operation, "COMPLETE");

    // Operations appear strictly in order.
    let labels: Vec<_> = logs
        .iter()
        .filter(|l| l.status == LogStatus::Success && l.operation.starts_with("PUB_GET_"))
        .map(|l| l.operation.as_str())
        .collect();
    assert_eq!(labels, vec!["PUB_GET_1", "PUB_GET_2", "PUB_GET_3"]);
    assert!(logs.iter().all(|l| !l.operation.starts_with("CACHE_CLEAR")));
}

#[tokio::test(start_paused = true)]
async fn outcomes_always_sum_to_operation_count() {
    let engine = SimulationEngine::new(store_with(true), RngSource::seeded(2024));
    for n in 1..=50u32 {
        let entry = assert_ok!(engine.run("provider", n).await);
        assert_eq!(entry.status(), RunStatus::Completed, "n = {n}");
        assert_eq!(entry.run().finished_operations(), n, "n = {n}");
    }
    assert_eq!(engine.store().history().await.len(), HISTORY_CAPACITY);
}

#[tokio::test(start_paused = true)]
async fn operation_count_bounds() {
    let engine = engine(false);
    assert_eq!(
        assert_err!(engine.start("http", 0).await),
        SimError::InvalidOperationCount(0)
    );
    assert_eq!(
        assert_err!(engine.start("http", 51).await),
        SimError::InvalidOperationCount(51)
    );
    assert!(engine.store().history().await.is_empty());

    let entry = assert_ok!(engine.run("http", 1).await);
    assert_eq!(entry.run().finished_operations(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_during_iteration_k_cancels_after_it() {
    for k in [0u64, 2, 4] {
        let engine = engine(false);
        assert_ok!(engine.start("http", 6).await);

        // Halfway through the download phase of operation k.
        let at = k * (OPERATION_MS + INTER_OPERATION_MS) + 900;
        tokio::time::sleep(Duration::from_millis(at)).await;
        assert!(engine.stop().await, "k = {k}");

        let entry = engine.wait().await.unwrap();
        assert_eq!(entry.status(), RunStatus::Cancelled, "k = {k}");
        assert!(entry.run().finished_operations() <= k as u32 + 1);
        assert_eq!(entry.run().finished_operations(), k as u32 + 1, "k = {k}");

        let logs = entry.logs();
        assert!(logs.iter().any(|l| l.operation == "STOP"));
        assert!(logs.iter().all(|l| l.operation != "COMPLETE"));
        assert!(logs
            .iter()
            .all(|l| l.operation != format!("PUB_GET_{}", k + 2)));
    }
}

#[tokio::test(start_paused = true)]
async fn stopped_run_blocks_new_start_until_archived() {
    let engine = engine(false);
    assert_ok!(engine.start("http", 3).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(engine.stop().await);

    // The in-flight operation is still draining.
    assert_eq!(
        assert_err!(engine.start("dio", 1).await),
        SimError::AlreadyRunning
    );
    engine.wait().await.unwrap();
    assert_ok!(engine.run("dio", 1).await);
}

#[tokio::test(start_paused = true)]
async fn history_evicts_oldest_beyond_capacity() {
    let engine = engine(false);
    let mut ids = Vec::new();
    for i in 0..=HISTORY_CAPACITY {
        let entry = assert_ok!(engine.run(&format!("pkg_{i}"), 1).await);
        ids.push(entry.id);
    }

    let history = engine.store().history().await;
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history[0].package_name(), format!("pkg_{HISTORY_CAPACITY}"));
    assert_eq!(history[HISTORY_CAPACITY - 1].package_name(), "pkg_1");
    assert!(engine.store().history_entry(ids[0]).await.is_none());
    assert!(engine.store().history_entry(ids[1]).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn archived_logs_are_snapshots() {
    let engine = engine(true);
    let first = assert_ok!(engine.run("http", 2).await);
    let archived_logs = first.logs().to_vec();

    assert_ok!(engine.run("dio", 1).await);

    let live = engine.store().logs().await;
    assert!(live[0].message.contains("'dio'"));

    let stored = engine.store().history_entry(first.id).await.unwrap();
    assert_eq!(stored.logs(), archived_logs.as_slice());
    assert_eq!(stored.package_name(), "http");

    let history = engine.store().history().await;
    assert_eq!(history[0].package_name(), "dio");
    assert_eq!(history[1].id, first.id);
}

#[tokio::test(start_paused = true)]
async fn forced_download_rolls() {
    let failing = RecordingSource::new().script(FailureCheck::Download, 0.05);
    let engine = SimulationEngine::new(store_with(true), failing.clone());
    let entry = assert_ok!(engine.run("http", 1).await);
    assert_eq!(entry.run().failure_count, 1);
    assert_eq!(entry.run().success_count, 0);
    // A failed download never reaches the cache clear.
    assert_eq!(failing.roll_count(FailureCheck::CacheClear), 0);
    assert!(entry
        .logs()
        .iter()
        .any(|l| l.message == "✗ Failed to download http: Network timeout"));

    let passing = RecordingSource::new().script(FailureCheck::Download, 0.5);
    let engine = SimulationEngine::new(store_with(true), passing.clone());
    let entry = assert_ok!(engine.run("http", 1).await);
    assert_eq!(entry.run().success_count, 1);
    assert_eq!(entry.run().failure_count, 0);
    assert_eq!(
        passing.rolls(),
        vec![(FailureCheck::Download, 0.5), (FailureCheck::CacheClear, 1.0)]
    );
}

#[tokio::test(start_paused = true)]
async fn failure_threshold_boundary() {
    let source = RecordingSource::new()
        .script(FailureCheck::Download, 0.0999)
        .script(FailureCheck::Download, 0.10)
        .script(FailureCheck::CacheClear, 0.05);
    let engine = SimulationEngine::new(store_with(true), source);
    let entry = assert_ok!(engine.run("http", 2).await);

    assert_eq!(entry.run().failure_count, 1);
    assert_eq!(entry.run().success_count, 1);
    let clear = entry
        .logs()
        .iter()
        .find(|l| l.operation == "CACHE_CLEAR_2" && l.status != LogStatus::Running)
        .unwrap();
    assert_eq!(clear.status, LogStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn cache_clear_failure_does_not_count() {
    let source = RecordingSource::new().script(FailureCheck::CacheClear, 0.01);
    let engine = SimulationEngine::new(store_with(true), source);
    let entry = assert_ok!(engine.run("shared_preferences", 2).await);

    assert_eq!(entry.run().success_count, 2);
    assert_eq!(entry.run().failure_count, 0);
    assert!(entry.logs().iter().any(|l| l.message
        == "✗ Cache clear failed: Failed to clear cache for shared_preferences: Permission denied"));
}

#[tokio::test(start_paused = true)]
async fn seeded_runs_are_reproducible() {
    let transcript = |seed| async move {
        let engine = SimulationEngine::new(store_with(true), RngSource::seeded(seed));
        let entry = engine.run("bloc", 20).await.unwrap();
        let lines: Vec<_> = entry
            .logs()
            .iter()
            .map(|l| (l.operation.clone(), l.status, l.message.clone(), l.duration_ms))
            .collect();
        (entry.run().success_count, entry.run().failure_count, lines)
    };

    assert_eq!(transcript(7).await, transcript(7).await);
}

#[tokio::test(start_paused = true)]
async fn base_delay_scales_run_time() {
    let engine = engine(false);
    assert_ok!(
        engine
            .store()
            .update_settings(&SettingsPatch {
                default_delay_ms: Some(100),
                ..Default::default()
            })
            .await
    );

    let started = Instant::now();
    assert_ok!(engine.run("http", 2).await);
    // Two operations at a tenth of the scripted phase time plus one gap.
    assert_eq!(
        started.elapsed(),
        Duration::from_millis(2 * OPERATION_MS / 10 + 100)
    );
}

#[tokio::test(start_paused = true)]
async fn zero_delay_falls_back_between_operations() {
    let engine = engine(false);
    engine
        .store()
        .replace_settings(Settings {
            default_delay_ms: 0,
            auto_clear_cache: false,
            ..Settings::default()
        })
        .await;

    let started = Instant::now();
    assert_ok!(engine.run("http", 3).await);
    assert_eq!(started.elapsed(), Duration::from_millis(2 * 500));
}

#[tokio::test(start_paused = true)]
async fn jitter_ranges_per_phase() {
    let source = RecordingSource::new();
    let engine = SimulationEngine::new(store_with(true), source.clone());
    assert_ok!(engine.run("http", 1).await);
    assert_eq!(
        source.jitters(),
        vec![(300, 800), (1000, 2500), (500, 1200), (200, 600)]
    );
}

#[tokio::test(start_paused = true)]
async fn observers_see_the_whole_run() {
    let engine = engine(false);
    let mut events = engine.store().subscribe();
    let entry = assert_ok!(engine.run("http", 2).await);

    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected receive error: {e}"),
        }
    }

    assert!(matches!(seen.first(), Some(StoreEvent::RunStarted { operation_count: 2, .. })));
    match seen.last() {
        Some(StoreEvent::RunFinished { entry: finished }) => assert_eq!(finished.id, entry.id),
        other => panic!("expected RunFinished last, got {other:?}"),
    }
    let logs = seen
        .iter()
        .filter(|e| matches!(e, StoreEvent::LogAppended { .. }))
        .count();
    assert_eq!(logs, entry.logs().len());
    assert!(seen.iter().any(|e| matches!(
        e,
        StoreEvent::Counters { success_count: 2, failure_count: 0 }
    )));
}

#[tokio::test(start_paused = true)]
async fn metrics_over_mixed_history() {
    let engine = engine(false);
    assert_ok!(engine.run("http", 2).await);
    assert_ok!(engine.run("dio", 3).await);

    assert_ok!(engine.start("http", 4).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop().await;
    engine.wait().await.unwrap();

    let all = engine.store().history_metrics(&HistoryFilter::default()).await;
    assert_eq!(all.total_runs, 3);
    assert_eq!(all.completed_runs, 2);
    assert_eq!(all.cancelled_runs, 1);
    assert_eq!(all.total_operations, 6);
    assert_eq!(all.successful_operations, 6);
    assert_eq!(all.success_rate, 100.0);

    let http = HistoryFilter {
        package: Some("http".into()),
        ..Default::default()
    };
    assert_eq!(engine.store().filter_history(&http).await.len(), 2);

    let cancelled = HistoryFilter {
        status: Some(RunStatus::Cancelled),
        ..Default::default()
    };
    let only = engine.store().filter_history(&cancelled).await;
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].run().finished_operations(), 1);
}
