//! Sampler and runner tests against an in-memory service
//!
//! Time is paused, so every window completes instantly and deterministically.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use common::{HistoryMode, MockSource, Scenario};
use perf_gate::client::MetricsSource;
use perf_gate::metrics::{Metric, RunSummary, ScriptCounters};
use perf_gate::runner::{self, RunPlan};
use perf_gate::sampler::{SampleSource, Sampler};
use perf_gate::thresholds::{ThresholdStore, Thresholds};

const ARENA: Scenario = Scenario::new(60.0, 16.0, 2.0, 3.0);
const RTS: Scenario = Scenario::new(30.0, 33.0, 9.0, 12.0);

fn plan(entities: &[&str]) -> RunPlan {
    RunPlan {
        entities: entities.iter().map(ToString::to_string).collect(),
        duration_per_entity: Duration::from_secs(1),
        warmup: Duration::from_millis(500),
        sample_interval: Duration::from_millis(250),
        use_history: true,
    }
}

#[tokio::test(start_paused = true)]
async fn test_history_window_contains_only_new_samples() {
    let source = MockSource::new(&[("arena", ARENA)]);
    source.load_entity("arena").await.unwrap();
    // Samples produced before the window opens must not leak in
    tokio::time::sleep(Duration::from_millis(600)).await;

    let sampler = Sampler::new(Duration::from_secs(1), Duration::from_millis(250), true);
    let window = sampler.sample(&source).await.unwrap();

    assert_eq!(window.source, SampleSource::History);
    let seqs: Vec<u64> = window.samples.iter().map(|s| s.seq.unwrap()).collect();
    assert_eq!(seqs, vec![4, 5, 6, 7, 8]);
    assert_eq!(window.dropped, 0);
    assert!(window.samples.windows(2).all(|w| w[0].at_seconds <= w[1].at_seconds));
}

#[tokio::test(start_paused = true)]
async fn test_history_overwrite_reports_drops() {
    let source = MockSource::new(&[("arena", ARENA)]).with_capacity(3);
    source.load_entity("arena").await.unwrap();

    let sampler = Sampler::new(Duration::from_secs(1), Duration::from_millis(250), true);
    let window = sampler.sample(&source).await.unwrap();

    let seqs: Vec<u64> = window.samples.iter().map(|s| s.seq.unwrap()).collect();
    assert_eq!(seqs, vec![3, 4, 5]);
    assert_eq!(window.dropped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_falls_back_to_polling_without_history() {
    let source = MockSource::new(&[("arena", ARENA)]).with_history(HistoryMode::Missing);
    source.load_entity("arena").await.unwrap();

    let sampler = Sampler::new(Duration::from_secs(1), Duration::from_millis(250), true);
    let started = Instant::now();
    let window = sampler.sample(&source).await.unwrap();

    assert_eq!(window.source, SampleSource::Polling);
    assert_eq!(window.samples.len(), 4);
    assert_eq!(source.snapshot_calls(), 4);
    assert!(window.samples.iter().all(|s| s.seq.is_none()));
    assert!(started.elapsed() <= sampler.duration() + sampler.interval());
}

#[tokio::test(start_paused = true)]
async fn test_polling_is_bounded_by_window_plus_interval() {
    let source = MockSource::new(&[("arena", ARENA)]);
    source.load_entity("arena").await.unwrap();

    // Interval longer than the window: one poll, then the window closes
    let sampler = Sampler::new(Duration::from_millis(500), Duration::from_secs(3), false);
    let started = Instant::now();
    let window = sampler.sample(&source).await.unwrap();

    assert_eq!(window.source, SampleSource::Polling);
    assert_eq!(window.samples.len(), 1);
    assert!(started.elapsed() <= sampler.duration() + sampler.interval());
}

#[tokio::test(start_paused = true)]
async fn test_run_gates_each_entity_with_effective_thresholds() {
    let source = MockSource::new(&[("arena", ARENA), ("rts", RTS)]);
    let mut entities = BTreeMap::new();
    entities.insert(
        "rts".to_string(),
        Thresholds {
            min_fps_p50: Some(25.0),
            max_frame_ms_p95: Some(40.0),
            ..Thresholds::unset()
        },
    );
    let store = ThresholdStore::new(
        Thresholds {
            min_fps_p50: Some(55.0),
            max_frame_ms_p95: Some(20.0),
            ..Thresholds::unset()
        },
        entities,
    );

    let report = runner::run(&source, &plan(&["arena", "rts"]), &store).await;

    assert!(report.passed, "failures: {:?}", report.failures);
    assert_eq!(source.loads(), vec!["arena".to_string(), "rts".to_string()]);
    let rts = &report.entities[1];
    assert_eq!(rts.thresholds.min_fps_p50, Some(25.0));
    let summary = rts.summary.unwrap();
    assert_eq!(summary.sample_count, 5);
    assert_eq!(summary.scripts.loaded_scripts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_adhoc_overrides_beat_entity_records() {
    let source = MockSource::new(&[("rts", RTS)]);
    let mut entities = BTreeMap::new();
    entities.insert(
        "rts".to_string(),
        Thresholds {
            min_fps_p50: Some(25.0),
            ..Thresholds::unset()
        },
    );
    let store = ThresholdStore::new(Thresholds::unset(), entities).with_adhoc(Thresholds {
        min_fps_p50: Some(50.0),
        ..Thresholds::unset()
    });

    let report = runner::run(&source, &plan(&["rts"]), &store).await;

    assert!(!report.passed);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("rts: fps.p50 "), "{}", report.failures[0]);
    assert!(report.failures[0].ends_with("< 50.00"), "{}", report.failures[0]);
    assert_eq!(report.thresholds.min_fps_p50, Some(50.0));
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_skips_entity_and_fails_run() {
    let source = MockSource::new(&[("arena", ARENA), ("rts", RTS)]).failing_load("arena");

    let report = runner::run(&source, &plan(&["arena", "rts"]), &ThresholdStore::default()).await;

    assert!(!report.passed);
    let arena = &report.entities[0];
    assert!(arena.summary.is_none());
    assert!(arena.skipped.as_deref().unwrap().starts_with("load failed"));
    assert!(report.entities[1].passed);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("arena: load failed"));
}

#[tokio::test(start_paused = true)]
async fn test_lost_closing_read_skips_entity() {
    let source = MockSource::new(&[("arena", ARENA)]).with_history(HistoryMode::FailClosing);

    let report = runner::run(&source, &plan(&["arena"]), &ThresholdStore::default()).await;

    assert!(!report.passed);
    let arena = &report.entities[0];
    assert!(arena.skipped.as_deref().unwrap().starts_with("sample window lost"));
    assert_eq!(arena.sample_source, None);
}

#[tokio::test(start_paused = true)]
async fn test_empty_window_is_evaluated_as_zeros() {
    // The producer never completes a tick inside the window
    let source = MockSource::new(&[("arena", ARENA)]).with_tick(Duration::from_secs(60));
    let store = ThresholdStore::new(
        Thresholds {
            min_fps_p50: Some(60.0),
            ..Thresholds::unset()
        },
        BTreeMap::new(),
    );

    let report = runner::run(&source, &plan(&["arena"]), &store).await;

    let arena = &report.entities[0];
    let summary = arena.summary.unwrap();
    assert_eq!(summary.sample_count, 0);
    assert_eq!(summary.fps.p50, 0.0);
    assert_eq!(arena.failures, vec!["fps.p50 0.00 < 60.00".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_runs_summarize_identically() {
    let first_source = MockSource::new(&[("arena", ARENA), ("rts", RTS)]);
    let second_source = MockSource::new(&[("arena", ARENA), ("rts", RTS)]);
    let store = ThresholdStore::default();

    let first = runner::run(&first_source, &plan(&["arena", "rts"]), &store).await;
    let second = runner::run(&second_source, &plan(&["arena", "rts"]), &store).await;

    let summaries = |r: &perf_gate::report::Report| {
        r.entities.iter().map(|e| e.summary).collect::<Vec<_>>()
    };
    assert_eq!(summaries(&first), summaries(&second));
}

#[tokio::test(start_paused = true)]
async fn test_history_and_polling_summaries_are_bit_identical() {
    let tick = Duration::from_millis(250);
    let sampler = Sampler::new(Duration::from_secs(1), tick, true);

    let history_source = MockSource::new(&[("arena", ARENA)]).with_tick(tick);
    history_source.load_entity("arena").await.unwrap();
    let from_history = sampler.sample(&history_source).await.unwrap();

    // Polls land one tick after load, so both windows cover samples 1..=4
    let polling_source = MockSource::new(&[("arena", ARENA)])
        .with_tick(tick)
        .with_history(HistoryMode::Missing);
    polling_source.load_entity("arena").await.unwrap();
    tokio::time::sleep(tick).await;
    let from_polling = sampler.sample(&polling_source).await.unwrap();

    assert_eq!(from_history.source, SampleSource::History);
    assert_eq!(from_polling.source, SampleSource::Polling);

    let history = RunSummary::from_samples(&from_history.samples, ScriptCounters::default());
    let polling = RunSummary::from_samples(&from_polling.samples, ScriptCounters::default());
    assert_eq!(history.sample_count, 4);
    assert_eq!(history.sample_count, polling.sample_count);

    let bits = |m: &perf_gate::metrics::MetricSummary| {
        [m.min, m.avg, m.p50, m.p95, m.max].map(f64::to_bits)
    };
    for metric in Metric::ALL {
        assert_eq!(
            bits(history.metric(metric)),
            bits(polling.metric(metric)),
            "{metric}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_resolve_entities() {
    let source = MockSource::new(&[("arena", ARENA), ("rts", RTS)]);

    let discovered = runner::resolve_entities(&source, None).await.unwrap();
    assert_eq!(discovered, vec!["arena".to_string(), "rts".to_string()]);

    let requested = runner::resolve_entities(&source, Some("rts, rts ,")).await.unwrap();
    assert_eq!(requested, vec!["rts".to_string()]);

    let empty = MockSource::new(&[]);
    assert!(runner::resolve_entities(&empty, Some(" ")).await.is_err());
}
