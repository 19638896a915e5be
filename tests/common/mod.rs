//! In-memory metrics service driven by tokio's (paused) clock

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use perf_gate::client::{MetricsSource, PerfHistory};
use perf_gate::metrics::{MetricSample, MetricValues, ScriptCounters};
use perf_gate::{Error, Result};

/// Baseline metric levels of a scenario
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub fps: f64,
    pub frame_ms: f64,
    pub script_ms: f64,
    pub physics_ms: f64,
}

impl Scenario {
    pub const fn new(fps: f64, frame_ms: f64, script_ms: f64, physics_ms: f64) -> Self {
        Self {
            fps,
            frame_ms,
            script_ms,
            physics_ms,
        }
    }

    /// Values of the `k`-th sample: a small deterministic sawtooth around the baseline
    fn values(&self, k: u64) -> MetricValues {
        let wobble = (k % 5) as f64;
        MetricValues {
            fps: self.fps - wobble * 0.5,
            frame_time_ms: self.frame_ms + wobble * 0.25,
            script_time_ms: self.script_ms + wobble * 0.1,
            physics_time_ms: self.physics_ms + wobble * 0.1,
            render_time_ms: 1.0,
            entity_count: 100 + k,
            collision_checks: 40,
            spatial_hash_cells: 12,
        }
    }
}

/// How the history endpoint behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    Available,
    /// Every history read fails
    Missing,
    /// Opening reads succeed, closing reads fail
    FailClosing,
}

#[derive(Debug, Default)]
struct Loaded {
    name: String,
    at: Option<Instant>,
    seq_base: u64,
}

#[derive(Debug, Default)]
struct State {
    loaded: Loaded,
    next_seq_base: u64,
    history_calls: usize,
    snapshot_calls: usize,
    loads: Vec<String>,
}

pub struct MockSource {
    scenarios: BTreeMap<String, Scenario>,
    failing_loads: BTreeSet<String>,
    tick: Duration,
    capacity: usize,
    history_mode: HistoryMode,
    state: Mutex<State>,
}

impl MockSource {
    pub fn new(scenarios: &[(&str, Scenario)]) -> Self {
        Self {
            scenarios: scenarios
                .iter()
                .map(|(name, s)| ((*name).to_string(), *s))
                .collect(),
            failing_loads: BTreeSet::new(),
            tick: Duration::from_millis(200),
            capacity: 300,
            history_mode: HistoryMode::Available,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_history(mut self, mode: HistoryMode) -> Self {
        self.history_mode = mode;
        self
    }

    pub fn failing_load(mut self, name: &str) -> Self {
        self.failing_loads.insert(name.to_string());
        self
    }

    pub fn loads(&self) -> Vec<String> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    fn current(&self, state: &State) -> Result<(Scenario, u64, Instant)> {
        let at = state
            .loaded
            .at
            .ok_or_else(|| Error::Protocol("no scenario loaded".into()))?;
        let scenario = self.scenarios[&state.loaded.name];
        Ok((scenario, state.loaded.seq_base, at))
    }

    fn produced(&self, since: Instant) -> u64 {
        let ticks = since.elapsed().as_nanos() / self.tick.as_nanos();
        u64::try_from(ticks).unwrap()
    }
}

#[async_trait]
impl MetricsSource for MockSource {
    async fn snapshot(&self) -> Result<MetricValues> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        let (scenario, _, at) = self.current(&state)?;
        Ok(scenario.values(self.produced(at)))
    }

    async fn history(&self) -> Result<PerfHistory> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        let closing = state.history_calls % 2 == 0;
        match self.history_mode {
            HistoryMode::Missing => {
                return Err(Error::Transport("/perf/history returned 404".into()));
            }
            HistoryMode::FailClosing if closing => {
                return Err(Error::Transport("connection reset".into()));
            }
            _ => {}
        }

        let (scenario, base, at) = self.current(&state)?;
        let produced = self.produced(at);
        let capacity = self.capacity as u64;
        let first = produced.saturating_sub(capacity) + 1;
        let samples = (first..=produced)
            .map(|k| MetricSample {
                seq: Some(base + k),
                at_seconds: (self.tick * u32::try_from(k).unwrap()).as_secs_f64(),
                values: scenario.values(k),
            })
            .collect();
        Ok(PerfHistory {
            samples,
            capacity: self.capacity,
            dropped_samples: produced.saturating_sub(capacity),
        })
    }

    async fn script_counters(&self) -> Result<ScriptCounters> {
        Ok(ScriptCounters {
            loaded_scripts: 3,
            ..Default::default()
        })
    }

    async fn list_entities(&self) -> Result<Vec<String>> {
        Ok(self.scenarios.keys().rev().cloned().collect())
    }

    async fn load_entity(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.loads.push(name.to_string());
        if self.failing_loads.contains(name) || !self.scenarios.contains_key(name) {
            return Err(Error::Protocol(format!("unknown example {name}")));
        }
        // Sequence numbers keep growing across loads
        let base = state.next_seq_base;
        state.next_seq_base += 1_000_000;
        state.loaded = Loaded {
            name: name.to_string(),
            at: Some(Instant::now()),
            seq_base: base,
        };
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}
