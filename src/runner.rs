//! Per-entity gate run
//!
//! For each entity, strictly in sequence: load the scenario, let it warm up,
//! sample one window, summarize, then gate against the entity's effective
//! thresholds. Transport failures skip the entity, never the run.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::MetricsSource;
use crate::config::SamplingConfig;
use crate::evaluator::evaluate;
use crate::metrics::RunSummary;
use crate::report::{EntityReport, Report};
use crate::sampler::Sampler;
use crate::thresholds::ThresholdStore;
use crate::{Error, Result};

/// What to run and how to sample it
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Entities in run order
    pub entities: Vec<String>,
    /// Window length per entity
    pub duration_per_entity: Duration,
    /// Settle time after loading each entity
    pub warmup: Duration,
    /// Polling interval
    pub sample_interval: Duration,
    /// Prefer history reads over polling
    pub use_history: bool,
}

impl RunPlan {
    /// Plan for `entities` using sampling settings
    #[must_use]
    pub fn new(entities: Vec<String>, sampling: &SamplingConfig) -> Self {
        Self {
            entities,
            duration_per_entity: sampling.duration_per_entity,
            warmup: sampling.warmup,
            sample_interval: sampling.sample_interval,
            use_history: sampling.use_history,
        }
    }
}

/// Parse a comma-separated entity list: trimmed, deduplicated, sorted
#[must_use]
pub fn parse_entity_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Entities to run: the requested list if it names any, else every entity
/// the service offers.
pub async fn resolve_entities(
    source: &dyn MetricsSource,
    requested: Option<&str>,
) -> Result<Vec<String>> {
    if let Some(names) = requested.map(parse_entity_list).filter(|n| !n.is_empty()) {
        return Ok(names);
    }
    let mut names = source.list_entities().await?;
    names.sort();
    names.dedup();
    if names.is_empty() {
        return Err(Error::Protocol("service returned no entities".into()));
    }
    Ok(names)
}

/// Run every entity in `plan` and build the report
pub async fn run(source: &dyn MetricsSource, plan: &RunPlan, store: &ThresholdStore) -> Report {
    let sampler = Sampler::new(plan.duration_per_entity, plan.sample_interval, plan.use_history);
    let mut entities = Vec::with_capacity(plan.entities.len());

    for name in &plan.entities {
        let entry = run_entity(source, &sampler, plan.warmup, name, store).await;
        entities.push(entry);
    }

    let mut report = Report {
        generated_at_unix_ms: Utc::now().timestamp_millis(),
        duration_per_entity_s: sampler.duration().as_secs_f64(),
        warmup_seconds: plan.warmup.as_secs_f64(),
        sample_interval_s: sampler.interval().as_secs_f64(),
        use_history: plan.use_history,
        thresholds: store.global(),
        entity_thresholds: store.entities.clone(),
        entities,
        passed: false,
        failures: Vec::new(),
    };
    report.finalize();
    report
}

async fn run_entity(
    source: &dyn MetricsSource,
    sampler: &Sampler,
    warmup: Duration,
    name: &str,
    store: &ThresholdStore,
) -> EntityReport {
    let thresholds = store.effective(name);

    info!(entity = name, "Loading entity");
    if let Err(e) = source.load_entity(name).await {
        warn!(entity = name, error = %e, "Entity load failed");
        return EntityReport::skipped(name, thresholds, format!("load failed: {e}"));
    }

    if !warmup.is_zero() {
        sleep(warmup).await;
    }

    let window = match sampler.sample(source).await {
        Ok(window) => window,
        Err(e) => {
            warn!(entity = name, error = %e, "Sample window lost");
            return EntityReport::skipped(name, thresholds, format!("sample window lost: {e}"));
        }
    };
    if window.samples.is_empty() {
        warn!(entity = name, source = %window.source, "No samples collected in window");
    } else {
        debug!(
            entity = name,
            source = %window.source,
            samples = window.samples.len(),
            dropped = window.dropped,
            "Collected window"
        );
    }

    let scripts = source.script_counters().await.unwrap_or_else(|e| {
        debug!(entity = name, error = %e, "Script counters unavailable");
        Default::default()
    });
    let summary = RunSummary::from_samples(&window.samples, scripts);
    let evaluation = evaluate(&summary, &thresholds);
    let failures = evaluation.failures();

    if evaluation.passed() {
        info!(
            entity = name,
            fps_p50 = format_args!("{:.2}", summary.fps.p50),
            frame_p95_ms = format_args!("{:.2}", summary.frame_time_ms.p95),
            script_p95_ms = format_args!("{:.2}", summary.script_time_ms.p95),
            physics_p95_ms = format_args!("{:.2}", summary.physics_time_ms.p95),
            "PASS"
        );
    } else {
        warn!(entity = name, failures = %failures.join("; "), "FAIL");
    }

    EntityReport {
        name: name.to_string(),
        sample_source: Some(window.source),
        history_dropped: window.dropped,
        thresholds,
        passed: evaluation.passed(),
        skipped: None,
        failures,
        summary: Some(summary),
    }
}
