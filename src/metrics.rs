//! Metric samples and per-window summaries
//!
//! A [`MetricSample`] is one observation of every tracked metric, read from the
//! running service. A [`RunSummary`] reduces a window of samples to
//! `{min, avg, p50, p95, max}` per metric.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stats::summarize;

/// Tracked metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Frames per second (rate)
    Fps,
    /// Total frame time in milliseconds (duration)
    FrameTimeMs,
    /// Script execution time in milliseconds (duration)
    ScriptTimeMs,
    /// Physics step time in milliseconds (duration)
    PhysicsTimeMs,
    /// Render time in milliseconds (duration)
    RenderTimeMs,
    /// Live entity count (count)
    EntityCount,
    /// Collision checks per step (count)
    CollisionChecks,
    /// Occupied spatial hash cells (count)
    SpatialHashCells,
}

impl Metric {
    /// Every tracked metric, in report order
    pub const ALL: [Self; 8] = [
        Self::Fps,
        Self::FrameTimeMs,
        Self::ScriptTimeMs,
        Self::PhysicsTimeMs,
        Self::RenderTimeMs,
        Self::EntityCount,
        Self::CollisionChecks,
        Self::SpatialHashCells,
    ];

    /// Wire/report name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fps => "fps",
            Self::FrameTimeMs => "frame_time_ms",
            Self::ScriptTimeMs => "script_time_ms",
            Self::PhysicsTimeMs => "physics_time_ms",
            Self::RenderTimeMs => "render_time_ms",
            Self::EntityCount => "entity_count",
            Self::CollisionChecks => "collision_checks",
            Self::SpatialHashCells => "spatial_hash_cells",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metric values at one instant, as reported by the service.
///
/// Fields absent from a payload read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricValues {
    /// Frames per second
    pub fps: f64,
    /// Frame time (ms)
    pub frame_time_ms: f64,
    /// Script time (ms)
    pub script_time_ms: f64,
    /// Physics time (ms)
    pub physics_time_ms: f64,
    /// Render time (ms)
    pub render_time_ms: f64,
    /// Entity count
    pub entity_count: u64,
    /// Collision checks
    pub collision_checks: u64,
    /// Spatial hash cells
    pub spatial_hash_cells: u64,
}

impl MetricValues {
    /// Value of one metric as a float
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Fps => self.fps,
            Metric::FrameTimeMs => self.frame_time_ms,
            Metric::ScriptTimeMs => self.script_time_ms,
            Metric::PhysicsTimeMs => self.physics_time_ms,
            Metric::RenderTimeMs => self.render_time_ms,
            Metric::EntityCount => self.entity_count as f64,
            Metric::CollisionChecks => self.collision_checks as f64,
            Metric::SpatialHashCells => self.spatial_hash_cells as f64,
        }
    }
}

/// One observation collected by the sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Producer-assigned sequence number (history reads only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Observation time in seconds; non-decreasing within a window
    #[serde(default)]
    pub at_seconds: f64,
    /// Observed values
    #[serde(flatten)]
    pub values: MetricValues,
}

impl MetricSample {
    /// Value of one metric
    #[must_use]
    pub fn value(&self, metric: Metric) -> f64 {
        self.values.get(metric)
    }
}

/// Order statistics for one metric over one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Minimum
    pub min: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// Maximum
    pub max: f64,
}

/// Script runtime counters read alongside a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptCounters {
    /// Scripts currently loaded
    pub loaded_scripts: u64,
    /// Entries in the recent script error buffer
    pub recent_error_buffer_len: u64,
    /// Entity scripts disabled after errors
    pub disabled_entity_scripts: u64,
    /// Global scripts disabled after errors
    pub disabled_global_scripts: u64,
    /// Script events dropped
    pub dropped_events: u64,
}

/// Summary of one observation window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Samples in the window
    pub sample_count: usize,
    /// Frames per second
    pub fps: MetricSummary,
    /// Frame time (ms)
    pub frame_time_ms: MetricSummary,
    /// Physics time (ms)
    pub physics_time_ms: MetricSummary,
    /// Script time (ms)
    pub script_time_ms: MetricSummary,
    /// Render time (ms)
    pub render_time_ms: MetricSummary,
    /// Entity count
    pub entity_count: MetricSummary,
    /// Collision checks
    pub collision_checks: MetricSummary,
    /// Spatial hash cells
    pub spatial_hash_cells: MetricSummary,
    /// Script counters
    #[serde(default)]
    pub scripts: ScriptCounters,
}

impl RunSummary {
    /// Reduce a window of samples. An empty window yields all-zero summaries.
    #[must_use]
    pub fn from_samples(samples: &[MetricSample], scripts: ScriptCounters) -> Self {
        let series = |metric: Metric| -> MetricSummary {
            let values: Vec<f64> = samples.iter().map(|s| s.value(metric)).collect();
            summarize(&values)
        };

        Self {
            sample_count: samples.len(),
            fps: series(Metric::Fps),
            frame_time_ms: series(Metric::FrameTimeMs),
            physics_time_ms: series(Metric::PhysicsTimeMs),
            script_time_ms: series(Metric::ScriptTimeMs),
            render_time_ms: series(Metric::RenderTimeMs),
            entity_count: series(Metric::EntityCount),
            collision_checks: series(Metric::CollisionChecks),
            spatial_hash_cells: series(Metric::SpatialHashCells),
            scripts,
        }
    }

    /// Summary for one metric
    #[must_use]
    pub fn metric(&self, metric: Metric) -> &MetricSummary {
        match metric {
            Metric::Fps => &self.fps,
            Metric::FrameTimeMs => &self.frame_time_ms,
            Metric::ScriptTimeMs => &self.script_time_ms,
            Metric::PhysicsTimeMs => &self.physics_time_ms,
            Metric::RenderTimeMs => &self.render_time_ms,
            Metric::EntityCount => &self.entity_count,
            Metric::CollisionChecks => &self.collision_checks,
            Metric::SpatialHashCells => &self.spatial_hash_cells,
        }
    }
}
