//! Run report
//!
//! One entry per entity plus the overall verdict. The overall run fails if
//! any entity failed its thresholds or was skipped.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::metrics::RunSummary;
use crate::record::write_json_atomic;
use crate::sampler::SampleSource;
use crate::thresholds::Thresholds;
use crate::{Error, Result};

/// Result for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    /// Entity name
    pub name: String,
    /// Strategy that produced the window (absent when skipped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_source: Option<SampleSource>,
    /// Producer-side samples overwritten during the window
    #[serde(default)]
    pub history_dropped: u64,
    /// Effective thresholds the entity was gated with
    pub thresholds: Thresholds,
    /// `true` iff evaluated without violations
    pub passed: bool,
    /// Why the entity was not evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    /// Violations, e.g. `fps.p50 58.00 < 60.00`
    #[serde(default)]
    pub failures: Vec<String>,
    /// Window summary (absent when skipped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl EntityReport {
    /// Entity that could not be sampled
    #[must_use]
    pub fn skipped(name: &str, thresholds: Thresholds, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            sample_source: None,
            history_dropped: 0,
            thresholds,
            passed: false,
            skipped: Some(reason.into()),
            failures: Vec::new(),
            summary: None,
        }
    }

    /// Failure lines prefixed with the entity name
    #[must_use]
    pub fn prefixed_failures(&self) -> Vec<String> {
        match &self.skipped {
            Some(reason) => vec![format!("{}: {reason}", self.name)],
            None => self
                .failures
                .iter()
                .map(|f| format!("{}: {f}", self.name))
                .collect(),
        }
    }
}

/// Whole-run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report creation time
    pub generated_at_unix_ms: i64,
    /// Window length per entity (s)
    pub duration_per_entity_s: f64,
    /// Warmup per entity (s)
    pub warmup_seconds: f64,
    /// Polling interval (s)
    pub sample_interval_s: f64,
    /// Whether history reads were preferred
    pub use_history: bool,
    /// Global default thresholds (ad-hoc overrides applied)
    pub thresholds: Thresholds,
    /// Per-entity overrides in effect
    #[serde(default)]
    pub entity_thresholds: BTreeMap<String, Thresholds>,
    /// Per-entity results, in run order
    pub entities: Vec<EntityReport>,
    /// Overall verdict
    pub passed: bool,
    /// Entity-prefixed failures across the run
    pub failures: Vec<String>,
}

impl Report {
    /// Recompute `passed` and `failures` from the entity entries
    pub fn finalize(&mut self) {
        self.failures = self
            .entities
            .iter()
            .flat_map(EntityReport::prefixed_failures)
            .collect();
        self.passed = self.entities.iter().all(|e| e.passed);
    }

    /// Write as pretty JSON, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Read a report written by [`Report::write`]
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid report {}: {e}", path.display())))
    }
}
