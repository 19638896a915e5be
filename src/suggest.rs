//! Candidate thresholds derived from one run's observations
//!
//! Rate bounds sit below what was observed and duration bounds above it. The
//! default scope uses wider margins than the per-entity scope and is
//! aggregated towards the worst entity: the lowest fps floor and the highest
//! duration ceilings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::metrics::RunSummary;
use crate::report::Report;
use crate::thresholds::{ThresholdField, Thresholds};

/// Method tag written into suggestion documents
pub const SUGGESTION_METHOD: &str = "auto-calibrated from observed p50/p95 with safety margin";

/// Lowest fps floor ever suggested
pub const MIN_FPS_FLOOR: f64 = 1.0;
/// Lowest duration ceiling ever suggested (ms)
pub const MIN_DURATION_CEILING: f64 = 0.1;

/// Safety margins for one scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    /// Multiplier applied to observed fps p50
    pub rate: f64,
    /// Multiplier applied to observed duration p95
    pub duration: f64,
}

impl Margins {
    /// Cross-entity default scope
    pub const DEFAULT_SCOPE: Self = Self {
        rate: 0.85,
        duration: 1.20,
    };

    /// Single-entity scope
    pub const ENTITY_SCOPE: Self = Self {
        rate: 0.90,
        duration: 1.10,
    };
}

/// Default-scope bounds used when no entity contributed a value
pub const FALLBACK_DEFAULT: Thresholds = Thresholds {
    min_fps_p50: Some(1.0),
    max_frame_ms_p95: Some(33.0),
    max_script_ms_p95: Some(25.0),
    max_physics_ms_p95: Some(25.0),
};

/// Round to two decimals
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn observed(summary: &RunSummary, field: ThresholdField) -> f64 {
    let stats = summary.metric(field.metric());
    if field.is_floor() { stats.p50 } else { stats.p95 }
}

/// Bound suggested for one field of one entity, or `None` when the field
/// does not contribute (non-positive fps).
fn local_bound(summary: &RunSummary, field: ThresholdField, margins: Margins) -> Option<f64> {
    let value = observed(summary, field);
    if field.is_floor() {
        (value > 0.0).then(|| round2((value * margins.rate).max(MIN_FPS_FLOOR)))
    } else {
        Some(round2((value * margins.duration).max(MIN_DURATION_CEILING)))
    }
}

/// Per-entity candidate thresholds for one summary.
///
/// Every field is set: an entity without a positive fps p50 gets the
/// [`MIN_FPS_FLOOR`].
#[must_use]
pub fn suggest_entity(summary: &RunSummary) -> Thresholds {
    Thresholds::from_fn(|field| {
        local_bound(summary, field, Margins::ENTITY_SCOPE).or(Some(MIN_FPS_FLOOR))
    })
}

/// Candidate thresholds for the default scope and each entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggestion {
    /// Default-scope bounds, safe for the worst observed entity
    pub default: Thresholds,
    /// Per-entity bounds
    pub entities: BTreeMap<String, Thresholds>,
}

/// Derive candidate thresholds from named summaries.
///
/// Entities with an empty name contribute to the default scope only.
#[must_use]
pub fn suggest<'a>(
    observations: impl IntoIterator<Item = (&'a str, &'a RunSummary)>,
) -> Suggestion {
    let mut default = Thresholds::unset();
    let mut entities = BTreeMap::new();

    for (name, summary) in observations {
        for field in ThresholdField::ALL {
            let Some(local) = local_bound(summary, field, Margins::DEFAULT_SCOPE) else {
                continue;
            };
            let aggregated = match default.get(field) {
                None => local,
                Some(current) if field.is_floor() => current.min(local),
                Some(current) => current.max(local),
            };
            default.set(field, Some(aggregated));
        }

        let name = name.trim();
        if !name.is_empty() {
            entities.insert(name.to_string(), suggest_entity(summary));
        }
    }

    Suggestion {
        default: FALLBACK_DEFAULT.overlay(&default),
        entities,
    }
}

/// Human-readable description of the margins in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyMarginNote {
    /// Rate margin description
    pub min_fps_p50: String,
    /// Duration margin description
    #[serde(rename = "max_*_p95")]
    pub max_p95: String,
}

impl Default for SafetyMarginNote {
    fn default() -> Self {
        Self {
            min_fps_p50: "85% of observed p50 for defaults, 90% per entity".to_string(),
            max_p95: "120% of observed p95 for defaults, 110% per entity".to_string(),
        }
    }
}

/// Provenance of a suggestion document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionMeta {
    /// `generated_at_unix_ms` of the report the suggestion came from
    pub source_report_generated_at_unix_ms: Option<i64>,
    /// Method tag
    pub method: String,
    /// Margin description
    pub safety_margin: SafetyMarginNote,
}

/// Suggestion as written to disk with `--write-thresholds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionDocument {
    /// Default-scope bounds
    pub default: Thresholds,
    /// Per-entity bounds
    #[serde(alias = "examples")]
    pub entities: BTreeMap<String, Thresholds>,
    /// Provenance
    pub meta: SuggestionMeta,
}

impl SuggestionDocument {
    /// Suggest from every evaluated entity of a report
    #[must_use]
    pub fn from_report(report: &Report) -> Self {
        let observations = report
            .entities
            .iter()
            .filter_map(|e| e.summary.as_ref().map(|s| (e.name.as_str(), s)));
        let Suggestion { default, entities } = suggest(observations);

        Self {
            default,
            entities,
            meta: SuggestionMeta {
                source_report_generated_at_unix_ms: Some(report.generated_at_unix_ms),
                method: SUGGESTION_METHOD.to_string(),
                safety_margin: SafetyMarginNote::default(),
            },
        }
    }

    /// Read a document written as JSON or YAML
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        // YAML parses every JSON document too
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Split into the parts the calibrator consumes
    #[must_use]
    pub fn suggestion(&self) -> Suggestion {
        Suggestion {
            default: self.default,
            entities: self.entities.clone(),
        }
    }
}
