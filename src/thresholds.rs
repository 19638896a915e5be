//! Pass/fail bounds and their precedence layers
//!
//! Effective thresholds for an entity are resolved field by field from three
//! layers, first set value wins:
//!
//! 1. ad-hoc overrides (command line)
//! 2. per-entity overrides (thresholds file)
//! 3. global default (thresholds file)

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::metrics::Metric;

/// One gated bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdField {
    /// Minimum allowed fps p50
    MinFpsP50,
    /// Maximum allowed frame time p95
    MaxFrameMsP95,
    /// Maximum allowed script time p95
    MaxScriptMsP95,
    /// Maximum allowed physics time p95
    MaxPhysicsMsP95,
}

impl ThresholdField {
    /// All gated bounds, in evaluation order
    pub const ALL: [Self; 4] = [
        Self::MinFpsP50,
        Self::MaxFrameMsP95,
        Self::MaxScriptMsP95,
        Self::MaxPhysicsMsP95,
    ];

    /// Field name as persisted
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MinFpsP50 => "min_fps_p50",
            Self::MaxFrameMsP95 => "max_frame_ms_p95",
            Self::MaxScriptMsP95 => "max_script_ms_p95",
            Self::MaxPhysicsMsP95 => "max_physics_ms_p95",
        }
    }

    /// Metric the bound applies to
    #[must_use]
    pub fn metric(self) -> Metric {
        match self {
            Self::MinFpsP50 => Metric::Fps,
            Self::MaxFrameMsP95 => Metric::FrameTimeMs,
            Self::MaxScriptMsP95 => Metric::ScriptTimeMs,
            Self::MaxPhysicsMsP95 => Metric::PhysicsTimeMs,
        }
    }

    /// `true` for a floor (`observed < bound` fails), `false` for a ceiling
    #[must_use]
    pub fn is_floor(self) -> bool {
        matches!(self, Self::MinFpsP50)
    }
}

/// Four independently optional bounds. `None` means the metric is not gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fail if `fps.p50` falls below this
    #[serde(deserialize_with = "lenient_f64")]
    pub min_fps_p50: Option<f64>,
    /// Fail if `frame_time_ms.p95` exceeds this
    #[serde(deserialize_with = "lenient_f64")]
    pub max_frame_ms_p95: Option<f64>,
    /// Fail if `script_time_ms.p95` exceeds this
    #[serde(deserialize_with = "lenient_f64")]
    pub max_script_ms_p95: Option<f64>,
    /// Fail if `physics_time_ms.p95` exceeds this
    #[serde(deserialize_with = "lenient_f64")]
    pub max_physics_ms_p95: Option<f64>,
}

impl Thresholds {
    /// Thresholds with every bound unset
    #[must_use]
    pub const fn unset() -> Self {
        Self {
            min_fps_p50: None,
            max_frame_ms_p95: None,
            max_script_ms_p95: None,
            max_physics_ms_p95: None,
        }
    }

    /// Read one bound
    #[must_use]
    pub fn get(&self, field: ThresholdField) -> Option<f64> {
        match field {
            ThresholdField::MinFpsP50 => self.min_fps_p50,
            ThresholdField::MaxFrameMsP95 => self.max_frame_ms_p95,
            ThresholdField::MaxScriptMsP95 => self.max_script_ms_p95,
            ThresholdField::MaxPhysicsMsP95 => self.max_physics_ms_p95,
        }
    }

    /// Write one bound
    pub fn set(&mut self, field: ThresholdField, value: Option<f64>) {
        let slot = match field {
            ThresholdField::MinFpsP50 => &mut self.min_fps_p50,
            ThresholdField::MaxFrameMsP95 => &mut self.max_frame_ms_p95,
            ThresholdField::MaxScriptMsP95 => &mut self.max_script_ms_p95,
            ThresholdField::MaxPhysicsMsP95 => &mut self.max_physics_ms_p95,
        };
        *slot = value;
    }

    /// Build by computing every bound from its field
    pub fn from_fn(mut f: impl FnMut(ThresholdField) -> Option<f64>) -> Self {
        let mut out = Self::unset();
        for field in ThresholdField::ALL {
            out.set(field, f(field));
        }
        out
    }

    /// `true` when no bound is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ThresholdField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Layer `over` on top of `self`: `over`'s set fields win
    #[must_use]
    pub fn overlay(&self, over: &Self) -> Self {
        merge(self, over)
    }
}

/// Field-wise precedence merge: `over.field` if set, else `base.field`.
#[must_use]
pub fn merge(base: &Thresholds, over: &Thresholds) -> Thresholds {
    Thresholds::from_fn(|field| over.get(field).or(base.get(field)))
}

/// Resolve layers given highest precedence first: first set value wins per field.
#[must_use]
pub fn first_set<'a>(layers: impl IntoIterator<Item = &'a Thresholds>) -> Thresholds {
    let layers: Vec<&Thresholds> = layers.into_iter().collect();
    layers
        .iter()
        .rev()
        .fold(Thresholds::unset(), |acc, layer| merge(&acc, layer))
}

/// Global default, per-entity overrides, and ad-hoc overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdStore {
    /// Bounds applied to every entity
    pub default: Thresholds,
    /// Per-entity overrides (fields may be partially set)
    pub entities: BTreeMap<String, Thresholds>,
    /// Ad-hoc overrides, winning over every other layer
    pub adhoc: Thresholds,
}

impl ThresholdStore {
    /// Create a store from file layers with no ad-hoc overrides
    #[must_use]
    pub fn new(default: Thresholds, entities: BTreeMap<String, Thresholds>) -> Self {
        Self {
            default,
            entities,
            adhoc: Thresholds::unset(),
        }
    }

    /// Attach ad-hoc overrides
    #[must_use]
    pub fn with_adhoc(mut self, adhoc: Thresholds) -> Self {
        self.adhoc = adhoc;
        self
    }

    /// Per-entity override layer (unset when the entity has none)
    #[must_use]
    pub fn entity(&self, name: &str) -> Thresholds {
        self.entities.get(name).copied().unwrap_or_default()
    }

    /// Default layer with ad-hoc overrides applied
    #[must_use]
    pub fn global(&self) -> Thresholds {
        merge(&self.default, &self.adhoc)
    }

    /// Effective thresholds for an entity: ad-hoc > per-entity > default
    #[must_use]
    pub fn effective(&self, name: &str) -> Thresholds {
        first_set([&self.adhoc, &self.entity(name), &self.default])
    }
}

/// Accept a number, a numeric string, or null
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid threshold value: {s:?}")))
        }
    }
}
