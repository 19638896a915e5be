//! Bounded blend of persisted thresholds towards suggested ones
//!
//! Each persisted bound moves towards its suggestion by at most
//! `max_adjust_pct` of its current value per calibration, so a single noisy
//! run can neither loosen the gate past a real regression nor tighten it into
//! permanent flakiness.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::{CalibrationRecord, RecordMeta};
use crate::suggest::{Suggestion, round2};
use crate::thresholds::Thresholds;

/// Method tag written into calibrated records
pub const CALIBRATION_METHOD: &str = "bounded_blend(current, suggested)";

/// Default maximum per-run adjustment ratio
pub const DEFAULT_MAX_ADJUST_PCT: f64 = 0.25;

/// Blend one bound.
///
/// - unset suggestion keeps `current`
/// - no usable baseline (`current` unset or `<= 0`) adopts the suggestion
/// - `max_adjust_pct == 0` adopts the suggestion
/// - otherwise the suggestion is clamped into
///   `[current * (1 - r), current * (1 + r)]`
///
/// Adopted values are rounded to two decimals.
#[must_use]
pub fn blend_value(
    current: Option<f64>,
    suggested: Option<f64>,
    max_adjust_pct: f64,
) -> Option<f64> {
    let Some(target) = suggested else {
        return current;
    };
    let Some(current) = current.filter(|c| *c > 0.0) else {
        return Some(round2(target));
    };
    if max_adjust_pct.is_nan() || max_adjust_pct <= 0.0 {
        return Some(round2(target));
    }

    let low = current * (1.0 - max_adjust_pct);
    let high = current * (1.0 + max_adjust_pct);
    Some(round2(target.max(low).min(high)))
}

/// Blend every bound of `current` towards `suggested`
#[must_use]
pub fn blend_thresholds(
    current: &Thresholds,
    suggested: &Thresholds,
    max_adjust_pct: f64,
) -> Thresholds {
    Thresholds::from_fn(|field| {
        blend_value(current.get(field), suggested.get(field), max_adjust_pct)
    })
}

/// What a calibration did to the per-entity entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStats {
    /// Entities whose bounds differ from the persisted ones
    pub changed: usize,
    /// Entities with bounds that had no persisted entry
    pub added: usize,
    /// Persisted entities dropped from the new record
    pub removed: usize,
}

/// Calibration result: the record to persist plus change counts
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Record to persist for the next run
    pub record: CalibrationRecord,
    /// Change counts
    pub stats: CalibrationStats,
}

/// Bounded-blend calibrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibrator {
    /// Maximum per-run adjustment ratio (`0` disables the bound)
    pub max_adjust_pct: f64,
    /// Drop persisted entities absent from the suggestion
    pub prune_missing: bool,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            max_adjust_pct: DEFAULT_MAX_ADJUST_PCT,
            prune_missing: false,
        }
    }
}

impl Calibrator {
    /// Create a calibrator; a negative ratio is treated as `0`
    #[must_use]
    pub fn new(max_adjust_pct: f64, prune_missing: bool) -> Self {
        Self {
            max_adjust_pct: max_adjust_pct.max(0.0),
            prune_missing,
        }
    }

    /// Blend the persisted record towards a suggestion
    #[must_use]
    pub fn calibrate(&self, current: &CalibrationRecord, suggestion: &Suggestion) -> Calibration {
        let r = self.max_adjust_pct;
        let default = blend_thresholds(&current.default, &suggestion.default, r);

        let mut names: BTreeSet<&str> = suggestion.entities.keys().map(String::as_str).collect();
        if !self.prune_missing {
            names.extend(current.entities.keys().map(String::as_str));
        }

        let mut stats = CalibrationStats::default();
        let mut entities = BTreeMap::new();
        for name in names {
            let persisted = current.entities.get(name);
            let before = persisted.copied().unwrap_or_default();
            let target = suggestion.entities.get(name).copied().unwrap_or_default();
            let after = blend_thresholds(&before, &target, r);

            if persisted.is_none() && !after.is_empty() {
                stats.added += 1;
            }
            if before != after {
                stats.changed += 1;
                debug!(entity = name, ?before, ?after, "Calibrated entity thresholds");
            }
            if !after.is_empty() {
                entities.insert(name.to_string(), after);
            }
        }
        stats.removed = current
            .entities
            .keys()
            .filter(|name| !entities.contains_key(*name))
            .count();

        info!(
            changed = stats.changed,
            added = stats.added,
            removed = stats.removed,
            max_adjust_pct = r,
            prune = self.prune_missing,
            "Calibrated thresholds"
        );

        Calibration {
            record: CalibrationRecord {
                default,
                entities,
                meta: Some(RecordMeta {
                    generated_at_unix_ms: Utc::now().timestamp_millis(),
                    method: CALIBRATION_METHOD.to_string(),
                    max_adjust_pct: (r * 10_000.0).round() / 10_000.0,
                    prune_missing: self.prune_missing,
                }),
            },
            stats,
        }
    }
}
