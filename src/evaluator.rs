//! Gate a run summary against effective thresholds

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metrics::RunSummary;
use crate::thresholds::{ThresholdField, Thresholds};

/// Which side of the bound was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Observed value fell below a floor
    Below,
    /// Observed value rose above a ceiling
    Above,
}

/// One exceeded bound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Bound that failed
    pub field: String,
    /// Statistic compared, e.g. `fps.p50`
    pub statistic: String,
    /// Observed value
    pub observed: f64,
    /// Configured bound
    pub bound: f64,
    /// Side of the bound
    pub direction: Direction,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.direction {
            Direction::Below => '<',
            Direction::Above => '>',
        };
        write!(f, "{} {:.2} {op} {:.2}", self.statistic, self.observed, self.bound)
    }
}

/// Outcome of gating one summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Violations in bound order
    pub violations: Vec<Violation>,
}

impl Evaluation {
    /// `true` iff no bound was exceeded
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human-readable failure lines
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Compare `summary` against every set bound in `thresholds`.
///
/// `min_fps_p50` fails when `fps.p50 < bound`; each `max_*_p95` fails when the
/// metric's p95 is above its bound. Unset bounds are skipped.
#[must_use]
pub fn evaluate(summary: &RunSummary, thresholds: &Thresholds) -> Evaluation {
    let violations = ThresholdField::ALL
        .into_iter()
        .filter_map(|field| {
            let bound = thresholds.get(field)?;
            let metric = field.metric();
            let stats = summary.metric(metric);
            let (observed, statistic, direction, failed) = if field.is_floor() {
                (stats.p50, "p50", Direction::Below, stats.p50 < bound)
            } else {
                (stats.p95, "p95", Direction::Above, stats.p95 > bound)
            };
            failed.then(|| Violation {
                field: field.name().to_string(),
                statistic: format!("{metric}.{statistic}"),
                observed,
                bound,
                direction,
            })
        })
        .collect();

    Evaluation { violations }
}
