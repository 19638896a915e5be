//! Order statistics for metric windows
//!
//! Percentiles use linear interpolation between closest ranks:
//! `rank = q * (n - 1)`, interpolated between `floor(rank)` and `ceil(rank)`.

use crate::metrics::MetricSummary;

/// Linear-interpolated percentile of unsorted values.
///
/// `q` is clamped into `[0, 1]`. Returns `None` for an empty slice.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut ordered = values.to_vec();
    ordered.sort_by(f64::total_cmp);
    percentile_sorted(&ordered, q)
}

/// Same as [`percentile`] for values already sorted ascending.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile_sorted(ordered: &[f64], q: f64) -> Option<f64> {
    match ordered {
        [] => None,
        [only] => Some(*only),
        _ => {
            let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
            let rank = q * (ordered.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                return Some(ordered[lo]);
            }
            let (low, high) = (ordered[lo], ordered[hi]);
            let weight = rank - rank.floor();
            Some((low + (high - low) * weight).clamp(low, high))
        }
    }
}

/// Reduce one metric's values to `{min, avg, p50, p95, max}`.
///
/// An empty slice yields an all-zero summary.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(values: &[f64]) -> MetricSummary {
    let mut ordered = values.to_vec();
    ordered.sort_by(f64::total_cmp);

    let (Some(&min), Some(&max)) = (ordered.first(), ordered.last()) else {
        return MetricSummary::default();
    };

    // Mean over arrival order keeps the reduction independent of sort stability.
    let avg = (values.iter().sum::<f64>() / values.len() as f64).clamp(min, max);

    MetricSummary {
        min,
        avg,
        p50: percentile_sorted(&ordered, 0.50).unwrap_or(min),
        p95: percentile_sorted(&ordered, 0.95).unwrap_or(max),
        max,
    }
}
