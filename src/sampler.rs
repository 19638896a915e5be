//! Time-bounded sample windows against the running service
//!
//! Two strategies:
//!
//! - **History** (preferred): read the service's sample ring buffer to find
//!   the last sequence number, wait out the window, read again, and keep only
//!   entries past the cursor. Entries the producer overwrote in between are
//!   simply absent; nothing is returned twice.
//! - **Polling** (fallback): fetch an instantaneous snapshot every interval
//!   until the window closes.
//!
//! Neither strategy waits longer than the window plus one interval, not
//! counting request time.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::Result;
use crate::client::{MetricsSource, PerfHistory};
use crate::metrics::MetricSample;

/// Shortest window the sampler will wait out
pub const MIN_WINDOW: Duration = Duration::from_millis(100);
/// Shortest polling interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Strategy that produced a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Sequence-keyed history read
    History,
    /// Fixed-interval snapshot polling
    Polling,
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::History => f.write_str("history"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Samples collected for one window
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    /// Samples in non-decreasing time order
    pub samples: Vec<MetricSample>,
    /// Strategy used
    pub source: SampleSource,
    /// Producer-side samples overwritten during the window (history only)
    pub dropped: u64,
}

/// Read position in the producer's sample history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryCursor {
    last_seq: u64,
    dropped: u64,
}

impl HistoryCursor {
    /// Cursor positioned after everything in `history`
    #[must_use]
    pub fn at(history: &PerfHistory) -> Self {
        Self {
            last_seq: history.last_seq(),
            dropped: history.dropped_samples,
        }
    }

    /// Last sequence number consumed
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Take every sample newer than the cursor and move the cursor past them.
    ///
    /// Returns the new samples ordered by sequence number and the number of
    /// producer-side drops since the previous read.
    pub fn advance(&mut self, history: &PerfHistory) -> (Vec<MetricSample>, u64) {
        let mut fresh: Vec<MetricSample> = history
            .samples
            .iter()
            .filter(|s| s.seq.unwrap_or(0) > self.last_seq)
            .copied()
            .collect();
        fresh.sort_by_key(|s| s.seq);
        fresh.dedup_by_key(|s| s.seq);
        enforce_monotonic_time(&mut fresh);

        let dropped = history.dropped_samples.saturating_sub(self.dropped);
        self.last_seq = self.last_seq.max(history.last_seq());
        self.dropped = self.dropped.max(history.dropped_samples);
        (fresh, dropped)
    }
}

/// Clamp timestamps so they never go backwards
fn enforce_monotonic_time(samples: &mut [MetricSample]) {
    let mut latest = f64::NEG_INFINITY;
    for sample in samples {
        if sample.at_seconds < latest {
            sample.at_seconds = latest;
        }
        latest = sample.at_seconds;
    }
}

/// Collects one window of samples per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    duration: Duration,
    interval: Duration,
    use_history: bool,
}

impl Sampler {
    /// Create a sampler; duration and interval are raised to their minimums
    #[must_use]
    pub fn new(duration: Duration, interval: Duration, use_history: bool) -> Self {
        Self {
            duration: duration.max(MIN_WINDOW),
            interval: interval.max(MIN_INTERVAL),
            use_history,
        }
    }

    /// Window length
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Polling interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Collect one window with the configured strategy.
    ///
    /// When history is preferred but its opening read fails, falls back to
    /// polling. A failed closing read loses the window and is returned as an
    /// error.
    pub async fn sample(&self, source: &dyn MetricsSource) -> Result<SampleWindow> {
        if self.use_history {
            match source.history().await {
                Ok(before) => return self.finish_history_window(source, &before).await,
                Err(e) => {
                    warn!(error = %e, "Sample history unavailable, falling back to polling");
                }
            }
        }
        Ok(self.sample_polling(source).await)
    }

    async fn finish_history_window(
        &self,
        source: &dyn MetricsSource,
        before: &PerfHistory,
    ) -> Result<SampleWindow> {
        let mut cursor = HistoryCursor::at(before);
        debug!(
            start_seq = cursor.last_seq(),
            window_ms = self.duration.as_millis(),
            "Opened history window"
        );

        sleep(self.duration).await;

        let after = source.history().await?;
        let (samples, dropped) = cursor.advance(&after);
        if dropped > 0 {
            debug!(dropped, "Producer overwrote samples during the window");
        }
        Ok(SampleWindow {
            samples,
            source: SampleSource::History,
            dropped,
        })
    }

    /// Collect one window by polling snapshots. Failed polls are skipped.
    pub async fn sample_polling(&self, source: &dyn MetricsSource) -> SampleWindow {
        let start = Instant::now();
        let deadline = start + self.duration;
        let mut samples = Vec::new();

        loop {
            match source.snapshot().await {
                Ok(values) => samples.push(MetricSample {
                    seq: None,
                    at_seconds: start.elapsed().as_secs_f64(),
                    values,
                }),
                Err(e) => debug!(error = %e, "Snapshot poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        enforce_monotonic_time(&mut samples);
        SampleWindow {
            samples,
            source: SampleSource::Polling,
            dropped: 0,
        }
    }
}
