//! Metrics service client
//!
//! The running service is reached through the [`MetricsSource`] trait so the
//! sampler and runner can be driven by the HTTP client in production and by
//! an in-memory source in tests.

mod http;

pub use self::http::HttpMetricsClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::metrics::{MetricSample, MetricValues, ScriptCounters};
use crate::{Error, Result};

/// Interval between readiness probes
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Response envelope used by every service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the request succeeded
    pub ok: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Error message on failure
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload, mapping `ok: false` to a protocol error
    pub fn into_result(self, endpoint: &str) -> Result<Option<T>> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(Error::Protocol(format!(
                "{endpoint} failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )))
        }
    }
}

/// Bounded, sequence-keyed sample history kept by the service.
///
/// The producer overwrites its oldest entries once `capacity` is reached and
/// counts them in `dropped_samples`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfHistory {
    /// Retained samples, oldest first
    pub samples: Vec<MetricSample>,
    /// Ring buffer capacity
    pub capacity: usize,
    /// Samples discarded so far because of capacity
    pub dropped_samples: u64,
}

impl PerfHistory {
    /// Highest sequence number retained, or `0` when empty
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.samples.iter().filter_map(|s| s.seq).max().unwrap_or(0)
    }
}

/// Named scenario exposed by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityInfo {
    /// Scenario name
    pub name: String,
}

/// Read and control surface of the running service
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Point-in-time read of every tracked metric
    async fn snapshot(&self) -> Result<MetricValues>;

    /// Read the bounded sample history
    async fn history(&self) -> Result<PerfHistory>;

    /// Script runtime counters
    async fn script_counters(&self) -> Result<ScriptCounters>;

    /// Scenario names the service can load
    async fn list_entities(&self) -> Result<Vec<String>>;

    /// Load (and start advancing) a scenario
    async fn load_entity(&self, name: &str) -> Result<()>;

    /// Readiness probe
    async fn probe(&self) -> Result<()>;
}

/// Poll [`MetricsSource::probe`] until it succeeds or `timeout` elapses
pub async fn wait_until_ready(source: &dyn MetricsSource, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match source.probe().await {
            Ok(()) => {
                info!("Metrics service is reachable");
                return Ok(());
            }
            Err(e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::Transport(format!(
                        "service not reachable after {}s: {e}",
                        timeout.as_secs_f64()
                    )));
                }
                debug!(error = %e, "Service not ready yet");
                sleep(PROBE_INTERVAL.min(deadline - now)).await;
            }
        }
    }
}
