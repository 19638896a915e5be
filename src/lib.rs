//! Performance regression gate
//!
//! Samples a running simulation over its HTTP API, summarizes each scenario's
//! window into p50/p95 statistics, gates them against layered thresholds,
//! and ratchets the persisted thresholds towards what was observed.
//!
//! # Features
//!
//! - **Windowed sampling**: sequence-keyed history reads with polling fallback
//! - **Layered thresholds**: ad-hoc overrides, per-entity records, global defaults
//! - **Suggestions**: safety-margined bounds derived from a run
//! - **Bounded calibration**: per-run change capped by a ratio, atomically persisted

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod failsafe;
pub mod metrics;
pub mod record;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod stats;
pub mod suggest;
pub mod thresholds;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))
}
