//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PERF_GATE_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Metrics service connection
    pub service: ServiceConfig,
    /// Retry policy for idempotent reads
    pub retry: RetryConfig,
    /// Sampling window settings
    pub sampling: SamplingConfig,
    /// Threshold calibration settings
    pub calibration: CalibrationConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // PERF_GATE_SAMPLING__WARMUP=1s -> sampling.warmup
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in service settings
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.service.base_url = Self::expand_string(&re, &self.service.base_url);
        if let Some(token) = self.service.api_token.as_mut() {
            *token = Self::expand_string(&re, token);
        }
        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Reject values the gate cannot run with
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.service.base_url).map_err(|e| {
            Error::Config(format!("service.base_url {:?}: {e}", self.service.base_url))
        })?;
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(Error::Config("retry.multiplier must be >= 1.0".into()));
        }
        if !self.calibration.max_adjust_pct.is_finite() {
            return Err(Error::Config("calibration.max_adjust_pct must be finite".into()));
        }
        Ok(())
    }
}

/// Metrics service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the running service
    pub base_url: String,
    /// Bearer token. Supports: literal value or `env:VAR_NAME`
    pub api_token: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long to wait for the service to answer the readiness probe
    #[serde(with = "humantime_serde")]
    pub startup_timeout: Duration,
    /// Path polled for readiness
    pub probe_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(120),
            startup_timeout: Duration::from_secs(40),
            probe_path: "/state".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the bearer token (expand `env:` references, drop blanks)
    #[must_use]
    pub fn resolve_api_token(&self) -> Option<String> {
        let token = self.api_token.as_ref()?;
        let resolved = match token.strip_prefix("env:") {
            Some(var_name) => env::var(var_name).ok()?,
            None => token.clone(),
        };
        let trimmed = resolved.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(150),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Sampling window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Window length per entity
    #[serde(with = "humantime_serde")]
    pub duration_per_entity: Duration,
    /// Settle time after loading an entity
    #[serde(with = "humantime_serde")]
    pub warmup: Duration,
    /// Polling interval
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Prefer sequence-keyed history reads over polling
    pub use_history: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            duration_per_entity: Duration::from_secs(8),
            warmup: Duration::from_secs(2),
            sample_interval: Duration::from_millis(250),
            use_history: true,
        }
    }
}

impl SamplingConfig {
    /// Shortest accepted window per entity
    pub const MIN_DURATION: Duration = Duration::from_millis(500);
    /// Shortest accepted polling interval
    pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

    /// Apply the accepted minimums
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.duration_per_entity = self.duration_per_entity.max(Self::MIN_DURATION);
        self.sample_interval = self.sample_interval.max(Self::MIN_INTERVAL);
        self
    }
}

/// Threshold calibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Maximum per-run change ratio (0 = unbounded)
    pub max_adjust_pct: f64,
    /// Drop entity entries absent from the current run
    pub prune_missing: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_adjust_pct: crate::calibrate::DEFAULT_MAX_ADJUST_PCT,
            prune_missing: false,
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 && duration.as_secs() > 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a duration: `"30s"`, `"5m"`, `"250ms"`, `"1.5s"`, or a bare
    /// number of seconds.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Text(String),
        }

        let seconds = match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => secs,
            Raw::Text(s) => parse_seconds(s.trim()).map_err(serde::de::Error::custom)?,
        };
        Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
    }

    fn parse_seconds(s: &str) -> Result<f64, String> {
        let (number, scale) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 0.001)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1.0)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60.0)
        } else {
            (s, 1.0)
        };
        number
            .trim()
            .parse::<f64>()
            .map(|n| n * scale)
            .map_err(|e| format!("invalid duration {s:?}: {e}"))
    }
}
