//! Command-line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{CalibrationConfig, SamplingConfig};
use crate::thresholds::Thresholds;

/// Default report location
pub const DEFAULT_REPORT_PATH: &str = "artifacts/perf_gate_report.json";

/// Performance regression gate - samples a running simulation and gates p50/p95 metrics
#[derive(Parser, Debug)]
#[command(name = "perf-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PERF_GATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PERF_GATE_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PERF_GATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample every entity, gate it, and write a report
    Run(Box<RunArgs>),

    /// Suggest thresholds from a saved report
    Suggest(SuggestArgs),

    /// Blend a saved suggestion into a persisted thresholds record
    Calibrate(CalibrateArgs),
}

/// Options for `run`
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Window length per entity in seconds [default: config, 8.0]
    #[arg(long, allow_negative_numbers = true, alias = "duration-per-example")]
    pub duration_per_entity: Option<f64>,

    /// Settle time after loading each entity in seconds [default: config, 2.0]
    #[arg(long, allow_negative_numbers = true)]
    pub warmup_seconds: Option<f64>,

    /// Polling interval in seconds [default: config, 0.25]
    #[arg(long, allow_negative_numbers = true)]
    pub sample_interval: Option<f64>,

    /// Comma-separated entity names (default: every entity the service offers)
    #[arg(long, alias = "examples")]
    pub entities: Option<String>,

    /// Report output path
    #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
    pub output: PathBuf,

    /// Also write suggested thresholds here
    #[arg(long)]
    pub write_thresholds: Option<PathBuf>,

    /// Calibrate thresholds into this record after the run
    #[arg(long)]
    pub apply_thresholds: Option<PathBuf>,

    /// Thresholds record to gate against
    #[arg(long)]
    pub thresholds_file: Option<PathBuf>,

    /// Poll snapshots instead of reading the sample history
    #[arg(long)]
    pub no_perf_history: bool,

    /// Metrics service base URL (overrides config)
    #[arg(long, env = "PERF_GATE_BASE_URL")]
    pub base_url: Option<String>,

    /// Seconds to wait for the service to become reachable [default: config, 40]
    #[arg(long, allow_negative_numbers = true)]
    pub startup_timeout: Option<f64>,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub thresholds: ThresholdArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub calibration: CalibrationArgs,
}

impl RunArgs {
    /// Sampling settings with CLI overrides applied to `base`, then clamped
    #[must_use]
    pub fn sampling(&self, base: &SamplingConfig) -> SamplingConfig {
        SamplingConfig {
            duration_per_entity: self
                .duration_per_entity
                .map_or(base.duration_per_entity, seconds),
            warmup: self.warmup_seconds.map_or(base.warmup, seconds),
            sample_interval: self.sample_interval.map_or(base.sample_interval, seconds),
            use_history: base.use_history && !self.no_perf_history,
        }
        .clamped()
    }
}

/// Ad-hoc threshold overrides; these win over every file layer
#[derive(Args, Debug, Default, Clone, Copy)]
pub struct ThresholdArgs {
    /// Fail if fps.p50 falls below this
    #[arg(long, allow_negative_numbers = true)]
    pub min_fps_p50: Option<f64>,

    /// Fail if frame_time_ms.p95 exceeds this
    #[arg(long, allow_negative_numbers = true)]
    pub max_frame_ms_p95: Option<f64>,

    /// Fail if script_time_ms.p95 exceeds this
    #[arg(long, allow_negative_numbers = true)]
    pub max_script_ms_p95: Option<f64>,

    /// Fail if physics_time_ms.p95 exceeds this
    #[arg(long, allow_negative_numbers = true)]
    pub max_physics_ms_p95: Option<f64>,
}

impl ThresholdArgs {
    /// Overrides as a threshold set
    #[must_use]
    pub fn adhoc(&self) -> Thresholds {
        Thresholds {
            min_fps_p50: self.min_fps_p50,
            max_frame_ms_p95: self.max_frame_ms_p95,
            max_script_ms_p95: self.max_script_ms_p95,
            max_physics_ms_p95: self.max_physics_ms_p95,
        }
    }
}

/// Calibration knobs shared by `run` and `calibrate`
#[derive(Args, Debug, Default, Clone, Copy)]
pub struct CalibrationArgs {
    /// Max per-run threshold change ratio (0 = unbounded) [default: config, 0.25]
    #[arg(long, allow_negative_numbers = true)]
    pub max_threshold_adjust_pct: Option<f64>,

    /// Drop persisted entities absent from the current run
    #[arg(long, alias = "prune-missing-example-thresholds")]
    pub prune_missing: bool,
}

impl CalibrationArgs {
    /// Calibration settings with CLI overrides applied to `base`
    #[must_use]
    pub fn resolve(&self, base: &CalibrationConfig) -> CalibrationConfig {
        CalibrationConfig {
            max_adjust_pct: self
                .max_threshold_adjust_pct
                .unwrap_or(base.max_adjust_pct)
                .max(0.0),
            prune_missing: base.prune_missing || self.prune_missing,
        }
    }
}

/// Output format for documents printed to stdout
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

/// Options for `suggest`
#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Report written by `run`
    #[arg(long, default_value = DEFAULT_REPORT_PATH)]
    pub report: PathBuf,

    /// Write the suggestion here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Format when printing
    #[arg(short, long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

/// Options for `calibrate`
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Suggestion document written by `suggest` or `run --write-thresholds`
    #[arg(long, required = true)]
    pub suggestion: PathBuf,

    /// Record to calibrate in place
    #[arg(long, required = true)]
    pub apply_thresholds: PathBuf,

    /// Record to start from when the target does not exist yet
    #[arg(long)]
    pub thresholds_file: Option<PathBuf>,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub calibration: CalibrationArgs,
}

/// Seconds from the command line; negatives and NaN become zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("perf-gate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_run_defaults() {
        let cli = parse(&["run"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.output, PathBuf::from(DEFAULT_REPORT_PATH));
        assert!(args.thresholds.adhoc().is_empty());
        let sampling = args.sampling(&SamplingConfig::default());
        assert_eq!(sampling.duration_per_entity, Duration::from_secs(8));
        assert!(sampling.use_history);
    }

    #[test]
    fn test_run_overrides_and_clamps() {
        let cli = parse(&[
            "run",
            "--duration-per-example",
            "0.1",
            "--warmup-seconds",
            "-3",
            "--sample-interval",
            "0.01",
            "--no-perf-history",
            "--min-fps-p50",
            "55",
            "--examples",
            "arena,rts",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let sampling = args.sampling(&SamplingConfig::default());
        assert_eq!(sampling.duration_per_entity, SamplingConfig::MIN_DURATION);
        assert_eq!(sampling.warmup, Duration::ZERO);
        assert_eq!(sampling.sample_interval, SamplingConfig::MIN_INTERVAL);
        assert!(!sampling.use_history);
        assert_eq!(args.thresholds.adhoc().min_fps_p50, Some(55.0));
        assert_eq!(args.entities.as_deref(), Some("arena,rts"));
    }

    #[test]
    fn test_calibration_args_resolve() {
        let args = CalibrationArgs {
            max_threshold_adjust_pct: Some(-1.0),
            prune_missing: true,
        };
        let resolved = args.resolve(&CalibrationConfig::default());
        assert!(resolved.max_adjust_pct.abs() < f64::EPSILON);
        assert!(resolved.prune_missing);

        let inherited = CalibrationArgs::default().resolve(&CalibrationConfig::default());
        assert!((inherited.max_adjust_pct - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_numbers_are_values() {
        let cli = parse(&[
            "calibrate",
            "--suggestion",
            "s.json",
            "--apply-thresholds",
            "t.json",
            "--max-threshold-adjust-pct",
            "-0.5",
        ]);
        let Command::Calibrate(args) = cli.command else {
            panic!("expected calibrate");
        };
        assert_eq!(args.calibration.max_threshold_adjust_pct, Some(-0.5));
        let resolved = args.calibration.resolve(&CalibrationConfig::default());
        assert!(resolved.max_adjust_pct.abs() < f64::EPSILON);

        let cli = parse(&[
            "run",
            "--duration-per-entity",
            "-1",
            "--sample-interval",
            "-0.2",
            "--startup-timeout",
            "-5",
            "--max-frame-ms-p95",
            "-4",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.startup_timeout, Some(-5.0));
        assert_eq!(args.thresholds.adhoc().max_frame_ms_p95, Some(-4.0));
        let sampling = args.sampling(&SamplingConfig::default());
        assert_eq!(sampling.duration_per_entity, SamplingConfig::MIN_DURATION);
        assert_eq!(sampling.sample_interval, SamplingConfig::MIN_INTERVAL);
    }

    #[test]
    fn test_calibrate_requires_paths() {
        let bare = Cli::try_parse_from(["perf-gate", "calibrate"]);
        assert!(bare.is_err());
        let cli = parse(&[
            "calibrate",
            "--suggestion",
            "s.json",
            "--apply-thresholds",
            "t.json",
        ]);
        assert!(matches!(cli.command, Command::Calibrate(_)));
    }
}
