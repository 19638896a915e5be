//! perf-gate - performance regression gate
//!
//! Exit status: 0 when the gate passed, 1 when it failed, 2 on fatal errors.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use perf_gate::{
    calibrate::Calibrator,
    cli::{CalibrateArgs, CalibrationArgs, Cli, Command, OutputFormat, RunArgs, SuggestArgs},
    client::{HttpMetricsClient, wait_until_ready},
    config::Config,
    failsafe::RetryPolicy,
    record::{CalibrationRecord, write_json_atomic},
    report::Report,
    runner::{self, RunPlan},
    setup_tracing,
    suggest::SuggestionDocument,
};

/// Gate failed
const EXIT_GATE_FAILED: u8 = 1;
/// Configuration, record, or startup failure
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::from(EXIT_FATAL);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let outcome = match cli.command {
        Command::Run(args) => run_gate(*args, config).await,
        Command::Suggest(args) => run_suggest(&args).map(|()| true),
        Command::Calibrate(args) => run_calibrate(&args, &config).map(|()| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_GATE_FAILED),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Run the gate; `Ok(false)` means the report failed
async fn run_gate(args: RunArgs, mut config: Config) -> anyhow::Result<bool> {
    if let Some(base_url) = &args.base_url {
        config.service.base_url.clone_from(base_url);
    }
    if let Some(timeout) = args.startup_timeout {
        config.service.startup_timeout = std::time::Duration::try_from_secs_f64(timeout.max(0.0))
            .context("invalid --startup-timeout")?;
    }
    let sampling = args.sampling(&config.sampling);

    let store = match &args.thresholds_file {
        Some(path) => CalibrationRecord::load(path)?.store(),
        None => CalibrationRecord::default().store(),
    }
    .with_adhoc(args.thresholds.adhoc());
    // A malformed record aborts before any sampling
    let current_record = args
        .apply_thresholds
        .as_deref()
        .map(|target| calibration_base(target, args.thresholds_file.as_deref()))
        .transpose()?;

    let client = HttpMetricsClient::new(&config.service, RetryPolicy::new(&config.retry))?;
    wait_until_ready(&client, config.service.startup_timeout)
        .await
        .with_context(|| format!("metrics service at {}", config.service.base_url))?;

    let entities = runner::resolve_entities(&client, args.entities.as_deref())
        .await
        .context("failed to resolve entities")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        entities = entities.len(),
        duration_s = sampling.duration_per_entity.as_secs_f64(),
        use_history = sampling.use_history,
        "Starting perf gate"
    );

    let plan = RunPlan::new(entities, &sampling);
    let report = runner::run(&client, &plan, &store).await;

    report
        .write(&args.output)
        .with_context(|| format!("failed to write report {}", args.output.display()))?;
    info!(path = %args.output.display(), "Wrote report");

    if args.write_thresholds.is_some() || args.apply_thresholds.is_some() {
        let document = SuggestionDocument::from_report(&report);
        if let Some(path) = &args.write_thresholds {
            write_json_atomic(path, &document)?;
            info!(path = %path.display(), "Wrote suggested thresholds");
        }
        if let (Some(path), Some(current)) = (&args.apply_thresholds, &current_record) {
            apply(&document, current, path, args.calibration, &config)?;
        }
    }

    if report.passed {
        info!(entities = report.entities.len(), "Perf gate passed");
    } else {
        for failure in &report.failures {
            warn!("{failure}");
        }
        error!(failures = report.failures.len(), "Perf gate failed");
    }
    Ok(report.passed)
}

fn run_suggest(args: &SuggestArgs) -> anyhow::Result<()> {
    let report = Report::read(&args.report)?;
    let document = SuggestionDocument::from_report(&report);

    match &args.output {
        Some(path) => {
            write_json_atomic(path, &document)?;
            info!(path = %path.display(), "Wrote suggested thresholds");
        }
        None => {
            let text = match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&document)?,
                OutputFormat::Yaml => serde_yaml::to_string(&document)?,
            };
            println!("{text}");
        }
    }
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs, config: &Config) -> anyhow::Result<()> {
    let current = calibration_base(&args.apply_thresholds, args.thresholds_file.as_deref())?;
    let document = SuggestionDocument::read(&args.suggestion)
        .with_context(|| format!("invalid suggestion {}", args.suggestion.display()))?;
    apply(&document, &current, &args.apply_thresholds, args.calibration, config)
}

/// Record to calibrate from: `target` if it exists, else `fallback`, else empty
fn calibration_base(
    target: &Path,
    fallback: Option<&Path>,
) -> perf_gate::Result<CalibrationRecord> {
    CalibrationRecord::load_first_existing(std::iter::once(target).chain(fallback))
}

/// Blend `current` towards `document` and save it to `target`
fn apply(
    document: &SuggestionDocument,
    current: &CalibrationRecord,
    target: &Path,
    overrides: CalibrationArgs,
    config: &Config,
) -> anyhow::Result<()> {
    let settings = overrides.resolve(&config.calibration);
    let calibration = Calibrator::new(settings.max_adjust_pct, settings.prune_missing)
        .calibrate(current, &document.suggestion());

    calibration.record.save(target)?;
    info!(
        path = %target.display(),
        changed = calibration.stats.changed,
        added = calibration.stats.added,
        removed = calibration.stats.removed,
        max_adjust_pct = settings.max_adjust_pct,
        "Applied calibrated thresholds"
    );
    Ok(())
}
