mod config;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::ASCII_FULL, Table};
use config::{RefreshConfig, OUTPUT_DIR_ENV};
use refresh_core::refresh::{EXIT_FATAL, EXIT_SUCCESS, EXIT_VALIDATION_FAILED};
use refresh_core::{
    refresh, validate_dir, ArtifactSummary, CapabilityKind, Dataset, Exporter, RefreshOptions,
    RefreshOutcome, RefreshReport, ValidationResult,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(author, version, about = "Crime dashboard data refresh pipeline")]
struct RefreshCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export every artifact, validate it and check that a second run reproduces it
    Run {
        /// Incident dataset (JSON with `columns` and `rows`)
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Directory the artifacts are written to
        #[arg(long = "output-dir", env = OUTPUT_DIR_ENV)]
        output_dir: Option<PathBuf>,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip the shadow export and reproducibility comparison
        #[arg(long)]
        skip_reproducibility: bool,
        /// Turn off an optional capability. Repeat for multiple capabilities.
        #[arg(long = "disable", value_enum, action = ArgAction::Append)]
        disable: Vec<CapabilityArg>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
    /// Validate artifacts already present in an output directory
    Validate {
        /// Directory holding the artifacts
        #[arg(long = "output-dir", env = OUTPUT_DIR_ENV)]
        output_dir: Option<PathBuf>,
        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output JSON instead of a human-readable summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CapabilityArg {
    Spatial,
    Forecasting,
    Importance,
}

impl From<CapabilityArg> for CapabilityKind {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::Spatial => CapabilityKind::Spatial,
            CapabilityArg::Forecasting => CapabilityKind::Forecasting,
            CapabilityArg::Importance => CapabilityKind::Importance,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match RefreshCli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Usage errors share the fatal code so they never read as a reproducibility failure.
            return if err.use_stderr() {
                ExitCode::from(EXIT_FATAL)
            } else {
                ExitCode::from(EXIT_SUCCESS)
            };
        }
    };

    match execute(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn execute(command: Command) -> anyhow::Result<u8> {
    match command {
        Command::Run {
            dataset,
            output_dir,
            config,
            skip_reproducibility,
            disable,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let dataset_path = config.resolve_dataset(dataset)?;
            let dataset = Dataset::load(&dataset_path)
                .with_context(|| format!("failed to load dataset {}", dataset_path.display()))?;
            info!(rows = dataset.len(), path = %dataset_path.display(), "dataset loaded");

            let disabled: Vec<CapabilityKind> = disable.into_iter().map(Into::into).collect();
            let exporter = Exporter::new(config.capabilities(&disabled), config.settings());
            let options = RefreshOptions {
                skip_reproducibility,
                ..RefreshOptions::new(config.resolve_output_root(output_dir))
            };

            let outcome = refresh(&exporter, &dataset, &options);
            output_run(&outcome, json)?;
            Ok(outcome.exit_code())
        }
        Command::Validate {
            output_dir,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let output_root = config.resolve_output_root(output_dir);
            let results = validate_dir(&output_root);
            output_validation(&output_root, &results, json)
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RefreshConfig> {
    match path {
        Some(path) => RefreshConfig::load(path),
        None => Ok(RefreshConfig::default()),
    }
}

fn output_run(outcome: &RefreshOutcome, json: bool) -> anyhow::Result<()> {
    let report = outcome.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(outcome, &report);
    println!("{}", report.summary);
    Ok(())
}

fn print_report(outcome: &RefreshOutcome, report: &RefreshReport) {
    for warning in &report.warnings {
        println!("[warn] {warning}");
    }

    match outcome {
        RefreshOutcome::Succeeded { .. } => {
            if !report.artifacts.is_empty() {
                println!("{}", render_artifacts(&report.artifacts));
            }
        }
        RefreshOutcome::ValidationFailed { validation, .. } => {
            for result in validation.iter().filter(|result| !result.ok) {
                println!("{result}");
            }
        }
        RefreshOutcome::ReproducibilityFailed { report, .. } => {
            for difference in &report.differing {
                println!(
                    "[drift] {} {}: {}",
                    difference.kind, difference.path, difference.reason
                );
            }
        }
        RefreshOutcome::ExportFailed { stage, error } => {
            eprintln!("error: {stage} stage: {error}");
        }
    }
}

fn render_artifacts(artifacts: &[ArtifactSummary]) -> String {
    let mut display = Table::new();
    display.load_preset(ASCII_FULL);
    display.set_header(vec!["artifact", "path"]);
    for artifact in artifacts {
        display.add_row(vec![artifact.kind.to_string(), artifact.path.clone()]);
    }
    display.to_string()
}

fn output_validation(
    output_root: &Path,
    results: &[ValidationResult],
    json: bool,
) -> anyhow::Result<u8> {
    let failed = results.iter().filter(|result| !result.ok).count();
    let code = if failed == 0 {
        EXIT_SUCCESS
    } else {
        EXIT_VALIDATION_FAILED
    };

    if json {
        let payload = json!({
            "output_root": output_root.display().to_string(),
            "ok": failed == 0,
            "exit_code": code,
            "validation": results,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for result in results.iter().filter(|result| !result.ok) {
            println!("{result}");
        }
        if failed == 0 {
            println!(
                "validation passed: {} artifacts in {}",
                results.len(),
                output_root.display()
            );
        } else {
            println!(
                "validation failed: {failed} of {} artifacts in {}",
                results.len(),
                output_root.display()
            );
        }
    }
    Ok(code)
}
