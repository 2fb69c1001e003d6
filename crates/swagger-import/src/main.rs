//! swagger-import CLI.
//!
//! Imports swagger documents into API Gateway and deploys them, per target of
//! a task file.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use swagger_import::config::DEFAULT_TASK_FILE;
use swagger_import::runner::{check_task_target, describe_result};
use swagger_import::{run_targets, ConfigError, RunMode, RunSummary, TargetConfiguration, TaskConfig};
use swagger_import_telemetry::{LogFormat, TelemetryConfig};

const EXIT_PIPELINE_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "swagger-import",
    about = "Import swagger documents into AWS API Gateway and deploy them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import (or update) and deploy the selected targets.
    Run {
        /// Task file (YAML or JSON).
        #[arg(short, long, env = "SWAGGER_IMPORT_CONFIG", default_value = DEFAULT_TASK_FILE)]
        config: PathBuf,

        /// Target to run. Repeatable; all targets when omitted.
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Run the targets concurrently.
        #[arg(long)]
        parallel: bool,

        /// Log level.
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Log output format (json or pretty).
        #[arg(long, default_value = "json")]
        log_format: LogFormat,
    },

    /// Validate the task file and descriptions without contacting AWS.
    Check {
        /// Task file (YAML or JSON).
        #[arg(short, long, env = "SWAGGER_IMPORT_CONFIG", default_value = DEFAULT_TASK_FILE)]
        config: PathBuf,

        /// Target to check. Repeatable; all targets when omitted.
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },
}

async fn load_targets(
    config: &Path,
    selection: &[String],
) -> Result<Vec<TargetConfiguration>, ConfigError> {
    TaskConfig::load(config).await?.targets(selection)
}

async fn run_run(config: &Path, selection: &[String], parallel: bool) -> ExitCode {
    let targets = match load_targets(config, selection).await {
        Ok(targets) => targets,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mode = if parallel {
        RunMode::Concurrent
    } else {
        RunMode::Sequential
    };
    let results = run_targets(targets, mode).await;

    for result in &results {
        let mark = if result.is_ok() { "✓" } else { "✗" };
        eprintln!("{} {}", mark, describe_result(result));
    }

    let summary = RunSummary::from_results(&results);
    eprintln!();
    eprintln!(
        "ran {} target(s): {} succeeded ({} deployed), {} failed",
        results.len(),
        summary.succeeded,
        summary.deployed,
        summary.failed
    );

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PIPELINE_FAILED)
    }
}

async fn run_check(config: &Path, selection: &[String]) -> ExitCode {
    let task = match TaskConfig::load(config).await {
        Ok(task) => task,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let names: Vec<&str> = if selection.is_empty() {
        task.target_names()
    } else {
        selection.iter().map(String::as_str).collect()
    };

    let mut failed = 0;
    for name in &names {
        match check_task_target(&task, name).await {
            Ok(bytes) => eprintln!("✓ {}: ok ({} bytes)", name, bytes),
            Err(e) => {
                failed += 1;
                eprintln!("✗ {}: {} stage: {}", name, e.stage(), e);
            }
        }
    }

    eprintln!();
    eprintln!(
        "checked {} target(s): {} ok, {} invalid",
        names.len(),
        names.len() - failed,
        failed
    );

    if failed > 0 {
        ExitCode::from(EXIT_CONFIG_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            targets,
            parallel,
            log_level,
            log_format,
        } => {
            let telemetry = TelemetryConfig::new()
                .with_log_level(log_level)
                .with_log_format(log_format)
                .with_ansi(std::io::stderr().is_terminal());
            if let Err(e) = swagger_import_telemetry::init(&telemetry) {
                eprintln!("warning: {}", e);
            }
            run_run(&config, &targets, parallel).await
        }
        Commands::Check { config, targets } => run_check(&config, &targets).await,
    }
}
