//! Genflow CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.genflow/config.toml` and validate it.
//! 2. **Wire observability**: configure `tracing-subscriber` with a JSON or
//!    pretty layer and an optional OpenTelemetry OTLP exporter. All `tracing`
//!    spans and structured events emitted by every crate in the workspace
//!    flow through it.
//! 3. **Construct infrastructure**: build the credential pool, the
//!    `GeminiProvider` and the optional `HttpAssetRelay`, and inject them into
//!    the orchestrator's `BatchJobPipeline`.
//! 4. **Run**: submit the task file as one batch, log progress per item, and
//!    write the final report. Ctrl-C cancels the batch; unfinished items are
//!    reported as cancelled.
//!
//! Exit status is `0` when every item succeeded, `2` when the batch completed
//! with failed items, and `1` on any setup error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod telemetry;

use commands::RunArgs;
use config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(name = "genflow", version, about = "Batch content generation over a rate-limited provider")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "GENFLOW_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate every task in a task file and write the batch report.
    Run(RunArgs),
    /// Check the configuration and credential sources.
    Validate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let all_succeeded = commands::run(&cli.config, args).await?;
            Ok(if all_succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Command::Validate => {
            commands::validate(&cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
