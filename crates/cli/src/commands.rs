//! `run` and `validate` subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use domain::{Credential, GenerationTask};
use orchestrator::{
    BatchJobPipeline, BatchReport, CapabilityNegotiator, CredentialPool, RequestExecutor,
    SubmitOptions,
};
use provider::{GeminiProvider, HttpAssetRelay};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GenflowConfig;
use crate::telemetry;

/// Arguments of `genflow run`.
#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// JSON file holding an array of generation tasks.
    #[arg(long)]
    pub tasks: PathBuf,

    /// Credential tried before the pool on every call.
    #[arg(long, env = "GENFLOW_OVERRIDE_KEY", hide_env_values = true)]
    pub override_key: Option<String>,

    /// Where to write the batch report. Defaults to stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Wired-up components for one run.
struct Runtime {
    pipeline: BatchJobPipeline,
    pool: Arc<CredentialPool>,
}

fn build(config: &GenflowConfig) -> Result<Runtime> {
    let credentials = config.credentials(|name| std::env::var(name).ok())?;
    let pool = Arc::new(CredentialPool::new(credentials)?);

    let provider = GeminiProvider::new(config.gemini()).context("Invalid provider settings")?;
    let negotiator = CapabilityNegotiator::new(
        RequestExecutor::new(Arc::clone(&pool)),
        Arc::new(provider),
        config.model()?,
    )
    .with_capabilities(config.capability_map());

    let mut pipeline = BatchJobPipeline::new(negotiator, config.batch_settings());
    if let Some(base_url) = &config.relay.base_url {
        let timeout = config
            .relay
            .timeout_secs
            .map_or(HttpAssetRelay::DEFAULT_TIMEOUT, Duration::from_secs);
        let relay = HttpAssetRelay::new(base_url, timeout).context("Invalid relay settings")?;
        pipeline = pipeline.with_relay(Arc::new(relay));
    }

    Ok(Runtime { pipeline, pool })
}

fn load_tasks(path: &Path) -> Result<Vec<GenerationTask>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse tasks file {}", path.display()))
}

fn write_report(report: &BatchReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise batch report")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

/// Runs one batch to completion. Returns `true` when every item succeeded.
pub async fn run(config_path: &Path, args: RunArgs) -> Result<bool> {
    let config = GenflowConfig::load(config_path)?;
    let _telemetry = telemetry::init(&config.telemetry)?;

    let runtime = build(&config)?;
    let tasks = load_tasks(&args.tasks)?;

    let override_credential = match args.override_key.as_deref() {
        Some(raw) => {
            let credential = Credential::new(raw);
            if credential.is_none() {
                warn!("--override-key was blank and has been ignored");
            }
            credential
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling batch");
                cancel.cancel();
            }
        }
    });

    info!(
        model = %config.provider.model,
        pool_size = runtime.pool.size(),
        credentials = ?runtime.pool.fingerprints(),
        has_override = override_credential.is_some(),
        "Starting batch"
    );

    let handle = runtime.pipeline.submit_with(
        tasks,
        SubmitOptions {
            override_credential,
            cancel,
            timeout: None,
        },
    )?;
    info!(batch_id = %handle.batch_id, items = handle.items.len(), "Placeholders created");

    let report = handle
        .wait_with_progress(|item, progress| {
            info!(
                item_id = %item.id,
                task_index = item.task_index,
                replica = item.replica,
                status = ?item.status,
                attempts = item.attempts,
                progress = %progress,
                "Item finished"
            );
        })
        .await?;

    info!(
        batch_id = %report.batch_id,
        succeeded = report.progress.succeeded,
        failed = report.progress.failed,
        "Batch finished"
    );
    write_report(&report, args.output.as_deref())?;
    Ok(report.progress.failed == 0)
}

/// Loads and checks the configuration without contacting any endpoint.
pub fn validate(config_path: &Path) -> Result<()> {
    let config = GenflowConfig::load(config_path)?;
    let credentials = config.credentials(|name| std::env::var(name).ok())?;
    let pool = CredentialPool::new(credentials)?;

    println!("Configuration OK: {}", config_path.display());
    println!("  model:        {}", config.model()?);
    println!("  provider:     {}", config.provider.base_url);
    println!(
        "  credentials:  {} ({})",
        pool.size(),
        pool.fingerprints().join(", ")
    );
    match &config.relay.base_url {
        Some(url) => println!("  relay:        enabled ({url})"),
        None => println!("  relay:        disabled"),
    }
    println!("  capabilities: {} model(s) described", config.capabilities.len());
    Ok(())
}
