//! Cascade Simulator - runs the cascade against scripted sources
//!
//! Usage:
//!   cascade_sim --scenario scenarios/dns.json
//!   cascade_sim --scenario scenarios/conflict.json --config cascade.toml --repeat 10
//!
//! Prints a JSON report (last result, metrics, health) to stdout. Logs go
//! to stderr, filtered by RUST_LOG or the config's [logging] section.

mod scenario;

use anyhow::{Context, Result};
use cascade_engine::{CascadeOrchestrator, EngineConfig, HealthReport, MetricsSnapshot};
use cascade_shared::CascadeResult;
use clap::Parser;
use scenario::Scenario;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cascading retrieval simulator
#[derive(Parser)]
#[command(name = "cascade_sim")]
#[command(about = "Run the retrieval cascade against a scripted scenario", long_about = None)]
#[command(version)]
struct Cli {
    /// Scenario file (JSON)
    #[arg(long)]
    scenario: PathBuf,

    /// Engine config file (TOML); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of runs
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    scenario: String,
    runs: u32,
    result: Option<CascadeResult>,
    metrics: MetricsSnapshot,
    health: HealthReport,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => EngineConfig::load_from_path(path)?,
        None => EngineConfig::default(),
    };
    init_tracing(&settings.logging.filter);

    let scenario = Scenario::load(&cli.scenario)?;
    let fakes = scenario.fakes();
    let orchestrator = CascadeOrchestrator::new(fakes.adapters(), &settings)
        .context("Invalid cascade configuration")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    info!("Cascade simulator v{} starting", env!("CARGO_PKG_VERSION"));

    let runs = cli.repeat.max(1);
    let mut last = None;
    for run in 1..=runs {
        let result = orchestrator
            .execute(scenario.request(), &cancel)
            .await
            .with_context(|| format!("Run {} failed", run))?;
        info!(run, stopped_at = %result.stopped_at, "Run complete");
        last = Some(result);
    }

    let report = SimulationReport {
        scenario: cli.scenario.display().to_string(),
        runs,
        result: last,
        metrics: orchestrator.metrics(),
        health: orchestrator.health_status().await,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
