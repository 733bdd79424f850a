use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use evoqueue::config::CONFIG_PATH_VARIABLE;
use evoqueue::evolution::fitness::FitnessRegistry;
use evoqueue::report::{CompositeSink, JsonLinesSink, TracingSink};
use evoqueue::{run_experiment, ExperimentConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // first argument wins over the environment
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_VARIABLE).ok())
        .map(PathBuf::from);
    let config = ExperimentConfig::load(path.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;

    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    info!(?config, "Settings parsed");

    let mut sink = CompositeSink::new().with(Arc::new(TracingSink));
    if let Some(report_path) = &config.report_path {
        let file_sink = JsonLinesSink::create(report_path)
            .with_context(|| format!("Failed to open report file {:?}", report_path))?;
        sink = sink.with(Arc::new(file_sink));
    }

    let outcome = run_experiment(&config, &FitnessRegistry::standard(), Arc::new(sink))
        .await
        .with_context(|| format!("{} experiment with `{}` failed", config.role, config.fitness))?;

    match &outcome.evolution {
        Some(evolution) => info!(
            run_id = %outcome.run_id,
            elapsed_ms = outcome.elapsed_ms,
            best = %evolution.solution.best,
            "Experiment finished"
        ),
        None => info!(
            run_id = %outcome.run_id,
            elapsed_ms = outcome.elapsed_ms,
            "Latency probe finished"
        ),
    }
    Ok(())
}
