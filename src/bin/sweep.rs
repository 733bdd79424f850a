//! Runs the configured experiment sequentially, then distributed over 1, 2, 4, ...
//! workers up to the configured cluster size, and writes one timing summary per run.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use evoqueue::config::CONFIG_PATH_VARIABLE;
use evoqueue::evolution::fitness::FitnessRegistry;
use evoqueue::report::{MemorySink, Phase};
use evoqueue::{run_experiment, ExperimentConfig, Role};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT: &str = "sweep_results.json";

#[derive(Serialize, Debug)]
struct SweepEntry {
    role: Role,
    cluster_size: usize,
    elapsed_ms: u64,
    /// Sum of every fitness evaluation phase of the run.
    evaluation_ms: u64,
    best_fitness: Option<String>,
}

fn cluster_sizes(max: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut size = 1;
    while size < max {
        sizes.push(size);
        size *= 2;
    }
    sizes.push(max.max(1));
    sizes
}

fn concurrency() -> usize {
    std::env::var("EVOQUEUE_SWEEP_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse().ok())
        .filter(|value| *value > 0)
        .unwrap_or(2)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_VARIABLE).ok())
        .map(PathBuf::from);
    let output = std::env::args()
        .nth(2)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let base = ExperimentConfig::load(path.as_deref())
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;

    let mut runs = vec![ExperimentConfig {
        role: Role::Sequential,
        ..base.clone()
    }];
    runs.extend(cluster_sizes(base.cluster_size).into_iter().map(|cluster_size| {
        ExperimentConfig {
            role: Role::Distributed,
            cluster_size,
            ..base.clone()
        }
    }));
    info!(runs = runs.len(), output = %output, "Starting sweep");

    let registry = Arc::new(FitnessRegistry::standard());
    let start = Instant::now();
    let mut entries: Vec<SweepEntry> = stream::iter(runs)
        .map(|config| {
            let registry = registry.clone();
            async move {
                let sink = Arc::new(MemorySink::new());
                let outcome = run_experiment(&config, &registry, sink.clone())
                    .await
                    .with_context(|| {
                        format!("{} run with {} workers failed", config.role, config.cluster_size)
                    })?;
                let evaluation_ms = sink
                    .timings()
                    .iter()
                    .filter(|timing| {
                        matches!(
                            timing.phase,
                            Phase::FitnessEvaluation | Phase::SolutionFitnessEvaluation
                        )
                    })
                    .map(|timing| timing.elapsed_ms)
                    .sum();

                anyhow::Ok(SweepEntry {
                    role: outcome.role,
                    cluster_size: outcome.cluster_size,
                    elapsed_ms: outcome.elapsed_ms,
                    evaluation_ms,
                    best_fitness: outcome
                        .evolution
                        .as_ref()
                        .map(|evolution| evolution.solution.best_fitness.to_string()),
                })
            }
        })
        .buffer_unordered(concurrency())
        .filter_map(|result| async move {
            match result {
                Ok(entry) => {
                    info!(
                        role = %entry.role,
                        cluster_size = entry.cluster_size,
                        elapsed_ms = entry.elapsed_ms,
                        evaluation_ms = entry.evaluation_ms,
                        "Run finished"
                    );
                    Some(entry)
                }
                Err(e) => {
                    error!("Run failed: {e:#}");
                    None
                }
            }
        })
        .collect()
        .await;
    entries.sort_by_key(|entry| (entry.role == Role::Distributed, entry.cluster_size));

    // file I/O off the runtime threads
    let json = serde_json::to_string_pretty(&entries)?;
    task::spawn_blocking(move || {
        let mut file = File::create(&output)?;
        file.write_all(json.as_bytes())?;
        Ok::<_, std::io::Error>(())
    })
    .await??;

    info!(elapsed = ?start.elapsed(), runs = entries.len(), "Sweep finished");
    Ok(())
}
