//! Runs one configured experiment in either role.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, ExperimentConfig, Role};
use crate::distribution::{
    Coordinator, DistributionError, InMemoryBroker, LocalCluster, QueueNames, WorkerMode,
};
use crate::evolution::fitness::FitnessRegistry;
use crate::evolution::{
    evolve, initialize_population, EvolutionConfig, EvolutionError, EvolutionResult, LocalEvaluator,
};
use crate::report::{milliseconds_since, Phase, Record, ReportError, ReportSink, TimingRecord};

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Worker stopped while the experiment was running ({handled} requests handled)")]
    WorkerStopped { handled: usize },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExperimentOutcome {
    pub run_id: Uuid,
    pub role: Role,
    pub cluster_size: usize,
    pub elapsed_ms: u64,
    /// `None` for the latency probe, which never evaluates anything.
    pub evolution: Option<EvolutionResult>,
}

/// Applies the probe adjustments, registers the experiment with `sink` and runs it.
pub async fn run_experiment(
    config: &ExperimentConfig,
    registry: &FitnessRegistry,
    sink: Arc<dyn ReportSink>,
) -> Result<ExperimentOutcome, ExperimentError> {
    let config = config.effective();
    let evolution = config.evolution_config(registry)?;
    let run_id = evolution.run_id;
    sink.record(&Record::Experiment(config.experiment_record(run_id)))?;

    let start = Instant::now();
    let (cluster_size, result) = match config.role {
        Role::Sequential => {
            if config.test_latency {
                warn!("The latency probe needs workers; running one sequential generation instead");
            }
            let mut evaluator = LocalEvaluator::new(evolution.fitness.clone());
            (1, Some(evolve(&evolution, &mut evaluator, sink.as_ref()).await?))
        }
        Role::Distributed => (
            config.cluster_size,
            run_distributed(&config, &evolution, sink.clone()).await?,
        ),
    };
    sink.flush()?;

    Ok(ExperimentOutcome {
        run_id,
        role: config.role,
        cluster_size,
        elapsed_ms: milliseconds_since(start),
        evolution: result,
    })
}

async fn run_distributed(
    config: &ExperimentConfig,
    evolution: &EvolutionConfig,
    sink: Arc<dyn ReportSink>,
) -> Result<Option<EvolutionResult>, ExperimentError> {
    let queues = QueueNames::default();
    let broker = Arc::new(InMemoryBroker::for_queues(&queues));
    let node_id = Uuid::new_v4();
    let mode = if config.test_latency {
        WorkerMode::LatencyProbe {
            sink: sink.clone(),
            run_id: evolution.run_id,
            node_id,
        }
    } else {
        WorkerMode::Evaluate(evolution.fitness.clone())
    };

    let mut cluster = LocalCluster::spawn(config.cluster_size, broker.clone(), &queues, mode);
    let mut coordinator = Coordinator::new(broker.clone(), queues, config.round_options());
    info!(
        run_id = %evolution.run_id,
        node_id = %node_id,
        cluster_size = cluster.size(),
        "Coordinator ready"
    );

    let outcome = tokio::select! {
        result = drive(config, evolution, &mut coordinator, node_id, sink.as_ref()) => result,
        exit = cluster.first_exit() => match exit {
            Ok(handled) => Err(ExperimentError::WorkerStopped { handled }),
            Err(e) => Err(e.into()),
        },
    };

    broker.close();
    let handled = cluster.shutdown().await;
    let result = outcome?;
    info!(run_id = %evolution.run_id, handled = handled?, "Cluster stopped");
    Ok(result)
}

async fn drive(
    config: &ExperimentConfig,
    evolution: &EvolutionConfig,
    coordinator: &mut Coordinator,
    node_id: Uuid,
    sink: &dyn ReportSink,
) -> Result<Option<EvolutionResult>, ExperimentError> {
    if !config.test_latency {
        return Ok(Some(evolve(evolution, coordinator, sink).await?));
    }

    let run_id = evolution.run_id;
    let mut rng = StdRng::seed_from_u64(evolution.seed);
    let start = Instant::now();
    let population = initialize_population(
        &evolution.bounds,
        evolution.population_size,
        evolution.chromosome_size,
        &mut rng,
    )?;
    record_timing(sink, run_id, Phase::Initialization, start)?;

    let start = Instant::now();
    coordinator
        .probe_latency(&population, node_id, run_id, sink)
        .await?;
    record_timing(sink, run_id, Phase::FitnessEvaluation, start)?;
    record_timing(sink, run_id, Phase::Generation, start)?;
    Ok(None)
}

fn record_timing(
    sink: &dyn ReportSink,
    run_id: Uuid,
    phase: Phase,
    start: Instant,
) -> Result<(), ReportError> {
    sink.record(&Record::Timing(TimingRecord {
        run_id,
        generation: 0,
        phase,
        elapsed_ms: milliseconds_since(start),
    }))
}
