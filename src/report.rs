//! Reporting records emitted by a run and the sinks that receive them.
//!
//! The optimizer only produces plain data; where it ends up (logs, memory, a JSON-lines
//! file) is decided by the `ReportSink` the caller hands in.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::evolution::{Chromosome, FitnessValue};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Registered once when a run starts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExperimentRecord {
    pub run_id: Uuid,
    pub role: String,
    pub cluster_size: usize,
    pub seed: u64,
    pub fitness_function: String,
    pub population_size: usize,
    pub generations: usize,
    pub chromosome_size: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub peaks: usize,
    pub sleep_ns: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    FitnessEvaluation,
    Selection,
    Crossover,
    Mutation,
    Generation,
    SolutionFitnessEvaluation,
    Experiment,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub run_id: Uuid,
    pub generation: i64,
    pub phase: Phase,
    pub elapsed_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Best,
    Worst,
    Average,
    SolutionBest,
    SolutionWorst,
    SolutionAverage,
}

/// Best, worst or average individual of one evaluated generation. Averages carry no
/// chromosome and a `Float64` fitness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub run_id: Uuid,
    pub generation: i64,
    pub kind: SummaryKind,
    pub chromosome: Option<Chromosome>,
    pub fitness: FitnessValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LatencyKind {
    Start,
    Finish,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LatencyRecord {
    pub node_id: Uuid,
    pub run_id: Uuid,
    pub generation: i64,
    pub individual_id: i64,
    pub kind: LatencyKind,
    /// Wall-clock nanoseconds since the Unix epoch.
    pub time_ns: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Experiment(ExperimentRecord),
    Timing(TimingRecord),
    Summary(SummaryRecord),
    Latency(LatencyRecord),
}

pub fn unix_time_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

pub fn milliseconds_since(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub trait ReportSink: Send + Sync {
    fn record(&self, record: &Record) -> Result<(), ReportError>;

    fn flush(&self) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Logs every record as structured `tracing` fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, record: &Record) -> Result<(), ReportError> {
        match record {
            Record::Experiment(experiment) => info!(
                run_id = %experiment.run_id,
                role = %experiment.role,
                cluster_size = experiment.cluster_size,
                seed = experiment.seed,
                fitness_function = %experiment.fitness_function,
                population_size = experiment.population_size,
                generations = experiment.generations,
                chromosome_size = experiment.chromosome_size,
                tournament_size = experiment.tournament_size,
                crossover_rate = experiment.crossover_rate,
                mutation_rate = experiment.mutation_rate,
                peaks = experiment.peaks,
                sleep_ns = experiment.sleep_ns,
                "Experiment registered"
            ),
            Record::Timing(timing) => info!(
                run_id = %timing.run_id,
                generation = timing.generation,
                phase = ?timing.phase,
                elapsed_ms = timing.elapsed_ms,
                "Time registered"
            ),
            Record::Summary(summary) => match &summary.chromosome {
                Some(chromosome) => info!(
                    run_id = %summary.run_id,
                    generation = summary.generation,
                    kind = ?summary.kind,
                    chromosome = %chromosome,
                    fitness = %summary.fitness,
                    "Individual registered"
                ),
                None => info!(
                    run_id = %summary.run_id,
                    generation = summary.generation,
                    kind = ?summary.kind,
                    fitness = %summary.fitness,
                    "Individual registered"
                ),
            },
            Record::Latency(latency) => info!(
                node_id = %latency.node_id,
                run_id = %latency.run_id,
                generation = latency.generation,
                individual_id = latency.individual_id,
                kind = ?latency.kind,
                time_ns = latency.time_ns,
                "Latency registered"
            ),
        }
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        // a panic while pushing cannot leave the vector half-written
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    pub fn timings(&self) -> Vec<TimingRecord> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                Record::Timing(timing) => Some(timing.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<SummaryRecord> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                Record::Summary(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn latencies(&self) -> Vec<LatencyRecord> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                Record::Latency(latency) => Some(latency.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn record(&self, record: &Record) -> Result<(), ReportError> {
        self.lock().push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(JsonLinesSink {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReportSink for JsonLinesSink {
    fn record(&self, record: &Record) -> Result<(), ReportError> {
        let mut writer = self.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ReportError> {
        self.lock().flush()?;
        Ok(())
    }
}

/// Forwards every record to each inner sink in order, stopping at the first failure.
#[derive(Default, Clone)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ReportSink for CompositeSink {
    fn record(&self, record: &Record) -> Result<(), ReportError> {
        for sink in self.sinks.iter() {
            sink.record(record)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), ReportError> {
        for sink in self.sinks.iter() {
            sink.flush()?;
        }
        Ok(())
    }
}
