//! The generational loop.
//!
//! Each phase is a full barrier: a generation is evaluated completely before selection
//! starts, and selection, crossover and mutation each finish before the next begins.
//! Where the evaluation happens is left to the `PopulationEvaluator`.

use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::fitness::FitnessFunction;
use super::individual::{sort_by_fitness, sort_by_id, Individual, Population};
use super::initialization::initialize_population;
use super::operators::{crossover, mutate, select, CrossoverStrategy, SelectionStrategy};
use super::values::{Bounds, FitnessValue, VariantError};
use super::{EvolutionError, OptimizationDirection};
use crate::distribution::Coordinator;
use crate::report::{
    milliseconds_since, Phase, Record, ReportSink, SummaryKind, SummaryRecord, TimingRecord,
};

/// Everything one run needs, fixed before the first generation.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub run_id: Uuid,
    pub seed: u64,
    pub fitness: FitnessFunction,
    pub bounds: Bounds,
    pub population_size: usize,
    pub generations: usize,
    pub chromosome_size: usize,
    pub selection: SelectionStrategy,
    pub crossover: CrossoverStrategy,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size == 0 {
            return Err(EvolutionError::BadPopulationParameter(
                "Population size cannot be zero".into(),
            ));
        } else if self.chromosome_size == 0 {
            return Err(EvolutionError::BadPopulationParameter(
                "Chromosome size cannot be zero".into(),
            ));
        } else if self.generations > 0 && self.population_size % 2 != 0 {
            // parents are paired (0, 1), (2, 3), ...
            return Err(EvolutionError::BadPopulationParameter(format!(
                "Population size must be even to pair parents, got {}",
                self.population_size
            )));
        } else if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(EvolutionError::BadPopulationParameter(format!(
                "Crossover rate must lie in [0, 1], got {}",
                self.crossover_rate
            )));
        } else if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(EvolutionError::BadPopulationParameter(format!(
                "Mutation rate must lie in [0, 1], got {}",
                self.mutation_rate
            )));
        }

        if let SelectionStrategy::Tournament { size } = self.selection {
            if size == 0 || size > self.population_size {
                return Err(EvolutionError::BadPopulationParameter(format!(
                    "Tournament size {} is invalid for a population of {}",
                    size, self.population_size
                )));
            }
        }

        if self.bounds.representation() != self.fitness.representation() {
            return Err(VariantError::TypeMismatch {
                expected: self.fitness.representation(),
                found: self.bounds.representation(),
            }
            .into());
        }
        Ok(())
    }
}

/// Turns a population without fitness values into the same individuals with them.
///
/// Implementations must return every individual they were given, in id order.
pub trait PopulationEvaluator: Send {
    fn evaluate<'a>(
        &'a mut self,
        population: Population,
    ) -> BoxFuture<'a, Result<Population, EvolutionError>>;
}

/// Evaluates in-process across the rayon pool.
#[derive(Debug, Clone)]
pub struct LocalEvaluator {
    fitness: FitnessFunction,
}

impl LocalEvaluator {
    pub fn new(fitness: FitnessFunction) -> Self {
        LocalEvaluator { fitness }
    }
}

impl PopulationEvaluator for LocalEvaluator {
    fn evaluate<'a>(
        &'a mut self,
        mut population: Population,
    ) -> BoxFuture<'a, Result<Population, EvolutionError>> {
        let fitness = self.fitness.clone();
        async move {
            // keep the runtime thread free while rayon works
            tokio::task::spawn_blocking(move || {
                population
                    .par_iter_mut()
                    .try_for_each(|individual| fitness.evaluate_in_place(individual))?;
                Ok::<_, EvolutionError>(population)
            })
            .await
            .map_err(|e| EvolutionError::Task(e.to_string()))?
        }
        .boxed()
    }
}

impl PopulationEvaluator for Coordinator {
    fn evaluate<'a>(
        &'a mut self,
        population: Population,
    ) -> BoxFuture<'a, Result<Population, EvolutionError>> {
        async move { Ok(Coordinator::evaluate(self, population).await?) }.boxed()
    }
}

/// Best, worst and average of one evaluated generation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: i64,
    pub best: Individual,
    pub best_fitness: FitnessValue,
    pub worst: Individual,
    pub worst_fitness: FitnessValue,
    pub average: f64,
}

impl GenerationSummary {
    fn of(
        population: &[Individual],
        generation: i64,
        direction: OptimizationDirection,
    ) -> Result<Self, EvolutionError> {
        let mut ranked: Vec<&Individual> = population.iter().collect();
        sort_by_fitness(&mut ranked)?;
        let (lowest, highest) = match (ranked.first(), ranked.last()) {
            (Some(lowest), Some(highest)) => (*lowest, *highest),
            _ => {
                return Err(EvolutionError::BadPopulationParameter(
                    "Cannot summarize an empty population".into(),
                ))
            }
        };
        let (best, worst) = match direction {
            OptimizationDirection::Minimize => (lowest, highest),
            OptimizationDirection::Maximize => (highest, lowest),
        };
        let fitness_of = |individual: &Individual| {
            individual
                .fitness_value
                .ok_or(VariantError::MissingFitness { id: individual.id })
        };
        let total: f64 = ranked
            .iter()
            .filter_map(|individual| individual.fitness_value)
            .map(|fitness| fitness.as_f64())
            .sum();

        Ok(GenerationSummary {
            generation,
            best_fitness: fitness_of(best)?,
            best: best.clone(),
            worst_fitness: fitness_of(worst)?,
            worst: worst.clone(),
            average: total / ranked.len() as f64,
        })
    }

    fn records(&self, run_id: Uuid, solution: bool) -> [Record; 3] {
        let (best, worst, average) = if solution {
            (
                SummaryKind::SolutionBest,
                SummaryKind::SolutionWorst,
                SummaryKind::SolutionAverage,
            )
        } else {
            (SummaryKind::Best, SummaryKind::Worst, SummaryKind::Average)
        };
        let entry = |kind, individual: Option<&Individual>, fitness| {
            Record::Summary(SummaryRecord {
                run_id,
                generation: self.generation,
                kind,
                chromosome: individual.map(|individual| individual.chromosome.clone()),
                fitness,
            })
        };
        [
            entry(best, Some(&self.best), self.best_fitness),
            entry(worst, Some(&self.worst), self.worst_fitness),
            entry(average, None, FitnessValue::Float64(self.average)),
        ]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EvolutionResult {
    pub run_id: Uuid,
    /// The last generation, evaluated and sorted by id.
    pub population: Population,
    pub generation_summaries: Vec<GenerationSummary>,
    pub solution: GenerationSummary,
    pub elapsed_ms: u64,
}

fn record_timing(
    sink: &dyn ReportSink,
    run_id: Uuid,
    generation: i64,
    phase: Phase,
    start: Instant,
) -> Result<u64, EvolutionError> {
    let elapsed_ms = milliseconds_since(start);
    sink.record(&Record::Timing(TimingRecord {
        run_id,
        generation,
        phase,
        elapsed_ms,
    }))?;
    debug!(run_id = %run_id, generation, phase = ?phase, elapsed_ms, "Phase finished");
    Ok(elapsed_ms)
}

async fn evaluate_generation<E: PopulationEvaluator + ?Sized>(
    evaluator: &mut E,
    population: Population,
) -> Result<Population, EvolutionError> {
    let expected = population.len();
    let mut evaluated = evaluator.evaluate(population).await?;
    if evaluated.len() != expected {
        return Err(EvolutionError::IncompleteEvaluation {
            expected,
            received: evaluated.len(),
        });
    }
    sort_by_id(&mut evaluated);
    Ok(evaluated)
}

/// Runs the configured number of generations, then evaluates the final offspring once
/// more as the solution. Timings and summaries go to `sink` as they are produced.
pub async fn evolve<E: PopulationEvaluator + ?Sized>(
    config: &EvolutionConfig,
    evaluator: &mut E,
    sink: &dyn ReportSink,
) -> Result<EvolutionResult, EvolutionError> {
    config.validate()?;
    let run_id = config.run_id;
    let direction = config.fitness.direction();
    let population_size = config.population_size;
    let experiment_start = Instant::now();
    let mut rng = StdRng::seed_from_u64(config.seed);

    info!(
        run_id = %run_id,
        fitness = config.fitness.name(),
        population_size,
        generations = config.generations,
        chromosome_size = config.chromosome_size,
        "Starting evolution"
    );

    let start = Instant::now();
    let mut population = initialize_population(
        &config.bounds,
        population_size,
        config.chromosome_size,
        &mut rng,
    )?;
    record_timing(sink, run_id, 0, Phase::Initialization, start)?;

    let mut generation_summaries = Vec::with_capacity(config.generations);
    for generation in 0..config.generations {
        let tag = generation as i64;
        let generation_start = Instant::now();

        let start = Instant::now();
        population = evaluate_generation(evaluator, population).await?;
        record_timing(sink, run_id, tag, Phase::FitnessEvaluation, start)?;

        let summary = GenerationSummary::of(&population, tag, direction)?;
        for record in summary.records(run_id, false).iter() {
            sink.record(record)?;
        }
        info!(
            run_id = %run_id,
            generation = tag,
            best = %summary.best_fitness,
            average = summary.average,
            "Generation evaluated"
        );

        let start = Instant::now();
        let parents = (0..population_size)
            .map(|_| select(&population, config.selection, direction, &mut rng).cloned())
            .collect::<Result<Vec<Individual>, _>>()?;
        record_timing(sink, run_id, tag, Phase::Selection, start)?;

        let start = Instant::now();
        let mut offspring = Vec::with_capacity(population_size);
        for pair in parents.chunks_exact(2) {
            let (child_1, child_2) = crossover(
                &pair[0],
                &pair[1],
                config.crossover,
                config.crossover_rate,
                &mut rng,
            )?;
            offspring.push(child_1);
            offspring.push(child_2);
        }
        record_timing(sink, run_id, tag, Phase::Crossover, start)?;

        let start = Instant::now();
        for individual in offspring.iter_mut() {
            mutate(individual, &config.bounds, config.mutation_rate, &mut rng)?;
        }
        record_timing(sink, run_id, tag, Phase::Mutation, start)?;

        let next = tag + 1;
        for (position, individual) in offspring.iter_mut().enumerate() {
            individual.id = next * population_size as i64 + position as i64;
            individual.generation = next;
            individual.fitness_value = None;
        }
        population = offspring;

        generation_summaries.push(summary);
        record_timing(sink, run_id, tag, Phase::Generation, generation_start)?;
    }

    let final_generation = config.generations as i64;
    let start = Instant::now();
    population = evaluate_generation(evaluator, population).await?;
    record_timing(
        sink,
        run_id,
        final_generation,
        Phase::SolutionFitnessEvaluation,
        start,
    )?;

    let solution = GenerationSummary::of(&population, final_generation, direction)?;
    for record in solution.records(run_id, true).iter() {
        sink.record(record)?;
    }
    let elapsed_ms = record_timing(
        sink,
        run_id,
        final_generation,
        Phase::Experiment,
        experiment_start,
    )?;
    sink.flush()?;

    info!(
        run_id = %run_id,
        best = %solution.best_fitness,
        elapsed_ms,
        "Evolution finished"
    );

    Ok(EvolutionResult {
        run_id,
        population,
        generation_summaries,
        solution,
        elapsed_ms,
    })
}
