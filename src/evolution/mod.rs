use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distribution::DistributionError;
use crate::report::ReportError;

pub mod engine;
pub mod fitness;
pub mod individual;
pub mod initialization;
pub mod operators;
pub mod values;

pub use engine::{
    evolve, EvolutionConfig, EvolutionResult, GenerationSummary, LocalEvaluator, PopulationEvaluator,
};
pub use individual::{sort_by_fitness, sort_by_id, Individual, Population};
pub use initialization::{initialize_population, random_chromosome};
pub use values::{Bounds, Chromosome, FitnessValue, Gene, Representation, VariantError};

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Invalid population parameters were passed: {0}")]
    BadPopulationParameter(String),
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error(transparent)]
    Operator(#[from] operators::OperatorError),
    #[error(transparent)]
    Fitness(#[from] fitness::FitnessError),
    #[error("Population evaluation failed: {0}")]
    Distribution(#[from] DistributionError),
    #[error("Evaluation task failed: {0}")]
    Task(String),
    #[error("Evaluator returned {received} individuals, expected {expected}")]
    IncompleteEvaluation { expected: usize, received: usize },
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Whether lower or higher fitness values are better for a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

impl OptimizationDirection {
    pub fn is_minimize(&self) -> bool {
        matches!(self, OptimizationDirection::Minimize)
    }
}
