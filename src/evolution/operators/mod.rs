use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::values::{Representation, VariantError};

mod crossover;
mod mutation;
mod selection;

pub use crossover::{blend_crossover, crossover, single_point_crossover, two_point_crossover};
pub use mutation::mutate;
pub use selection::{roulette_wheel_selection, select, tournament_selection};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error("Cannot select from an empty population")]
    EmptyPopulation,
    #[error("Tournament size {size} is invalid for a population of {population}")]
    InvalidTournamentSize { size: usize, population: usize },
    #[error("Operator `{operator}` does not support `{representation}` chromosomes")]
    UnsupportedRepresentation {
        operator: &'static str,
        representation: Representation,
    },
}

/// How parents are chosen out of an evaluated generation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    Tournament { size: usize },
    RouletteWheel,
}

/// How two parents are recombined into two children.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverStrategy {
    /// BLX-alpha, continuous representations only.
    Blend,
    SinglePoint,
    TwoPoint,
}
