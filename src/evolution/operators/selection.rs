use itertools::{Itertools, MinMaxResult};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{OperatorError, SelectionStrategy};
use crate::evolution::individual::Individual;
use crate::evolution::values::{FitnessValue, VariantError};
use crate::evolution::OptimizationDirection;

fn fitness_of(individual: &Individual) -> Result<FitnessValue, VariantError> {
    individual
        .fitness_value
        .ok_or(VariantError::MissingFitness { id: individual.id })
}

/// Dispatches to the configured selection strategy.
pub fn select<'a, R: Rng + ?Sized>(
    population: &'a [Individual],
    strategy: SelectionStrategy,
    direction: OptimizationDirection,
    rng: &mut R,
) -> Result<&'a Individual, OperatorError> {
    match strategy {
        SelectionStrategy::Tournament { size } => {
            tournament_selection(population, size, direction, rng)
        }
        SelectionStrategy::RouletteWheel => roulette_wheel_selection(population, direction, rng),
    }
}

/// Picks the best of `size` individuals drawn without replacement.
///
/// The contestants are the first `size` entries of a uniform permutation of the
/// population. Ties go to whichever contestant came first in that permutation.
pub fn tournament_selection<'a, R: Rng + ?Sized>(
    population: &'a [Individual],
    size: usize,
    direction: OptimizationDirection,
    rng: &mut R,
) -> Result<&'a Individual, OperatorError> {
    if population.is_empty() {
        return Err(OperatorError::EmptyPopulation);
    }
    if size == 0 || size > population.len() {
        return Err(OperatorError::InvalidTournamentSize {
            size,
            population: population.len(),
        });
    }

    let mut indices: Vec<usize> = (0..population.len()).collect();
    indices.shuffle(rng);

    let mut winner = &population[indices[0]];
    let mut best = fitness_of(winner)?;
    for &index in indices.iter().take(size).skip(1) {
        let contestant = &population[index];
        let fitness = fitness_of(contestant)?;
        let better = match direction {
            OptimizationDirection::Minimize => fitness.less(&best)?,
            OptimizationDirection::Maximize => best.less(&fitness)?,
        };
        if better {
            winner = contestant;
            best = fitness;
        }
    }
    Ok(winner)
}

/// Fitness-proportional selection over min/max normalized weights.
///
/// When minimizing the weight is `1 - normalized`. If every individual has the same
/// fitness no weight is positive and the last individual is returned.
pub fn roulette_wheel_selection<'a, R: Rng + ?Sized>(
    population: &'a [Individual],
    direction: OptimizationDirection,
    rng: &mut R,
) -> Result<&'a Individual, OperatorError> {
    let first = population.first().ok_or(OperatorError::EmptyPopulation)?;
    let kind = fitness_of(first)?.representation();

    let mut scores = Vec::with_capacity(population.len());
    for individual in population {
        let fitness = fitness_of(individual)?;
        if fitness.representation() != kind {
            return Err(VariantError::TypeMismatch {
                expected: kind,
                found: fitness.representation(),
            }
            .into());
        }
        scores.push(fitness.as_f64());
    }

    let (min, max) = match scores.iter().copied().minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => return Err(OperatorError::EmptyPopulation),
        MinMaxResult::OneElement(value) => (value, value),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let spread = max - min;

    let weights: Vec<f64> = scores
        .iter()
        .map(|&score| {
            let normalized = if spread == 0.0 {
                0.0
            } else {
                (score - min) / spread
            };
            match direction {
                OptimizationDirection::Minimize => 1.0 - normalized,
                OptimizationDirection::Maximize => normalized,
            }
        })
        .collect();

    let total: f64 = weights.iter().sum();
    let draw = rng.gen::<f64>() * total;

    let mut cumulative = 0.0;
    for (individual, weight) in population.iter().zip(weights.iter()) {
        cumulative += weight;
        if cumulative > draw {
            return Ok(individual);
        }
    }
    // floating point overshoot or an all-zero wheel
    Ok(&population[population.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::values::Chromosome;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn population_with(fitness: &[f64]) -> Vec<Individual> {
        fitness
            .iter()
            .enumerate()
            .map(|(id, &value)| {
                let mut individual = Individual::new(id as i64, 0, Chromosome::Float64(vec![value]));
                individual.fitness_value = Some(FitnessValue::Float64(value));
                individual
            })
            .collect()
    }

    #[test]
    fn test_tournament_rejects_bad_sizes() {
        let mut rng = StdRng::seed_from_u64(1);
        let population = population_with(&[1.0, 2.0]);
        assert_eq!(
            tournament_selection(&population, 3, OptimizationDirection::Minimize, &mut rng),
            Err(OperatorError::InvalidTournamentSize {
                size: 3,
                population: 2
            })
        );
        assert!(tournament_selection(&population, 0, OptimizationDirection::Minimize, &mut rng).is_err());
        assert_eq!(
            tournament_selection(&[], 1, OptimizationDirection::Minimize, &mut rng),
            Err(OperatorError::EmptyPopulation)
        );
    }

    #[test]
    fn test_full_tournament_returns_extreme() {
        let mut rng = StdRng::seed_from_u64(5);
        let population = population_with(&[4.0, -2.0, 9.5, 0.0, 3.3]);
        for _ in 0..20 {
            let winner =
                tournament_selection(&population, 5, OptimizationDirection::Minimize, &mut rng).unwrap();
            assert_eq!(winner.id, 1, "Full tournament must return the minimum");
            let winner =
                tournament_selection(&population, 5, OptimizationDirection::Maximize, &mut rng).unwrap();
            assert_eq!(winner.id, 2, "Full tournament must return the maximum");
        }
    }

    #[test]
    fn test_tournament_winner_beats_every_other_contestant() {
        let population = population_with(&[8.0, 1.0, 6.0, 3.0, 7.0, 2.0, 5.0, 4.0]);
        for seed in 0..50 {
            // replay the permutation the selection will draw
            let mut replay = StdRng::seed_from_u64(seed);
            let mut indices: Vec<usize> = (0..population.len()).collect();
            indices.shuffle(&mut replay);
            let contestants: Vec<f64> = indices[..3]
                .iter()
                .map(|&index| population[index].fitness_value.unwrap().as_f64())
                .collect();

            let mut rng = StdRng::seed_from_u64(seed);
            let winner =
                tournament_selection(&population, 3, OptimizationDirection::Minimize, &mut rng).unwrap();
            let winner_fitness = winner.fitness_value.unwrap().as_f64();
            assert!(contestants.contains(&winner_fitness));
            assert!(contestants.iter().all(|&other| winner_fitness <= other));

            let mut rng = StdRng::seed_from_u64(seed);
            let winner =
                tournament_selection(&population, 3, OptimizationDirection::Maximize, &mut rng).unwrap();
            let winner_fitness = winner.fitness_value.unwrap().as_f64();
            assert!(contestants.iter().all(|&other| winner_fitness >= other));
        }
    }

    #[test]
    fn test_tournament_requires_evaluated_population() {
        let mut rng = StdRng::seed_from_u64(2);
        let population = vec![Individual::new(0, 0, Chromosome::Byte(vec![1]))];
        assert_eq!(
            tournament_selection(&population, 1, OptimizationDirection::Maximize, &mut rng),
            Err(OperatorError::Variant(VariantError::MissingFitness { id: 0 }))
        );
    }

    #[test]
    fn test_roulette_favours_heavier_weights() {
        let mut rng = StdRng::seed_from_u64(17);
        let population = population_with(&[0.0, 1.0]);
        for _ in 0..100 {
            // maximizing: the weights are 0 and 1, so only the second can win
            let chosen =
                roulette_wheel_selection(&population, OptimizationDirection::Maximize, &mut rng).unwrap();
            assert_eq!(chosen.id, 1);
            let chosen =
                roulette_wheel_selection(&population, OptimizationDirection::Minimize, &mut rng).unwrap();
            assert_eq!(chosen.id, 0);
        }
    }

    #[test]
    fn test_roulette_flat_wheel_returns_last() {
        let mut rng = StdRng::seed_from_u64(3);
        let population = population_with(&[2.0, 2.0, 2.0]);
        let chosen =
            roulette_wheel_selection(&population, OptimizationDirection::Maximize, &mut rng).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn test_roulette_rejects_mixed_variants() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut population = population_with(&[1.0, 2.0]);
        population[1].fitness_value = Some(FitnessValue::Int(2));
        assert!(matches!(
            roulette_wheel_selection(&population, OptimizationDirection::Maximize, &mut rng),
            Err(OperatorError::Variant(VariantError::TypeMismatch { .. }))
        ));
    }
}
