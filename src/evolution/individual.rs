use super::values::{Chromosome, FitnessValue, Representation, VariantError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One candidate solution travelling through a generation.
///
/// `id` is unique within a generation's population and is the key the coordinator
/// uses to put evaluated individuals back in order. `fitness_value` is `None` until
/// the individual has been evaluated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub id: i64,
    pub generation: i64,
    pub chromosome: Chromosome,
    pub fitness_value: Option<FitnessValue>,
}

pub type Population = Vec<Individual>;

impl Individual {
    pub fn new(id: i64, generation: i64, chromosome: Chromosome) -> Self {
        Individual {
            id,
            generation,
            chromosome,
            fitness_value: None,
        }
    }

    pub fn representation(&self) -> Representation {
        self.chromosome.representation()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness_value.is_some()
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{generation: {}, id: {}, chromosome: {}, fitness: ",
            self.generation, self.id, self.chromosome
        )?;
        match &self.fitness_value {
            Some(value) => write!(f, "{}}}", value),
            None => write!(f, "unset}}"),
        }
    }
}

/// Restores the canonical population order.
pub fn sort_by_id(population: &mut [Individual]) {
    population.sort_by_key(|individual| individual.id);
}

/// Orders evaluated individuals by fitness, ascending. Fails if any individual is
/// unevaluated or the fitness variants differ; on failure the slice is left untouched.
pub fn sort_by_fitness(population: &mut [&Individual]) -> Result<(), VariantError> {
    let kind = match population.first() {
        Some(first) => match first.fitness_value {
            Some(value) => value.representation(),
            None => return Err(VariantError::MissingFitness { id: first.id }),
        },
        None => return Ok(()),
    };
    for individual in population.iter() {
        match individual.fitness_value {
            Some(value) if value.representation() == kind => {}
            Some(value) => {
                return Err(VariantError::TypeMismatch {
                    expected: kind,
                    found: value.representation(),
                })
            }
            None => return Err(VariantError::MissingFitness { id: individual.id }),
        }
    }
    // every value now shares one variant, so the comparison cannot fail
    population.sort_by(|a, b| match (&a.fitness_value, &b.fitness_value) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluated(id: i64, fitness: f64) -> Individual {
        let mut individual = Individual::new(id, 0, Chromosome::Float64(vec![fitness]));
        individual.fitness_value = Some(FitnessValue::Float64(fitness));
        individual
    }

    #[test]
    fn test_sort_by_id_restores_order() {
        let mut population = vec![evaluated(2, 0.0), evaluated(0, 0.0), evaluated(1, 0.0)];
        sort_by_id(&mut population);
        let ids: Vec<i64> = population.iter().map(|individual| individual.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_sort_by_fitness_ascending() {
        let population = vec![evaluated(0, 3.0), evaluated(1, -1.0), evaluated(2, 2.0)];
        let mut refs: Vec<&Individual> = population.iter().collect();
        sort_by_fitness(&mut refs).unwrap();
        let ids: Vec<i64> = refs.iter().map(|individual| individual.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_sort_by_fitness_rejects_unevaluated() {
        let population = vec![evaluated(0, 1.0), Individual::new(1, 0, Chromosome::Float64(vec![]))];
        let mut refs: Vec<&Individual> = population.iter().collect();
        assert_eq!(
            sort_by_fitness(&mut refs),
            Err(VariantError::MissingFitness { id: 1 })
        );
    }

    #[test]
    fn test_display_mentions_unset_fitness() {
        let individual = Individual::new(4, 1, Chromosome::Byte(vec![1, 0]));
        assert_eq!(
            individual.to_string(),
            "{generation: 1, id: 4, chromosome: [1, 0], fitness: unset}"
        );
    }
}
