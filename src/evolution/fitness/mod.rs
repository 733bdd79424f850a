use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::individual::Individual;
use super::values::{Bounds, FitnessValue, Representation, VariantError};
use super::OptimizationDirection;
use crate::consts::*;

pub mod benchmarks;
pub mod combinatorial;
pub mod probe;

pub use benchmarks::Transform;
pub use combinatorial::random_peaks;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitnessError {
    #[error("Unknown fitness function `{0}`")]
    UnknownFunction(String),
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error("Fitness function `{function}` needs the `{argument}` argument")]
    MissingArgument {
        function: &'static str,
        argument: &'static str,
    },
    #[error("Invalid fitness argument: {0}")]
    InvalidArgument(String),
}

/// Auxiliary data a fitness function is evaluated with. Built once per run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitnessArguments {
    #[default]
    None,
    Transform(Transform),
    Peaks {
        peaks: Vec<Vec<u8>>,
    },
    Nodes {
        nodes: Vec<[i32; 2]>,
    },
    JobShop {
        instance: Vec<Vec<[i32; 2]>>,
    },
    Sleep {
        duration_ns: u64,
        seed: u64,
    },
}

pub type EvaluationFn = fn(&Individual, &FitnessArguments) -> Result<FitnessValue, FitnessError>;

/// A registered function together with what a run needs to know about it.
#[derive(Clone, Copy)]
pub struct FitnessDefinition {
    pub name: &'static str,
    pub representation: Representation,
    pub direction: OptimizationDirection,
    pub default_bounds: Option<Bounds>,
    pub evaluate: EvaluationFn,
}

impl fmt::Debug for FitnessDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitnessDefinition")
            .field("name", &self.name)
            .field("representation", &self.representation)
            .field("direction", &self.direction)
            .field("default_bounds", &self.default_bounds)
            .finish_non_exhaustive()
    }
}

fn continuous(
    individual: &Individual,
    arguments: &FitnessArguments,
    benchmark: fn(&[f64]) -> f64,
) -> Result<FitnessValue, FitnessError> {
    let genes = individual.chromosome.as_float64s()?;
    let value = match arguments {
        FitnessArguments::Transform(transform) => benchmark(&transform.apply(genes)?),
        _ => benchmark(genes),
    };
    Ok(FitnessValue::Float64(value))
}

fn evaluate_sphere(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    continuous(individual, arguments, benchmarks::sphere)
}

fn evaluate_rastrigin(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    continuous(individual, arguments, benchmarks::rastrigin)
}

fn evaluate_ackley(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    continuous(individual, arguments, benchmarks::ackley)
}

fn evaluate_schwefel(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    continuous(individual, arguments, benchmarks::schwefel)
}

fn evaluate_rosenbrock(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    continuous(individual, arguments, benchmarks::rosenbrock)
}

fn evaluate_ppeaks(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    match arguments {
        FitnessArguments::Peaks { peaks } => Ok(FitnessValue::Float64(combinatorial::ppeaks(
            individual.chromosome.as_bytes()?,
            peaks,
        )?)),
        _ => Err(FitnessError::MissingArgument {
            function: "ppeaks",
            argument: "peaks",
        }),
    }
}

fn narrow(value: i64) -> Result<FitnessValue, FitnessError> {
    i32::try_from(value)
        .map(FitnessValue::Int)
        .map_err(|_| FitnessError::InvalidArgument(format!("{} overflows an int fitness", value)))
}

fn evaluate_tour(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    match arguments {
        FitnessArguments::Nodes { nodes } => {
            narrow(combinatorial::tour_length(individual.chromosome.as_ints()?, nodes)?)
        }
        _ => Err(FitnessError::MissingArgument {
            function: "tour",
            argument: "nodes",
        }),
    }
}

fn evaluate_makespan(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    match arguments {
        FitnessArguments::JobShop { instance } => {
            narrow(combinatorial::makespan(individual.chromosome.as_ints()?, instance)?)
        }
        _ => Err(FitnessError::MissingArgument {
            function: "makespan",
            argument: "instance",
        }),
    }
}

fn evaluate_sleep(individual: &Individual, arguments: &FitnessArguments) -> Result<FitnessValue, FitnessError> {
    match arguments {
        FitnessArguments::Sleep { duration_ns, seed } => Ok(FitnessValue::Float64(
            probe::sleep_probe(Duration::from_nanos(*duration_ns), *seed, individual.id),
        )),
        _ => Err(FitnessError::MissingArgument {
            function: "sleep",
            argument: "duration",
        }),
    }
}

/// Name-to-function mapping the coordinator, the workers and the local evaluator share.
#[derive(Clone, Debug, Default)]
pub struct FitnessRegistry {
    definitions: BTreeMap<&'static str, FitnessDefinition>,
}

impl FitnessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in function: the five continuous benchmarks, P-Peaks, tour length,
    /// makespan and the sleep probe.
    pub fn standard() -> Self {
        let continuous_bounds = |min: f64, max: f64| Some(Bounds::Float64 { min, max });
        let bit_bounds = Some(Bounds::Byte {
            min: BIT_MIN_BOUND,
            max: BIT_MAX_BOUND,
        });
        let minimize = OptimizationDirection::Minimize;
        let maximize = OptimizationDirection::Maximize;

        let entries: [(&'static str, Representation, OptimizationDirection, Option<Bounds>, EvaluationFn); 9] = [
            ("sphere", Representation::Float64, minimize, continuous_bounds(SPHERE_MIN_BOUND, SPHERE_MAX_BOUND), evaluate_sphere),
            ("rastrigin", Representation::Float64, minimize, continuous_bounds(RASTRIGIN_MIN_BOUND, RASTRIGIN_MAX_BOUND), evaluate_rastrigin),
            ("ackley", Representation::Float64, minimize, continuous_bounds(ACKLEY_MIN_BOUND, ACKLEY_MAX_BOUND), evaluate_ackley),
            ("schwefel", Representation::Float64, minimize, continuous_bounds(SCHWEFEL_MIN_BOUND, SCHWEFEL_MAX_BOUND), evaluate_schwefel),
            ("rosenbrock", Representation::Float64, minimize, continuous_bounds(ROSENBROCK_MIN_BOUND, ROSENBROCK_MAX_BOUND), evaluate_rosenbrock),
            ("ppeaks", Representation::Byte, maximize, bit_bounds, evaluate_ppeaks),
            ("tour", Representation::Int, minimize, None, evaluate_tour),
            ("makespan", Representation::Int, minimize, None, evaluate_makespan),
            ("sleep", Representation::Byte, maximize, bit_bounds, evaluate_sleep),
        ];

        let mut registry = Self::new();
        for (name, representation, direction, default_bounds, evaluate) in entries {
            registry.register(FitnessDefinition {
                name,
                representation,
                direction,
                default_bounds,
                evaluate,
            });
        }
        registry
    }

    /// Adds or replaces a definition under its name.
    pub fn register(&mut self, definition: FitnessDefinition) {
        self.definitions.insert(definition.name, definition);
    }

    pub fn get(&self, name: &str) -> Result<&FitnessDefinition, FitnessError> {
        self.definitions
            .get(name)
            .ok_or_else(|| FitnessError::UnknownFunction(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.definitions.keys().copied()
    }

    /// Looks `name` up and pairs it with the run's arguments.
    pub fn bind(&self, name: &str, arguments: FitnessArguments) -> Result<FitnessFunction, FitnessError> {
        Ok(FitnessFunction::new(*self.get(name)?, arguments))
    }
}

/// A registered function bound to its arguments, cheap to clone into workers.
#[derive(Clone, Debug)]
pub struct FitnessFunction {
    definition: FitnessDefinition,
    arguments: Arc<FitnessArguments>,
}

impl FitnessFunction {
    pub fn new(definition: FitnessDefinition, arguments: FitnessArguments) -> Self {
        FitnessFunction {
            definition,
            arguments: Arc::new(arguments),
        }
    }

    pub fn name(&self) -> &'static str {
        self.definition.name
    }

    pub fn direction(&self) -> OptimizationDirection {
        self.definition.direction
    }

    pub fn representation(&self) -> Representation {
        self.definition.representation
    }

    pub fn default_bounds(&self) -> Option<Bounds> {
        self.definition.default_bounds
    }

    pub fn arguments(&self) -> &FitnessArguments {
        &self.arguments
    }

    /// Evaluates without touching the individual. A chromosome of the wrong
    /// representation is rejected before the function runs.
    pub fn evaluate(&self, individual: &Individual) -> Result<FitnessValue, FitnessError> {
        if individual.representation() != self.definition.representation {
            return Err(VariantError::TypeMismatch {
                expected: self.definition.representation,
                found: individual.representation(),
            }
            .into());
        }
        (self.definition.evaluate)(individual, &self.arguments)
    }

    pub fn evaluate_in_place(&self, individual: &mut Individual) -> Result<(), FitnessError> {
        individual.fitness_value = Some(self.evaluate(individual)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::values::Chromosome;

    fn individual(chromosome: Chromosome) -> Individual {
        Individual::new(0, 0, chromosome)
    }

    #[test]
    fn test_standard_registry_lists_every_function() {
        let registry = FitnessRegistry::standard();
        let names: Vec<&str> = registry.names().collect();
        for expected in [
            "sphere",
            "rastrigin",
            "ackley",
            "schwefel",
            "rosenbrock",
            "ppeaks",
            "tour",
            "makespan",
            "sleep",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert_eq!(
            registry.get("nope").unwrap_err(),
            FitnessError::UnknownFunction("nope".into())
        );
    }

    #[test]
    fn test_metadata() {
        let registry = FitnessRegistry::standard();
        let ppeaks = registry.get("ppeaks").unwrap();
        assert_eq!(ppeaks.direction, OptimizationDirection::Maximize);
        assert_eq!(ppeaks.representation, Representation::Byte);
        let ackley = registry.get("ackley").unwrap();
        assert_eq!(ackley.direction, OptimizationDirection::Minimize);
        assert_eq!(
            ackley.default_bounds,
            Some(Bounds::Float64 {
                min: -32.768,
                max: 32.768
            })
        );
    }

    #[test]
    fn test_end_to_end_values() {
        let registry = FitnessRegistry::standard();

        let sphere = registry.bind("sphere", FitnessArguments::None).unwrap();
        assert_eq!(
            sphere.evaluate(&individual(Chromosome::Float64(vec![2.0]))),
            Ok(FitnessValue::Float64(4.0))
        );

        let rastrigin = registry.bind("rastrigin", FitnessArguments::None).unwrap();
        match rastrigin.evaluate(&individual(Chromosome::Float64(vec![0.0; 12]))) {
            Ok(FitnessValue::Float64(value)) => assert!(value.abs() < 1e-9, "got {}", value),
            other => panic!("unexpected {:?}", other),
        }

        let genes = vec![1, 1, 0, 1];
        let ppeaks = registry
            .bind("ppeaks", FitnessArguments::Peaks { peaks: vec![genes.clone()] })
            .unwrap();
        assert_eq!(
            ppeaks.evaluate(&individual(Chromosome::Byte(genes))),
            Ok(FitnessValue::Float64(1.0))
        );
    }

    #[test]
    fn test_wrong_representation_is_an_error() {
        let sphere = FitnessRegistry::standard()
            .bind("sphere", FitnessArguments::None)
            .unwrap();
        assert_eq!(
            sphere.evaluate(&individual(Chromosome::Float32(vec![2.0]))),
            Err(FitnessError::Variant(VariantError::TypeMismatch {
                expected: Representation::Float64,
                found: Representation::Float32,
            }))
        );
    }

    #[test]
    fn test_missing_arguments() {
        let registry = FitnessRegistry::standard();
        let tour = registry.bind("tour", FitnessArguments::None).unwrap();
        assert!(matches!(
            tour.evaluate(&individual(Chromosome::Int(vec![0, 1]))),
            Err(FitnessError::MissingArgument { function: "tour", .. })
        ));
    }

    #[test]
    fn test_shifted_benchmark_and_sleep_probe() {
        let registry = FitnessRegistry::standard();
        let shifted = registry
            .bind(
                "sphere",
                FitnessArguments::Transform(Transform {
                    shift: Some(vec![1.0, -1.0]),
                    rotation: None,
                }),
            )
            .unwrap();
        let mut candidate = individual(Chromosome::Float64(vec![1.0, -1.0]));
        shifted.evaluate_in_place(&mut candidate).unwrap();
        assert_eq!(candidate.fitness_value, Some(FitnessValue::Float64(0.0)));

        let sleep = registry
            .bind("sleep", FitnessArguments::Sleep { duration_ns: 0, seed: 42 })
            .unwrap();
        let value = sleep.evaluate(&individual(Chromosome::Byte(vec![0]))).unwrap();
        assert!((0.0..1.0).contains(&value.as_f64()));
    }

    #[test]
    fn test_tour_and_makespan_produce_int_fitness() {
        let registry = FitnessRegistry::standard();
        let tour = registry
            .bind(
                "tour",
                FitnessArguments::Nodes {
                    nodes: vec![[0, 0], [0, 0], [3, 4]],
                },
            )
            .unwrap();
        assert_eq!(
            tour.evaluate(&individual(Chromosome::Int(vec![0, 1, 2]))),
            Ok(FitnessValue::Int(5))
        );

        let makespan = registry
            .bind(
                "makespan",
                FitnessArguments::JobShop {
                    instance: vec![vec![[0, 2]], vec![[0, 5]]],
                },
            )
            .unwrap();
        assert_eq!(
            makespan.evaluate(&individual(Chromosome::Int(vec![1, 0]))),
            Ok(FitnessValue::Int(5))
        );
    }
}
