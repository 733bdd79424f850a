//! Experiment configuration: a JSON file with defaults for every field, overridable
//! through `EVOQUEUE_*` environment variables, converted once into the immutable
//! `EvolutionConfig` the loop runs on.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::consts::PEAKS_SEED_SALT;
use crate::distribution::RoundOptions;
use crate::evolution::fitness::{random_peaks, FitnessArguments, FitnessError, FitnessRegistry, Transform};
use crate::evolution::operators::{CrossoverStrategy, SelectionStrategy};
use crate::evolution::{Bounds, EvolutionConfig, EvolutionError};
use crate::report::ExperimentRecord;

pub const ENV_PREFIX: &str = "EVOQUEUE_";
pub const CONFIG_PATH_VARIABLE: &str = "EVOQUEUE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Fitness(#[from] FitnessError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Evaluate in-process.
    #[default]
    Sequential,
    /// Coordinator plus a local cluster of workers behind the broker.
    Distributed,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sequential => write!(f, "sequential"),
            Role::Distributed => write!(f, "distributed"),
        }
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Role::Sequential),
            "distributed" | "master" => Ok(Role::Distributed),
            _ => Err(ConfigError::InvalidValue {
                key: "role".into(),
                value: value.into(),
            }),
        }
    }
}

fn default_cluster_size() -> usize {
    num_cpus::get()
}

fn default_seed() -> u64 {
    42
}

fn default_fitness() -> String {
    "sphere".into()
}

fn default_population_size() -> usize {
    10
}

fn default_generations() -> usize {
    10
}

fn default_chromosome_size() -> usize {
    10
}

fn default_tournament_size() -> usize {
    2
}

fn default_crossover() -> CrossoverStrategy {
    CrossoverStrategy::TwoPoint
}

fn default_crossover_rate() -> f64 {
    1.0
}

fn default_mutation_rate() -> f64 {
    0.001
}

fn default_peaks() -> usize {
    512
}

fn default_sleep_ns() -> u64 {
    1_000_000
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Fresh random id when absent.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_fitness")]
    pub fitness: String,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_chromosome_size")]
    pub chromosome_size: usize,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Tournament of `tournament_size` when absent.
    #[serde(default)]
    pub selection: Option<SelectionStrategy>,
    #[serde(default = "default_crossover")]
    pub crossover: CrossoverStrategy,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Number of reference peaks for `ppeaks`.
    #[serde(default = "default_peaks")]
    pub peaks: usize,
    /// Sleep per evaluation for the `sleep` probe.
    #[serde(default = "default_sleep_ns")]
    pub sleep_ns: u64,
    /// Overrides the function's default bounds.
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub round_timeout_ms: Option<u64>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub test_setup: bool,
    #[serde(default)]
    pub test_latency: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            run_id: None,
            role: Role::default(),
            cluster_size: default_cluster_size(),
            seed: default_seed(),
            fitness: default_fitness(),
            population_size: default_population_size(),
            generations: default_generations(),
            chromosome_size: default_chromosome_size(),
            tournament_size: default_tournament_size(),
            selection: None,
            crossover: default_crossover(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            peaks: default_peaks(),
            sleep_ns: default_sleep_ns(),
            bounds: None,
            transform: None,
            round_timeout_ms: None,
            verbose: false,
            report_path: None,
            test_setup: false,
            test_latency: false,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl ExperimentConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Reads `path` (defaults when `None`), then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        Ok(config)
    }

    /// Applies `EVOQUEUE_*` variables. Unknown names are ignored.
    pub fn apply_overrides<I>(&mut self, variables: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in variables {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "ROLE" => self.role = value.parse()?,
                "SEED" => self.seed = parse(&name, &value)?,
                "FITNESS" => self.fitness = value.trim().to_string(),
                "POPULATION" => self.population_size = parse(&name, &value)?,
                "GENERATIONS" => self.generations = parse(&name, &value)?,
                "CHROMOSOME" => self.chromosome_size = parse(&name, &value)?,
                "CLUSTER_SIZE" => self.cluster_size = parse(&name, &value)?,
                "VERBOSE" => self.verbose = parse(&name, &value)?,
                "REPORT_PATH" => self.report_path = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(())
    }

    /// The configuration actually run, with the probe adjustments applied. The setup
    /// probe sizes the population to the cluster and only evaluates it once; the
    /// latency probe runs a single generation.
    pub fn effective(&self) -> Self {
        let mut effective = self.clone();
        if self.test_setup {
            effective.population_size = self.cluster_size.max(1);
            effective.generations = 0;
            effective.chromosome_size = 1;
            effective.peaks = 1;
            effective.tournament_size = effective.tournament_size.min(effective.population_size);
            if let Some(SelectionStrategy::Tournament { size }) = &mut effective.selection {
                *size = (*size).min(effective.population_size);
            }
        }
        if self.test_latency {
            effective.generations = 1;
        }
        effective
    }

    pub fn round_options(&self) -> RoundOptions {
        RoundOptions {
            timeout: self.round_timeout_ms.map(Duration::from_millis),
            ..RoundOptions::default()
        }
    }

    pub fn selection_strategy(&self) -> SelectionStrategy {
        self.selection.unwrap_or(SelectionStrategy::Tournament {
            size: self.tournament_size,
        })
    }

    fn fitness_arguments(&self) -> Result<FitnessArguments, ConfigError> {
        Ok(match self.fitness.as_str() {
            "sphere" | "rastrigin" | "ackley" | "schwefel" | "rosenbrock" => {
                match &self.transform {
                    Some(transform) => FitnessArguments::Transform(transform.clone()),
                    None => FitnessArguments::None,
                }
            }
            "ppeaks" => {
                // kept apart from the population's random stream
                let mut rng = StdRng::seed_from_u64(self.seed ^ PEAKS_SEED_SALT);
                FitnessArguments::Peaks {
                    peaks: random_peaks(self.peaks, self.chromosome_size, &mut rng),
                }
            }
            // the operators do not preserve permutations
            "tour" | "makespan" => {
                return Err(ConfigError::Invalid(format!(
                    "`{}` is defined over permutations and can only be evaluated directly",
                    self.fitness
                )))
            }
            "sleep" => FitnessArguments::Sleep {
                duration_ns: self.sleep_ns,
                seed: self.seed,
            },
            other => return Err(FitnessError::UnknownFunction(other.to_string()).into()),
        })
    }

    fn bounds_for(&self, default_bounds: Option<Bounds>) -> Result<Bounds, ConfigError> {
        if let Some(bounds) = self.bounds {
            return Ok(bounds);
        }
        default_bounds.ok_or_else(|| {
            ConfigError::Invalid(format!(
                "`{}` has no default bounds; set `bounds`",
                self.fitness
            ))
        })
    }

    /// Validates the (already effective) configuration and binds the fitness function.
    pub fn evolution_config(&self, registry: &FitnessRegistry) -> Result<EvolutionConfig, ConfigError> {
        if self.role == Role::Distributed && self.cluster_size == 0 {
            return Err(ConfigError::Invalid(
                "A distributed run needs at least one worker".into(),
            ));
        }

        let arguments = self.fitness_arguments()?;
        let fitness = registry.bind(&self.fitness, arguments)?;
        let bounds = self.bounds_for(fitness.default_bounds())?;

        let config = EvolutionConfig {
            run_id: self.run_id.unwrap_or_else(Uuid::new_v4),
            seed: self.seed,
            fitness,
            bounds,
            population_size: self.population_size,
            generations: self.generations,
            chromosome_size: self.chromosome_size,
            selection: self.selection_strategy(),
            crossover: self.crossover,
            crossover_rate: self.crossover_rate,
            mutation_rate: self.mutation_rate,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn experiment_record(&self, run_id: Uuid) -> ExperimentRecord {
        ExperimentRecord {
            run_id,
            role: self.role.to_string(),
            cluster_size: match self.role {
                Role::Sequential => 1,
                Role::Distributed => self.cluster_size,
            },
            seed: self.seed,
            fitness_function: self.fitness.clone(),
            population_size: self.population_size,
            generations: self.generations,
            chromosome_size: self.chromosome_size,
            tournament_size: self.tournament_size,
            crossover_rate: self.crossover_rate,
            mutation_rate: self.mutation_rate,
            peaks: self.peaks,
            sleep_ns: self.sleep_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::OptimizationDirection;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_json_takes_defaults() {
        let config = ExperimentConfig::from_json("{}").unwrap();
        assert_eq!(config.role, Role::Sequential);
        assert_eq!(config.seed, 42);
        assert_eq!(config.fitness, "sphere");
        assert_eq!(config.population_size, 10);
        assert_eq!(config.generations, 10);
        assert_eq!(config.chromosome_size, 10);
        assert_eq!(config.tournament_size, 2);
        assert_eq!(config.crossover, CrossoverStrategy::TwoPoint);
        assert_eq!(config.crossover_rate, 1.0);
        assert_eq!(config.mutation_rate, 0.001);
        assert_eq!(config.peaks, 512);
        assert_eq!(config.sleep_ns, 1_000_000);
        assert_eq!(config.cluster_size, num_cpus::get());
        assert_eq!(config.selection_strategy(), SelectionStrategy::Tournament { size: 2 });
    }

    #[test]
    fn test_json_fields() {
        let config = ExperimentConfig::from_json(
            r#"{
                "role": "distributed",
                "fitness": "ppeaks",
                "selection": {"kind": "roulette_wheel"},
                "crossover": "single_point",
                "bounds": {"representation": "byte", "min": 0, "max": 1},
                "round_timeout_ms": 2500
            }"#,
        )
        .unwrap();
        assert_eq!(config.role, Role::Distributed);
        assert_eq!(config.selection_strategy(), SelectionStrategy::RouletteWheel);
        assert_eq!(config.crossover, CrossoverStrategy::SinglePoint);
        assert_eq!(config.bounds, Some(Bounds::Byte { min: 0, max: 1 }));
        assert_eq!(config.round_options().timeout, Some(Duration::from_millis(2500)));

        assert!(matches!(
            ExperimentConfig::from_json(r#"{"population_size": "ten"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = ExperimentConfig::default();
        config
            .apply_overrides(vars(&[
                ("EVOQUEUE_ROLE", "distributed"),
                ("EVOQUEUE_SEED", "7"),
                ("EVOQUEUE_POPULATION", "20"),
                ("EVOQUEUE_VERBOSE", "true"),
                ("EVOQUEUE_REPORT_PATH", "/tmp/report.jsonl"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.role, Role::Distributed);
        assert_eq!(config.seed, 7);
        assert_eq!(config.population_size, 20);
        assert!(config.verbose);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.jsonl")));

        let error = config
            .apply_overrides(vars(&[("EVOQUEUE_GENERATIONS", "many")]))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_probe_adjustments() {
        let config = ExperimentConfig {
            test_setup: true,
            cluster_size: 3,
            ..ExperimentConfig::default()
        };
        let effective = config.effective();
        assert_eq!(effective.population_size, 3);
        assert_eq!(effective.generations, 0);
        assert_eq!(effective.chromosome_size, 1);
        assert_eq!(effective.peaks, 1);
        assert!(
            effective.evolution_config(&FitnessRegistry::standard()).is_ok(),
            "an odd population is fine without generations"
        );

        let explicit = ExperimentConfig {
            test_setup: true,
            cluster_size: 2,
            selection: Some(SelectionStrategy::Tournament { size: 5 }),
            ..ExperimentConfig::default()
        }
        .effective();
        assert_eq!(
            explicit.selection_strategy(),
            SelectionStrategy::Tournament { size: 2 }
        );
        assert!(explicit.evolution_config(&FitnessRegistry::standard()).is_ok());

        let latency = ExperimentConfig {
            test_latency: true,
            ..ExperimentConfig::default()
        };
        assert_eq!(latency.effective().generations, 1);
    }

    #[test]
    fn test_evolution_config_binds_arguments() {
        let registry = FitnessRegistry::standard();

        let ppeaks = ExperimentConfig {
            fitness: "ppeaks".into(),
            peaks: 4,
            ..ExperimentConfig::default()
        };
        let evolution = ppeaks.evolution_config(&registry).unwrap();
        assert_eq!(evolution.fitness.direction(), OptimizationDirection::Maximize);
        assert_eq!(evolution.bounds, Bounds::Byte { min: 0, max: 1 });
        match evolution.fitness.arguments() {
            FitnessArguments::Peaks { peaks } => {
                assert_eq!(peaks.len(), 4);
                assert!(peaks.iter().all(|peak| peak.len() == 10));
            }
            other => panic!("unexpected arguments {:?}", other),
        }
        // same seed, same peaks
        let again = ppeaks.evolution_config(&registry).unwrap();
        assert_eq!(evolution.fitness.arguments(), again.fitness.arguments());
    }

    #[test]
    fn test_permutation_functions_are_not_generational_objectives() {
        let registry = FitnessRegistry::standard();
        for name in ["tour", "makespan"] {
            let config = ExperimentConfig {
                fitness: name.into(),
                chromosome_size: 6,
                bounds: Some(Bounds::Int { min: 0, max: 5 }),
                ..ExperimentConfig::default()
            };
            match config.evolution_config(&registry) {
                Err(ConfigError::Invalid(message)) => assert!(message.contains(name)),
                other => panic!("`{}` should be rejected, got {:?}", name, other),
            }
            assert!(registry.get(name).is_ok(), "`{}` stays in the registry", name);
        }
    }

    #[test]
    fn test_invalid_configurations() {
        let registry = FitnessRegistry::standard();
        for config in [
            ExperimentConfig {
                fitness: "nope".into(),
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                fitness: "makespan".into(),
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                fitness: "tour".into(),
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                role: Role::Distributed,
                cluster_size: 0,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                population_size: 7,
                ..ExperimentConfig::default()
            },
            ExperimentConfig {
                bounds: Some(Bounds::Byte { min: 0, max: 1 }),
                ..ExperimentConfig::default()
            },
        ] {
            assert!(
                config.evolution_config(&registry).is_err(),
                "expected {:?} to be rejected",
                config
            );
        }
    }
}
