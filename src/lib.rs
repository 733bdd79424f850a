//! A generational evolutionary optimizer whose fitness evaluation runs either
//! in-process or fanned out to workers over a message broker.

pub mod codec;
pub mod config;
pub mod consts;
pub mod distribution;
pub mod evolution;
pub mod experiment;
pub mod report;

pub use config::{ConfigError, ExperimentConfig, Role};
pub use experiment::{run_experiment, ExperimentError, ExperimentOutcome};
