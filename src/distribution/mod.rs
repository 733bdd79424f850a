//! Fan-out/fan-in of fitness evaluation over a message broker.
//!
//! The coordinator publishes every individual of a generation on the request queue and
//! waits for the same number of evaluated individuals on the response queue. Workers
//! consume one request at a time, evaluate it and publish the result.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::CodecError;
use crate::consts::{REQUEST_QUEUE_NAME, RESPONSE_QUEUE_NAME};
use crate::evolution::fitness::FitnessError;
use crate::report::ReportError;

pub mod broker;
pub mod coordinator;
pub mod memory;
pub mod worker;

pub use broker::{Delivery, MessageBroker, TransportError};
pub use coordinator::Coordinator;
pub use memory::InMemoryBroker;
pub use worker::{LocalCluster, Worker, WorkerMode};

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Worker failed to evaluate an individual: {0}")]
    Fitness(#[from] FitnessError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("Round incomplete: received {received} of {expected} responses")]
    IncompleteRound { expected: usize, received: usize },
    #[error("Round cancelled")]
    Cancelled,
    #[error("Response stream on queue `{0}` ended before the round completed")]
    StreamClosed(String),
    #[error("Individual id {0} appears more than once in the population")]
    DuplicateId(i64),
    #[error("Task failed: {0}")]
    Task(String),
}

/// Names of the two logical channels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub request: String,
    pub response: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        QueueNames {
            request: REQUEST_QUEUE_NAME.to_string(),
            response: RESPONSE_QUEUE_NAME.to_string(),
        }
    }
}

/// Limits applied to each coordinator round.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RoundOptions {
    /// `None` waits for as long as it takes.
    pub timeout: Option<Duration>,
    /// How often the latency probe checks whether the request queue has drained.
    pub poll_interval: Duration,
}

impl Default for RoundOptions {
    fn default() -> Self {
        RoundOptions {
            timeout: None,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Coordinator state within one evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    Publishing,
    AwaitingResponses,
    Reassembling,
}
