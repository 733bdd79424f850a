// Queues
pub const REQUEST_QUEUE_NAME: &str = "evoqueue_request";
pub const RESPONSE_QUEUE_NAME: &str = "evoqueue_response";

// Genetic operators
/// Expansion factor of the BLX-alpha blend interval.
pub const BLX_ALPHA: f64 = 0.5;

// Benchmark bounds
pub const SPHERE_MIN_BOUND: f64 = -5.12;
pub const SPHERE_MAX_BOUND: f64 = 5.12;

pub const RASTRIGIN_MIN_BOUND: f64 = -5.12;
pub const RASTRIGIN_MAX_BOUND: f64 = 5.12;

pub const ACKLEY_MIN_BOUND: f64 = -32.768;
pub const ACKLEY_MAX_BOUND: f64 = 32.768;

pub const SCHWEFEL_MIN_BOUND: f64 = -500.0;
pub const SCHWEFEL_MAX_BOUND: f64 = 500.0;

pub const ROSENBROCK_MIN_BOUND: f64 = -2.048;
pub const ROSENBROCK_MAX_BOUND: f64 = 2.048;

pub const BIT_MIN_BOUND: u8 = 0;
pub const BIT_MAX_BOUND: u8 = 1;

/// Mixed into the run seed for the P-Peaks reference peaks.
pub const PEAKS_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

// Codec
/// Upper bound on the decoded size of one individual record.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const COMPRESSION_LEVEL: i32 = 1;
