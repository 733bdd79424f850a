use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Synthetic load for timing experiments: blocks the calling thread for `duration`
/// and returns a pseudo-random fitness in `[0, 1)`.
///
/// The value comes from a generator dedicated to this call, seeded from the run seed
/// and the individual id, so it does not depend on which thread or worker ran it.
pub fn sleep_probe(duration: Duration, seed: u64, individual_id: i64) -> f64 {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
    let mut rng = StdRng::seed_from_u64(seed ^ (individual_id as u64).rotate_left(32));
    rng.gen::<f64>()
}
