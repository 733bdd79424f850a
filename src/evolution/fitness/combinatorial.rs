use rand::Rng;

use super::FitnessError;
use crate::consts::{BIT_MAX_BOUND, BIT_MIN_BOUND};
use crate::evolution::values::{Gene, VariantError};

/// Generates `count` random bit-string peaks of `length` genes.
pub fn random_peaks<R: Rng + ?Sized>(count: usize, length: usize, rng: &mut R) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| u8::sample(rng, BIT_MIN_BOUND, BIT_MAX_BOUND))
                .collect()
        })
        .collect()
}

fn hamming(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}

/// P-Peaks: the best normalized similarity `(n - hamming) / n` to any peak. Maximized.
pub fn ppeaks(genes: &[u8], peaks: &[Vec<u8>]) -> Result<f64, FitnessError> {
    if peaks.is_empty() {
        return Err(FitnessError::InvalidArgument(
            "P-Peaks needs at least one peak".into(),
        ));
    }
    if genes.is_empty() {
        return Err(FitnessError::InvalidArgument(
            "P-Peaks is undefined for an empty chromosome".into(),
        ));
    }

    let n = genes.len();
    let mut best = 0;
    for peak in peaks {
        if peak.len() != n {
            return Err(VariantError::LengthMismatch {
                left: n,
                right: peak.len(),
            }
            .into());
        }
        best = best.max(n - hamming(genes, peak));
    }
    Ok(best as f64 / n as f64)
}

fn euclidean_distance(a: [i32; 2], b: [i32; 2]) -> i64 {
    let dx = f64::from(a[0]) - f64::from(b[0]);
    let dy = f64::from(a[1]) - f64::from(b[1]);
    // half-up rounding
    ((dx * dx + dy * dy).sqrt() + 0.5).floor() as i64
}

/// Open-path tour length over the visited `nodes`.
///
/// Sums the rounded distances between `tour[i]` and `tour[i + 1]` for `i` in
/// `1..nodes.len() - 1`, so the leg leaving the first position is not counted.
pub fn tour_length(tour: &[i32], nodes: &[[i32; 2]]) -> Result<i64, FitnessError> {
    if tour.len() != nodes.len() {
        return Err(FitnessError::InvalidArgument(format!(
            "tour visits {} positions but the instance has {} nodes",
            tour.len(),
            nodes.len()
        )));
    }
    let node_at = |position: usize| -> Result<[i32; 2], FitnessError> {
        usize::try_from(tour[position])
            .ok()
            .and_then(|index| nodes.get(index).copied())
            .ok_or_else(|| {
                FitnessError::InvalidArgument(format!(
                    "tour position {} names unknown node {}",
                    position, tour[position]
                ))
            })
    };

    let mut distance = 0;
    for position in 1..nodes.len().saturating_sub(1) {
        distance += euclidean_distance(node_at(position)?, node_at(position + 1)?);
    }
    Ok(distance)
}

/// Block makespan of a job-shop schedule.
///
/// `instance[job][operation]` is `[machine, duration]`. The schedule lists job indices;
/// each occurrence schedules that job's next operation. Operations are grouped in blocks
/// of one per machine, a block's cost is the sum of its durations, and the result is the
/// most expensive block (a trailing partial block included). Minimized.
pub fn makespan(schedule: &[i32], instance: &[Vec<[i32; 2]>]) -> Result<i64, FitnessError> {
    let machines = match instance.first() {
        Some(operations) if !operations.is_empty() => operations.len(),
        _ => {
            return Err(FitnessError::InvalidArgument(
                "job-shop instance has no jobs or no machines".into(),
            ))
        }
    };

    let mut next_operation = vec![0usize; instance.len()];
    let mut block = 0i64;
    let mut longest = 0i64;

    for (position, &job) in schedule.iter().enumerate() {
        let job_index = usize::try_from(job)
            .ok()
            .filter(|&index| index < instance.len())
            .ok_or_else(|| FitnessError::InvalidArgument(format!("unknown job {}", job)))?;
        let operation = instance[job_index]
            .get(next_operation[job_index])
            .ok_or_else(|| {
                FitnessError::InvalidArgument(format!(
                    "job {} is scheduled more often than it has operations",
                    job
                ))
            })?;
        next_operation[job_index] += 1;
        block += i64::from(operation[1]);

        if (position + 1) % machines == 0 {
            longest = longest.max(block);
            block = 0;
        }
    }

    // a schedule shorter than a whole block still has a makespan, so the trailing
    // partial block is counted instead of dropped
    Ok(longest.max(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ppeaks_identical_peak_scores_one() {
        let genes = vec![1, 0, 1, 1, 0];
        let peaks = vec![vec![0, 0, 0, 0, 0], genes.clone()];
        assert_eq!(ppeaks(&genes, &peaks).unwrap(), 1.0);
    }

    #[test]
    fn test_ppeaks_takes_closest_peak() {
        let genes = vec![1, 1, 1, 1];
        let peaks = vec![vec![0, 0, 0, 0], vec![1, 1, 0, 0], vec![1, 1, 1, 0]];
        assert_eq!(ppeaks(&genes, &peaks).unwrap(), 0.75);
    }

    #[test]
    fn test_ppeaks_argument_errors() {
        assert!(ppeaks(&[1, 0], &[]).is_err());
        assert!(ppeaks(&[1, 0], &[vec![1]]).is_err());
    }

    #[test]
    fn test_random_peaks_are_bit_strings() {
        let mut rng = StdRng::seed_from_u64(0);
        let peaks = random_peaks(4, 16, &mut rng);
        assert_eq!(peaks.len(), 4);
        assert!(peaks.iter().all(|peak| peak.len() == 16 && peak.iter().all(|&bit| bit <= 1)));
    }

    #[test]
    fn test_tour_skips_first_leg() {
        let nodes = vec![[0, 0], [3, 0], [3, 4], [0, 4]];
        // counted legs: 1 -> 2 (4) and 2 -> 3 (3)
        assert_eq!(tour_length(&[0, 1, 2, 3], &nodes).unwrap(), 7);
        // legs: [3,4] -> [3,0] (4) and [3,0] -> [0,0] (3)
        assert_eq!(tour_length(&[3, 2, 1, 0], &nodes).unwrap(), 7);
    }

    #[test]
    fn test_tour_rounds_half_up() {
        let nodes = vec![[0, 0], [0, 0], [1, 1], [2, 2]];
        // sqrt(2) rounds to 1 twice
        assert_eq!(tour_length(&[0, 1, 2, 3], &nodes).unwrap(), 2);
        assert!(tour_length(&[0, 1, 9, 3], &nodes).is_err());
        assert!(tour_length(&[0, 1], &nodes).is_err());
    }

    #[test]
    fn test_makespan_blocks() {
        // two machines: blocks are operations (0,1) and (2,3)
        let instance = vec![vec![[0, 3], [1, 2]], vec![[1, 4], [0, 6]]];
        assert_eq!(makespan(&[0, 1, 0, 1], &instance).unwrap(), 8);
        assert_eq!(makespan(&[1, 1, 0, 0], &instance).unwrap(), 10);
        // trailing partial block counts
        assert_eq!(makespan(&[0, 0, 1], &instance).unwrap(), 5);
    }

    #[test]
    fn test_makespan_trailing_block_can_dominate() {
        let instance = vec![vec![[0, 1], [1, 1]], vec![[1, 9]]];
        // complete block (0,1) takes 2, the lone trailing operation takes 9
        assert_eq!(makespan(&[0, 0, 1], &instance).unwrap(), 9);
        assert_eq!(makespan(&[1], &instance).unwrap(), 9);
    }

    #[test]
    fn test_makespan_rejects_bad_schedules() {
        let instance = vec![vec![[0, 3], [1, 2]]];
        assert!(makespan(&[0, 0, 0], &instance).is_err(), "job used beyond its operations");
        assert!(makespan(&[2], &instance).is_err(), "unknown job");
        assert!(makespan(&[0], &[]).is_err(), "empty instance");
    }
}
