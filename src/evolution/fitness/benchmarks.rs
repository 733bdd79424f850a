//! Continuous benchmark functions over `f64` vectors. All of them are minimized.

use std::f64::consts::{E, PI};

use serde::{Deserialize, Serialize};

use super::FitnessError;

pub fn sphere(genes: &[f64]) -> f64 {
    genes.iter().map(|x| x * x).sum()
}

pub fn rastrigin(genes: &[f64]) -> f64 {
    10.0 * genes.len() as f64
        + genes
            .iter()
            .map(|x| x * x - 10.0 * (2.0 * PI * x).cos())
            .sum::<f64>()
}

pub fn ackley(genes: &[f64]) -> f64 {
    let n = genes.len() as f64;
    let square_sum: f64 = genes.iter().map(|x| x * x).sum();
    let cosine_sum: f64 = genes.iter().map(|x| (2.0 * PI * x).cos()).sum();
    -20.0 * (-0.2 * (square_sum / n).sqrt()).exp() - (cosine_sum / n).exp() + 20.0 + E
}

pub fn schwefel(genes: &[f64]) -> f64 {
    genes.iter().map(|x| -x * x.abs().sqrt().sin()).sum()
}

pub fn rosenbrock(genes: &[f64]) -> f64 {
    genes
        .windows(2)
        .map(|pair| {
            let (x, next) = (pair[0], pair[1]);
            100.0 * (next - x * x).powi(2) + (1.0 - x).powi(2)
        })
        .sum()
}

/// Optional change of variables applied before a benchmark is evaluated.
///
/// `shift` is subtracted element-wise (it moves the optimum), then `rotation`
/// (a square matrix, row-major) is applied to the shifted vector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Transform {
    #[serde(default)]
    pub shift: Option<Vec<f64>>,
    #[serde(default)]
    pub rotation: Option<Vec<Vec<f64>>>,
}

impl Transform {
    pub fn apply(&self, genes: &[f64]) -> Result<Vec<f64>, FitnessError> {
        let mut vector = genes.to_vec();

        if let Some(shift) = &self.shift {
            if shift.len() != vector.len() {
                return Err(FitnessError::InvalidArgument(format!(
                    "shift vector has {} entries for a chromosome of {}",
                    shift.len(),
                    vector.len()
                )));
            }
            vector
                .iter_mut()
                .zip(shift.iter())
                .for_each(|(x, offset)| *x -= offset);
        }

        if let Some(rotation) = &self.rotation {
            if rotation.len() != vector.len() || rotation.iter().any(|row| row.len() != vector.len()) {
                return Err(FitnessError::InvalidArgument(format!(
                    "rotation matrix must be {n}x{n}",
                    n = vector.len()
                )));
            }
            vector = rotation
                .iter()
                .map(|row| row.iter().zip(vector.iter()).map(|(a, x)| a * x).sum())
                .collect();
        }

        Ok(vector)
    }
}
