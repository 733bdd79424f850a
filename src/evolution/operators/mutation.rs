use rand::Rng;

use super::OperatorError;
use crate::evolution::individual::Individual;
use crate::evolution::values::{Bounds, Gene};

fn resample_genes<G: Gene, R: Rng + ?Sized>(
    genes: &mut [G],
    min: G,
    max: G,
    mutation_rate: f64,
    rng: &mut R,
) {
    for gene in genes.iter_mut() {
        if rng.gen_bool(mutation_rate) {
            *gene = G::sample(rng, min, max);
        }
    }
}

/// Random-resetting mutation, in place.
///
/// Each gene independently, with probability `mutation_rate`, is replaced by a fresh
/// draw from `bounds` using the initialization sampling rule.
pub fn mutate<R: Rng + ?Sized>(
    individual: &mut Individual,
    bounds: &Bounds,
    mutation_rate: f64,
    rng: &mut R,
) -> Result<(), OperatorError> {
    let rate = mutation_rate.clamp(0.0, 1.0);
    let chromosome = &mut individual.chromosome;
    match *bounds {
        Bounds::Byte { min, max } => resample_genes(u8::genes_mut(chromosome)?, min, max, rate, rng),
        Bounds::Int { min, max } => resample_genes(i32::genes_mut(chromosome)?, min, max, rate, rng),
        Bounds::Int64 { min, max } => {
            resample_genes(i64::genes_mut(chromosome)?, min, max, rate, rng)
        }
        Bounds::Float32 { min, max } => {
            resample_genes(f32::genes_mut(chromosome)?, min, max, rate, rng)
        }
        Bounds::Float64 { min, max } => {
            resample_genes(f64::genes_mut(chromosome)?, min, max, rate, rng)
        }
    }
    Ok(())
}
