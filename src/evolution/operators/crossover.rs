use std::ops::Range;

use rand::Rng;

use super::{CrossoverStrategy, OperatorError};
use crate::consts::BLX_ALPHA;
use crate::evolution::individual::Individual;
use crate::evolution::values::{Chromosome, Gene, VariantError};

/// Dispatches to the configured crossover operator.
pub fn crossover<R: Rng + ?Sized>(
    parent_1: &Individual,
    parent_2: &Individual,
    strategy: CrossoverStrategy,
    crossover_rate: f64,
    rng: &mut R,
) -> Result<(Individual, Individual), OperatorError> {
    match strategy {
        CrossoverStrategy::Blend => blend_crossover(parent_1, parent_2, crossover_rate, rng),
        CrossoverStrategy::SinglePoint => {
            single_point_crossover(parent_1, parent_2, crossover_rate, rng)
        }
        CrossoverStrategy::TwoPoint => two_point_crossover(parent_1, parent_2, crossover_rate, rng),
    }
}

fn check_parents(parent_1: &Individual, parent_2: &Individual) -> Result<(), VariantError> {
    if parent_1.representation() != parent_2.representation() {
        return Err(VariantError::TypeMismatch {
            expected: parent_1.representation(),
            found: parent_2.representation(),
        });
    }
    if parent_1.chromosome.len() != parent_2.chromosome.len() {
        return Err(VariantError::LengthMismatch {
            left: parent_1.chromosome.len(),
            right: parent_2.chromosome.len(),
        });
    }
    Ok(())
}

// Children keep their parent's id and generation until rollover renumbers them.
fn child_of(parent: &Individual, chromosome: Chromosome) -> Individual {
    Individual::new(parent.id, parent.generation, chromosome)
}

fn should_cross<R: Rng + ?Sized>(crossover_rate: f64, rng: &mut R) -> bool {
    rng.gen_bool(crossover_rate.clamp(0.0, 1.0))
}

/// BLX-alpha: each child gene is drawn from `[lo - alpha*d, hi - alpha*d]`, where `lo`
/// and `hi` are the parents' genes at that index and `d = hi - lo`.
pub fn blend_crossover<R: Rng + ?Sized>(
    parent_1: &Individual,
    parent_2: &Individual,
    crossover_rate: f64,
    rng: &mut R,
) -> Result<(Individual, Individual), OperatorError> {
    check_parents(parent_1, parent_2)?;
    let representation = parent_1.representation();
    if !representation.is_continuous() {
        return Err(OperatorError::UnsupportedRepresentation {
            operator: "blend crossover",
            representation,
        });
    }
    if !should_cross(crossover_rate, rng) {
        return Ok((parent_1.clone(), parent_2.clone()));
    }

    let (chromosome_1, chromosome_2) = match (&parent_1.chromosome, &parent_2.chromosome) {
        (Chromosome::Float32(genes_1), Chromosome::Float32(genes_2)) => {
            let (child_1, child_2) = blend_genes(genes_1, genes_2, rng);
            (f32::into_chromosome(child_1), f32::into_chromosome(child_2))
        }
        (Chromosome::Float64(genes_1), Chromosome::Float64(genes_2)) => {
            let (child_1, child_2) = blend_genes(genes_1, genes_2, rng);
            (f64::into_chromosome(child_1), f64::into_chromosome(child_2))
        }
        _ => {
            return Err(OperatorError::UnsupportedRepresentation {
                operator: "blend crossover",
                representation,
            })
        }
    };

    Ok((
        child_of(parent_1, chromosome_1),
        child_of(parent_2, chromosome_2),
    ))
}

fn blend_genes<G, R>(genes_1: &[G], genes_2: &[G], rng: &mut R) -> (Vec<G>, Vec<G>)
where
    G: Gene + Into<f64> + BlendInterval,
    R: Rng + ?Sized,
{
    genes_1
        .iter()
        .zip(genes_2.iter())
        .map(|(&x_1, &x_2)| {
            let (min, max) = G::blend_interval(x_1.into(), x_2.into());
            (G::sample(rng, min, max), G::sample(rng, min, max))
        })
        .unzip()
}

/// Narrows the f64 blend interval back to the gene type.
trait BlendInterval: Sized {
    fn blend_interval(x_1: f64, x_2: f64) -> (Self, Self);
}

fn blend_bounds(x_1: f64, x_2: f64) -> (f64, f64) {
    let (low, high) = if x_2 < x_1 { (x_2, x_1) } else { (x_1, x_2) };
    let partial = BLX_ALPHA * (high - low);
    (low - partial, high - partial)
}

impl BlendInterval for f32 {
    fn blend_interval(x_1: f64, x_2: f64) -> (Self, Self) {
        let (min, max) = blend_bounds(x_1, x_2);
        (min as f32, max as f32)
    }
}

impl BlendInterval for f64 {
    fn blend_interval(x_1: f64, x_2: f64) -> (Self, Self) {
        blend_bounds(x_1, x_2)
    }
}

/// Swaps every gene from a random interior cut point to the end.
pub fn single_point_crossover<R: Rng + ?Sized>(
    parent_1: &Individual,
    parent_2: &Individual,
    crossover_rate: f64,
    rng: &mut R,
) -> Result<(Individual, Individual), OperatorError> {
    check_parents(parent_1, parent_2)?;
    if !should_cross(crossover_rate, rng) {
        return Ok((parent_1.clone(), parent_2.clone()));
    }
    let length = parent_1.chromosome.len();
    match single_point_cut(length, rng) {
        Some(point) => swap_children(parent_1, parent_2, point..length),
        None => Ok((parent_1.clone(), parent_2.clone())),
    }
}

/// Swaps the genes between two ordered, distinct, interior cut points.
pub fn two_point_crossover<R: Rng + ?Sized>(
    parent_1: &Individual,
    parent_2: &Individual,
    crossover_rate: f64,
    rng: &mut R,
) -> Result<(Individual, Individual), OperatorError> {
    check_parents(parent_1, parent_2)?;
    if !should_cross(crossover_rate, rng) {
        return Ok((parent_1.clone(), parent_2.clone()));
    }
    match two_point_cuts(parent_1.chromosome.len(), rng) {
        Some((point_1, point_2)) => swap_children(parent_1, parent_2, point_1..point_2),
        None => Ok((parent_1.clone(), parent_2.clone())),
    }
}

/// `point` in `[1, length - 1]`; `None` when the chromosome has no interior position.
fn single_point_cut<R: Rng + ?Sized>(length: usize, rng: &mut R) -> Option<usize> {
    if length < 2 {
        return None;
    }
    Some(rng.gen_range(1..length))
}

/// `1 <= point_1 < point_2 < length`; `None` for chromosomes shorter than three genes.
fn two_point_cuts<R: Rng + ?Sized>(length: usize, rng: &mut R) -> Option<(usize, usize)> {
    if length < 3 {
        return None;
    }
    let point_1 = rng.gen_range(1..=length - 2);
    let point_2 = rng.gen_range(point_1 + 1..=length - 1);
    Some((point_1, point_2))
}

fn swap_children(
    parent_1: &Individual,
    parent_2: &Individual,
    segment: Range<usize>,
) -> Result<(Individual, Individual), OperatorError> {
    let mut chromosome_1 = parent_1.chromosome.clone();
    let mut chromosome_2 = parent_2.chromosome.clone();
    chromosome_1.swap_segment(&mut chromosome_2, segment)?;
    Ok((
        child_of(parent_1, chromosome_1),
        child_of(parent_2, chromosome_2),
    ))
}
