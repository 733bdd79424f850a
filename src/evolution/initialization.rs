use super::individual::{Individual, Population};
use super::values::{Bounds, Chromosome, Gene};
use super::EvolutionError;
use rand::Rng;

fn sample_genes<G: Gene, R: Rng + ?Sized>(rng: &mut R, length: usize, min: G, max: G) -> Vec<G> {
    (0..length).map(|_| G::sample(rng, min, max)).collect()
}

/// Builds one chromosome whose genes are sampled independently from `bounds`.
pub fn random_chromosome<R: Rng + ?Sized>(bounds: &Bounds, length: usize, rng: &mut R) -> Chromosome {
    match *bounds {
        Bounds::Byte { min, max } => u8::into_chromosome(sample_genes(rng, length, min, max)),
        Bounds::Int { min, max } => i32::into_chromosome(sample_genes(rng, length, min, max)),
        Bounds::Int64 { min, max } => i64::into_chromosome(sample_genes(rng, length, min, max)),
        Bounds::Float32 { min, max } => f32::into_chromosome(sample_genes(rng, length, min, max)),
        Bounds::Float64 { min, max } => f64::into_chromosome(sample_genes(rng, length, min, max)),
    }
}

/// Produces generation 0: `population_size` individuals with ids `0..population_size`.
///
/// The representation is carried by `bounds`. Given the same seeded `rng` the result is
/// reproducible across runs.
pub fn initialize_population<R: Rng + ?Sized>(
    bounds: &Bounds,
    population_size: usize,
    chromosome_size: usize,
    rng: &mut R,
) -> Result<Population, EvolutionError> {
    if population_size == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Population size cannot be zero".into(),
        ));
    } else if !bounds.is_ordered() {
        return Err(EvolutionError::BadPopulationParameter(format!(
            "Bounds must satisfy min <= max, got {:?}",
            bounds
        )));
    }

    Ok((0..population_size)
        .map(|id| {
            Individual::new(
                id as i64,
                0,
                random_chromosome(bounds, chromosome_size, rng),
            )
        })
        .collect())
}
