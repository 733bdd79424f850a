use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// The five numeric element types a chromosome (and its fitness value) can be built from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Byte,
    Int,
    Int64,
    Float32,
    Float64,
}

impl Representation {
    pub fn name(&self) -> &'static str {
        match self {
            Representation::Byte => "byte",
            Representation::Int => "int",
            Representation::Int64 => "int64",
            Representation::Float32 => "float32",
            Representation::Float64 => "float64",
        }
    }

    /// Continuous representations are the only ones blend crossover accepts.
    pub fn is_continuous(&self) -> bool {
        matches!(self, Representation::Float32 | Representation::Float64)
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariantError {
    #[error("Type mismatch: expected `{expected}` values but found `{found}`")]
    TypeMismatch {
        expected: Representation,
        found: Representation,
    },
    #[error("Chromosome lengths differ: {left} and {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("Individual {id} has no fitness value")]
    MissingFitness { id: i64 },
    #[error("Segment {start}..{end} is out of range for {len} genes")]
    SegmentOutOfRange { start: usize, end: usize, len: usize },
}

/// Element type of a chromosome.
///
/// Every operator that has to work on all five representations is written once,
/// generically over `Gene`, and reaches the concrete vector through `genes`/`genes_mut`.
pub trait Gene: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const REPRESENTATION: Representation;

    /// Draws a value uniformly from the bounds: `[min, max]` for integers, `[min, max)` for floats.
    fn sample<R: Rng + ?Sized>(rng: &mut R, min: Self, max: Self) -> Self;

    fn into_chromosome(genes: Vec<Self>) -> Chromosome;

    fn genes(chromosome: &Chromosome) -> Result<&[Self], VariantError>;

    fn genes_mut(chromosome: &mut Chromosome) -> Result<&mut [Self], VariantError>;
}

macro_rules! impl_gene_access {
    ($variant:ident) => {
        const REPRESENTATION: Representation = Representation::$variant;

        fn into_chromosome(genes: Vec<Self>) -> Chromosome {
            Chromosome::$variant(genes)
        }

        fn genes(chromosome: &Chromosome) -> Result<&[Self], VariantError> {
            match chromosome {
                Chromosome::$variant(genes) => Ok(genes),
                other => Err(VariantError::TypeMismatch {
                    expected: Self::REPRESENTATION,
                    found: other.representation(),
                }),
            }
        }

        fn genes_mut(chromosome: &mut Chromosome) -> Result<&mut [Self], VariantError> {
            match chromosome {
                Chromosome::$variant(genes) => Ok(genes),
                other => Err(VariantError::TypeMismatch {
                    expected: Self::REPRESENTATION,
                    found: other.representation(),
                }),
            }
        }
    };
}

macro_rules! impl_integer_gene {
    ($ty:ty, $variant:ident) => {
        impl Gene for $ty {
            impl_gene_access!($variant);

            fn sample<R: Rng + ?Sized>(rng: &mut R, min: Self, max: Self) -> Self {
                if min >= max {
                    return min;
                }
                rng.gen_range(min..=max)
            }
        }
    };
}

impl_integer_gene!(u8, Byte);
impl_integer_gene!(i32, Int);
impl_integer_gene!(i64, Int64);

// Floats are drawn as `min + u * (max - min)` so that a zero-width interval is valid,
// which blend crossover produces whenever both parents carry the same gene.
fn sample_half_open<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    let value = min + rng.gen::<f64>() * (max - min);
    // rounding can land exactly on `max`
    if value >= max && min < max {
        min
    } else {
        value
    }
}

impl Gene for f32 {
    impl_gene_access!(Float32);

    fn sample<R: Rng + ?Sized>(rng: &mut R, min: Self, max: Self) -> Self {
        let value = sample_half_open(rng, f64::from(min), f64::from(max)) as f32;
        if value >= max && min < max {
            min
        } else {
            value
        }
    }
}

impl Gene for f64 {
    impl_gene_access!(Float64);

    fn sample<R: Rng + ?Sized>(rng: &mut R, min: Self, max: Self) -> Self {
        sample_half_open(rng, min, max)
    }
}

/// A candidate solution: one fixed-length vector of a single numeric element type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Chromosome {
    Byte(Vec<u8>),
    Int(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl Chromosome {
    pub fn representation(&self) -> Representation {
        match self {
            Chromosome::Byte(_) => Representation::Byte,
            Chromosome::Int(_) => Representation::Int,
            Chromosome::Int64(_) => Representation::Int64,
            Chromosome::Float32(_) => Representation::Float32,
            Chromosome::Float64(_) => Representation::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Chromosome::Byte(genes) => genes.len(),
            Chromosome::Int(genes) => genes.len(),
            Chromosome::Int64(genes) => genes.len(),
            Chromosome::Float32(genes) => genes.len(),
            Chromosome::Float64(genes) => genes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get<G: Gene>(&self, index: usize) -> Result<Option<G>, VariantError> {
        Ok(G::genes(self)?.get(index).copied())
    }

    pub fn set<G: Gene>(&mut self, index: usize, value: G) -> Result<bool, VariantError> {
        match G::genes_mut(self)?.get_mut(index) {
            Some(gene) => {
                *gene = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], VariantError> {
        u8::genes(self)
    }

    pub fn as_ints(&self) -> Result<&[i32], VariantError> {
        i32::genes(self)
    }

    pub fn as_int64s(&self) -> Result<&[i64], VariantError> {
        i64::genes(self)
    }

    pub fn as_float32s(&self) -> Result<&[f32], VariantError> {
        f32::genes(self)
    }

    pub fn as_float64s(&self) -> Result<&[f64], VariantError> {
        f64::genes(self)
    }

    /// Exchanges the genes in `range` between two chromosomes of the same representation and length.
    pub fn swap_segment(
        &mut self,
        other: &mut Chromosome,
        range: Range<usize>,
    ) -> Result<(), VariantError> {
        if self.len() != other.len() {
            return Err(VariantError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        if range.start > range.end || range.end > self.len() {
            return Err(VariantError::SegmentOutOfRange {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        let expected = self.representation();
        match (self, other) {
            (Chromosome::Byte(left), Chromosome::Byte(right)) => {
                left[range.clone()].swap_with_slice(&mut right[range])
            }
            (Chromosome::Int(left), Chromosome::Int(right)) => {
                left[range.clone()].swap_with_slice(&mut right[range])
            }
            (Chromosome::Int64(left), Chromosome::Int64(right)) => {
                left[range.clone()].swap_with_slice(&mut right[range])
            }
            (Chromosome::Float32(left), Chromosome::Float32(right)) => {
                left[range.clone()].swap_with_slice(&mut right[range])
            }
            (Chromosome::Float64(left), Chromosome::Float64(right)) => {
                left[range.clone()].swap_with_slice(&mut right[range])
            }
            (_, other) => {
                return Err(VariantError::TypeMismatch {
                    expected,
                    found: other.representation(),
                })
            }
        }
        Ok(())
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chromosome::Byte(genes) => write!(f, "{:?}", genes),
            Chromosome::Int(genes) => write!(f, "{:?}", genes),
            Chromosome::Int64(genes) => write!(f, "{:?}", genes),
            Chromosome::Float32(genes) => write!(f, "{:?}", genes),
            Chromosome::Float64(genes) => write!(f, "{:?}", genes),
        }
    }
}

/// Scalar quality of an individual, comparable only with values of the same variant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FitnessValue {
    Byte(u8),
    Int(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl FitnessValue {
    pub fn representation(&self) -> Representation {
        match self {
            FitnessValue::Byte(_) => Representation::Byte,
            FitnessValue::Int(_) => Representation::Int,
            FitnessValue::Int64(_) => Representation::Int64,
            FitnessValue::Float32(_) => Representation::Float32,
            FitnessValue::Float64(_) => Representation::Float64,
        }
    }

    /// Total order within one variant. Floats use IEEE total ordering so NaN sorts consistently.
    pub fn compare(&self, other: &FitnessValue) -> Result<Ordering, VariantError> {
        match (self, other) {
            (FitnessValue::Byte(a), FitnessValue::Byte(b)) => Ok(a.cmp(b)),
            (FitnessValue::Int(a), FitnessValue::Int(b)) => Ok(a.cmp(b)),
            (FitnessValue::Int64(a), FitnessValue::Int64(b)) => Ok(a.cmp(b)),
            (FitnessValue::Float32(a), FitnessValue::Float32(b)) => Ok(a.total_cmp(b)),
            (FitnessValue::Float64(a), FitnessValue::Float64(b)) => Ok(a.total_cmp(b)),
            _ => Err(VariantError::TypeMismatch {
                expected: self.representation(),
                found: other.representation(),
            }),
        }
    }

    pub fn less(&self, other: &FitnessValue) -> Result<bool, VariantError> {
        Ok(self.compare(other)? == Ordering::Less)
    }

    /// The scalar widened to `f64`, used for averages and roulette weights.
    pub fn as_f64(&self) -> f64 {
        match *self {
            FitnessValue::Byte(value) => f64::from(value),
            FitnessValue::Int(value) => f64::from(value),
            FitnessValue::Int64(value) => value as f64,
            FitnessValue::Float32(value) => f64::from(value),
            FitnessValue::Float64(value) => value,
        }
    }
}

impl fmt::Display for FitnessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitnessValue::Byte(value) => write!(f, "{}", value),
            FitnessValue::Int(value) => write!(f, "{}", value),
            FitnessValue::Int64(value) => write!(f, "{}", value),
            FitnessValue::Float32(value) => write!(f, "{}", value),
            FitnessValue::Float64(value) => write!(f, "{}", value),
        }
    }
}

/// Per-gene sampling bounds, tagged with the representation they produce.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "representation", rename_all = "snake_case")]
pub enum Bounds {
    Byte { min: u8, max: u8 },
    Int { min: i32, max: i32 },
    Int64 { min: i64, max: i64 },
    Float32 { min: f32, max: f32 },
    Float64 { min: f64, max: f64 },
}

impl Bounds {
    pub fn representation(&self) -> Representation {
        match self {
            Bounds::Byte { .. } => Representation::Byte,
            Bounds::Int { .. } => Representation::Int,
            Bounds::Int64 { .. } => Representation::Int64,
            Bounds::Float32 { .. } => Representation::Float32,
            Bounds::Float64 { .. } => Representation::Float64,
        }
    }

    pub fn is_ordered(&self) -> bool {
        match *self {
            Bounds::Byte { min, max } => min <= max,
            Bounds::Int { min, max } => min <= max,
            Bounds::Int64 { min, max } => min <= max,
            Bounds::Float32 { min, max } => min.is_finite() && max.is_finite() && min <= max,
            Bounds::Float64 { min, max } => min.is_finite() && max.is_finite() && min <= max,
        }
    }

    /// Whether every gene lies inside the bounds, using the same interval rule as sampling.
    pub fn contains(&self, chromosome: &Chromosome) -> Result<bool, VariantError> {
        Ok(match *self {
            Bounds::Byte { min, max } => within_closed(u8::genes(chromosome)?, min, max),
            Bounds::Int { min, max } => within_closed(i32::genes(chromosome)?, min, max),
            Bounds::Int64 { min, max } => within_closed(i64::genes(chromosome)?, min, max),
            Bounds::Float32 { min, max } => within_half_open(f32::genes(chromosome)?, min, max),
            Bounds::Float64 { min, max } => within_half_open(f64::genes(chromosome)?, min, max),
        })
    }
}

fn within_closed<G: Gene>(genes: &[G], min: G, max: G) -> bool {
    genes.iter().all(|gene| *gene >= min && *gene <= max)
}

fn within_half_open<G: Gene>(genes: &[G], min: G, max: G) -> bool {
    genes
        .iter()
        .all(|gene| *gene >= min && (*gene < max || min == max))
}
