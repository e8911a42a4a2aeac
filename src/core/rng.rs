use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::error::{SimError, SimResult};

pub type SimRng = ChaCha8Rng;

// Recalibration streams live in their own lane so they never collide with a
// person stream of the same year.
const POPULATION_LANE: u64 = 0xC0FF_EE00_0000_0001;

// Random stream for one person's advance in one simulation year. Depends
// only on the global seed, the year and the person's index, so sequential
// and parallel runs draw identical values.
pub fn person_rng(base_seed: u64, year: u32, person_index: usize) -> SimRng {
    SimRng::seed_from_u64(derive_seed(base_seed, year, person_index as u64))
}

pub fn population_rng(base_seed: u64, year: u32) -> SimRng {
    SimRng::seed_from_u64(derive_seed(base_seed ^ POPULATION_LANE, year, u64::MAX))
}

pub fn derive_seed(base_seed: u64, year: u32, stream: u64) -> u64 {
    let mixed = splitmix64(base_seed ^ ((year as u64) << 32)) ^ splitmix64(stream);
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub fn check_probability(value: f64, context: &'static str) -> SimResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SimError::ProbabilityOutOfRange { context, value })
    }
}

pub fn bernoulli<R: Rng>(
    rng: &mut R,
    probability: f64,
    context: &'static str,
) -> SimResult<bool> {
    let probability = check_probability(probability, context)?;
    Ok(rng.r#gen::<f64>() < probability)
}
