//! Uniform sampling of record indices without replacement

use crate::errors::{LcError, Result};
use rand::Rng;
use std::collections::BTreeSet;

/// Number of indices drawn for `fraction` of `population`, floored
pub fn sample_size(population: usize, fraction: f64) -> Result<usize> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(LcError::InvalidParameters(format!(
            "sampling fraction must be within [0, 1], got {fraction}"
        )));
    }
    Ok((fraction * population as f64).floor() as usize)
}

/// Draw `floor(fraction × population)` distinct indices in `[0, population)`
///
/// Pass a seeded rng (e.g. `StdRng::seed_from_u64`) for a reproducible draw.
pub fn sample_indices<R: Rng + ?Sized>(
    rng: &mut R,
    population: usize,
    fraction: f64,
) -> Result<BTreeSet<usize>> {
    let amount = sample_size(population, fraction)?;
    Ok(sample_count(rng, population, amount))
}

/// Draw `amount` distinct indices in `[0, population)`, capped at `population`
pub fn sample_count<R: Rng + ?Sized>(rng: &mut R, population: usize, amount: usize) -> BTreeSet<usize> {
    rand::seq::index::sample(rng, population, amount.min(population))
        .into_iter()
        .collect()
}

/// Indices of `[0, population)` not in `chosen`, ascending
pub fn complement(population: usize, chosen: &BTreeSet<usize>) -> Vec<usize> {
    (0..population).filter(|i| !chosen.contains(i)).collect()
}
