//! Parametric bootstrap: refit many noisy realizations of the same data.
//!
//! Realizations are independent, so they run on the rayon pool. Each one draws from its
//! own `StdRng` seeded by mixing `(seed, stream, index)` with SplitMix64, which keeps
//! results identical regardless of thread count, scheduling or toolchain version.

use rand::SeedableRng;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::debug;

use crate::error::FitError;

/// Realization count and base seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub nboot: usize,
    pub seed: u64,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self { nboot: 100, seed: 42 }
    }
}

/// Successful realizations plus how many failed.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome<T> {
    pub samples: Vec<T>,
    pub failures: usize,
}

impl<T> BootstrapOutcome<T> {
    pub fn attempted(&self) -> usize {
        self.samples.len() + self.failures
    }

    /// At least half of the realizations converged.
    pub fn is_usable(&self) -> bool {
        !self.samples.is_empty() && 2 * self.failures <= self.attempted()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed of realization `index` of stream `stream`. Fixed arithmetic, stable across builds.
pub fn realization_seed(seed: u64, stream: &str, index: usize) -> u64 {
    let stream_hash = stream
        .bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
    splitmix64(splitmix64(seed ^ stream_hash) ^ index as u64)
}

/// Deterministic RNG for realization `index` of stream `stream`.
pub fn realization_rng(seed: u64, stream: &str, index: usize) -> StdRng {
    StdRng::seed_from_u64(realization_seed(seed, stream, index))
}

/// `values + noise · N(0, 1)` per element.
pub fn add_gaussian_noise(values: &[f64], noise: f64, rng: &mut StdRng) -> Result<Vec<f64>, FitError> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| FitError::InvalidParameters(format!("noise distribution error: {e}")))?;
    Ok(values.iter().map(|v| v + noise * normal.sample(rng)).collect())
}

/// Run `fit_one` on `opts.nboot` noisy copies of `data`.
///
/// Failed realizations are counted and dropped.
pub fn bootstrap<T, F>(
    data: &[f64],
    noise: f64,
    stream: &str,
    opts: &BootstrapOptions,
    fit_one: F,
) -> Result<BootstrapOutcome<T>, FitError>
where
    T: Send,
    F: Fn(&[f64]) -> Result<T, FitError> + Sync,
{
    if !(noise.is_finite() && noise >= 0.0) {
        return Err(FitError::InvalidParameters(format!(
            "bootstrap noise must be finite and non-negative, got {noise}"
        )));
    }

    let results: Vec<Result<T, FitError>> = (0..opts.nboot)
        .into_par_iter()
        .map(|i| {
            let mut rng = realization_rng(opts.seed, stream, i);
            let noisy = add_gaussian_noise(data, noise, &mut rng)?;
            fit_one(&noisy)
        })
        .collect();

    let mut samples = Vec::with_capacity(results.len());
    let mut failures = 0;
    for r in results {
        match r {
            Ok(v) => samples.push(v),
            Err(err) => {
                debug!(stream, error = %err, "bootstrap realization failed");
                failures += 1;
            }
        }
    }
    Ok(BootstrapOutcome { samples, failures })
}
