//! Per-pixel noise from continuum-subtracted residuals.
//!
//! Pixels near known emission lines are masked; the rest is treated as pure noise. A
//! zero-mean Gaussian is fit to the density histogram of those residuals and its width is
//! the noise estimate.

use crate::error::FitError;
use crate::fit::{LmOptions, fit_with_retry};
use crate::lines::catalog::{EMISSION_LINES, LINE_MASK_HALF_WIDTH};
use crate::math::{bin_centers, histogram_density, select, std_dev};
use crate::models::params::{Constraint, Parameter, ParameterSet};
use crate::models::profile::gaussian;

pub const HISTOGRAM_BINS: usize = 10;
/// The Gaussian width may not exceed this fraction of the largest |bin edge|.
const WIDTH_LIMIT_FRACTION: f64 = 0.6;

/// `false` within ±30 Å of any umbrella-model line.
pub fn line_free_mask(wave: &[f64]) -> Vec<bool> {
    wave.iter()
        .map(|&w| {
            EMISSION_LINES
                .iter()
                .all(|l| !(w > l.rest_wavelength - LINE_MASK_HALF_WIDTH && w < l.rest_wavelength + LINE_MASK_HALF_WIDTH))
        })
        .collect()
}

/// Noise estimate (σ of the fitted zero-mean Gaussian) for `residual` on `wave`.
pub fn estimate_noise(wave: &[f64], residual: &[f64], opts: &LmOptions) -> Result<f64, FitError> {
    let values = select(residual, &line_free_mask(wave));
    if values.len() < HISTOGRAM_BINS {
        return Err(FitError::EmptyData);
    }
    let (density, edges) = histogram_density(&values, HISTOGRAM_BINS).ok_or(FitError::EmptyData)?;
    let centers = bin_centers(&edges);

    let width_limit = WIDTH_LIMIT_FRACTION * edges.iter().fold(0.0_f64, |m, e| m.max(e.abs()));
    let sigma0 = std_dev(&values).unwrap_or(width_limit).min(width_limit).max(width_limit * 1e-3);
    let peak = density.iter().copied().fold(0.0_f64, f64::max);

    let start = ParameterSet::new(vec![
        Parameter {
            name: "amplitude".into(),
            value: peak,
            constraint: Constraint::free(),
        },
        Parameter {
            name: "mean".into(),
            value: 0.0,
            constraint: Constraint::Fixed,
        },
        Parameter {
            name: "stddev".into(),
            value: sigma0,
            constraint: Constraint::bounded(f64::NEG_INFINITY, width_limit),
        },
    ])?;

    let model = |x: f64, p: &[f64]| gaussian(x, p[0], p[1], p[2]);
    let fit = fit_with_retry(&model, &centers, &density, &start, opts)?;
    let sigma = fit.params.value(2).abs();
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(FitError::NonFinite);
    }
    Ok(sigma)
}

/// The adopted noise is the smallest per-model estimate.
pub fn adopted_noise(estimates: &[f64]) -> Option<f64> {
    estimates
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{add_gaussian_noise, realization_rng};

    #[test]
    fn recovers_gaussian_noise_level() {
        let wave: Vec<f64> = (0..4000).map(|i| 4700.0 + 0.1 * i as f64).collect();
        let mut rng = realization_rng(11, "noise", 0);
        let resid = add_gaussian_noise(&vec![0.0; wave.len()], 3.0e4, &mut rng).unwrap();
        let sigma = estimate_noise(&wave, &resid, &LmOptions::default()).unwrap();
        assert!((sigma - 3.0e4).abs() / 3.0e4 < 0.15, "sigma = {sigma}");
    }

    #[test]
    fn lines_are_masked() {
        let mask = line_free_mask(&[4700.0, 4861.0, 5000.0, 6563.0, 6700.0]);
        assert_eq!(mask, vec![true, false, false, false, true]);
    }

    #[test]
    fn adopted_noise_is_minimum() {
        assert_eq!(adopted_noise(&[3.0, 2.0, f64::NAN]), Some(2.0));
        assert_eq!(adopted_noise(&[]), None);
    }
}
