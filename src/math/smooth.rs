//! Velocity-space Gaussian smoothing of spectra.
//!
//! A dispersion `σ_v` (km/s) corresponds to a wavelength-dependent Gaussian width
//! `σ_λ = λ · σ_v / c`. Grids may be irregular (stellar population grids change
//! resolution across the optical), so the kernel is evaluated directly on the
//! neighboring pixels and weighted by each pixel's width rather than by convolving
//! on a resampled log-λ grid.

use crate::math::constants::C_KMS;

/// Number of kernel widths included on each side of a pixel.
const KERNEL_HALF_WIDTH: f64 = 5.0;

/// Smooth `flux` on `wave` to a velocity dispersion of `sigma_kms`.
///
/// Only pixels with `min_lam <= λ <= max_lam` are smoothed; others are copied through.
/// A constant spectrum is returned unchanged.
pub fn smooth_velocity(wave: &[f64], flux: &[f64], sigma_kms: f64, min_lam: f64, max_lam: f64) -> Vec<f64> {
    let n = wave.len().min(flux.len());
    let mut out: Vec<f64> = flux[..n].to_vec();
    if n < 2 || !(sigma_kms.is_finite() && sigma_kms > 0.0) {
        return out;
    }

    let widths = pixel_widths(&wave[..n]);
    let frac = sigma_kms / C_KMS;

    for i in 0..n {
        let lam = wave[i];
        if lam < min_lam || lam > max_lam {
            continue;
        }
        let sigma = lam * frac;
        if !(sigma > 0.0) {
            continue;
        }
        let reach = KERNEL_HALF_WIDTH * sigma;
        let start = wave[..n].partition_point(|&w| w < lam - reach);
        let end = wave[..n].partition_point(|&w| w <= lam + reach);

        let mut num = 0.0;
        let mut den = 0.0;
        for j in start..end {
            let d = (wave[j] - lam) / sigma;
            let k = (-0.5 * d * d).exp() * widths[j];
            num += k * flux[j];
            den += k;
        }
        if den > 0.0 && num.is_finite() {
            out[i] = num / den;
        }
    }

    out
}

/// Smooth across the whole grid.
pub fn smooth_velocity_all(wave: &[f64], flux: &[f64], sigma_kms: f64) -> Vec<f64> {
    smooth_velocity(wave, flux, sigma_kms, f64::NEG_INFINITY, f64::INFINITY)
}

fn pixel_widths(wave: &[f64]) -> Vec<f64> {
    let n = wave.len();
    (0..n)
        .map(|i| {
            let lo = if i == 0 { wave[0] } else { 0.5 * (wave[i - 1] + wave[i]) };
            let hi = if i + 1 == n { wave[n - 1] } else { 0.5 * (wave[i] + wave[i + 1]) };
            let w = hi - lo;
            if w > 0.0 { w } else { 1e-12 }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(lo: f64, hi: f64, step: f64) -> Vec<f64> {
        let n = ((hi - lo) / step).round() as usize + 1;
        (0..n).map(|i| lo + step * i as f64).collect()
    }

    #[test]
    fn constant_spectrum_is_unchanged() {
        let wave = grid(6000.0, 7000.0, 1.0);
        let flux = vec![3.0e7; wave.len()];
        let out = smooth_velocity_all(&wave, &flux, 200.0);
        for v in out {
            assert!((v - 3.0e7).abs() / 3.0e7 < 1e-12);
        }
    }

    #[test]
    fn smoothing_broadens_but_conserves_line_flux() {
        let wave = grid(6400.0, 6700.0, 0.5);
        let flux: Vec<f64> = wave
            .iter()
            .map(|&w| {
                let d = (w - 6563.0) / 2.0;
                1e6 * (-0.5 * d * d).exp()
            })
            .collect();
        let out = smooth_velocity_all(&wave, &flux, 150.0);

        let peak_in = flux.iter().copied().fold(0.0, f64::max);
        let peak_out = out.iter().copied().fold(0.0, f64::max);
        assert!(peak_out < peak_in, "smoothing should lower the peak");

        let total_in: f64 = flux.iter().sum::<f64>() * 0.5;
        let total_out: f64 = out.iter().sum::<f64>() * 0.5;
        assert!((total_out - total_in).abs() / total_in < 0.01);
    }

    #[test]
    fn pixels_outside_range_are_copied() {
        let wave = grid(1000.0, 2000.0, 10.0);
        let flux: Vec<f64> = wave.iter().map(|w| w * 2.0).collect();
        let out = smooth_velocity(&wave, &flux, 300.0, 3e3, 3e8);
        assert_eq!(out, flux);
    }

    #[test]
    fn zero_dispersion_is_identity() {
        let wave = grid(4000.0, 4010.0, 1.0);
        let flux: Vec<f64> = (0..wave.len()).map(|i| i as f64).collect();
        assert_eq!(smooth_velocity_all(&wave, &flux, 0.0), flux);
    }
}
