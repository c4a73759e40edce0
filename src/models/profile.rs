//! Line and continuum profile shapes.
//!
//! Each function evaluates one component at a single wavelength; composite models sum
//! them. Parameter vectors are laid out by the caller (see `models::umbrella` and
//! `lines::absorption`).

use std::f64::consts::PI;

/// Wavelength (Å) at which the two-segment continuum switches segments.
pub const CONTINUUM_SPLIT: f64 = 5600.0;

/// `amp · exp(-(x - mean)² / 2σ²)`
pub fn gaussian(x: f64, amp: f64, mean: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return 0.0;
    }
    let d = (x - mean) / sigma;
    amp * (-0.5 * d * d).exp()
}

/// Integral of [`gaussian`] over all wavelengths.
pub fn gaussian_area(amp: f64, sigma: f64) -> f64 {
    amp * (2.0 * PI * sigma * sigma).sqrt()
}

// Four-pole rational approximation of the Faddeeva function (columns A, B, C, D).
const VOIGT_A: [f64; 4] = [-1.2150, -1.3509, -1.2150, -1.3509];
const VOIGT_B: [f64; 4] = [1.2359, 0.3786, -1.2359, -0.3786];
const VOIGT_C: [f64; 4] = [-0.3085, 0.5906, -0.3085, 0.5906];
const VOIGT_D: [f64; 4] = [0.0210, -1.1858, -0.0210, 1.1858];

/// Voigt profile parameterized by the Lorentzian peak `amplitude_l` and the Lorentzian and
/// Gaussian FWHMs.
pub fn voigt(x: f64, x0: f64, amplitude_l: f64, fwhm_l: f64, fwhm_g: f64) -> f64 {
    if fwhm_g == 0.0 {
        return 0.0;
    }
    let sqrt_ln2 = std::f64::consts::LN_2.sqrt();
    let xx = (x - x0) * 2.0 * sqrt_ln2 / fwhm_g;
    let yy = fwhm_l * sqrt_ln2 / fwhm_g;

    let mut v = 0.0;
    for i in 0..4 {
        let ya = yy - VOIGT_A[i];
        let xb = xx - VOIGT_B[i];
        v += (VOIGT_C[i] * ya + VOIGT_D[i] * xb) / (ya * ya + xb * xb);
    }
    fwhm_l * amplitude_l * PI.sqrt() * sqrt_ln2 / fwhm_g * v
}

/// Integral of [`voigt`] over all wavelengths (the Lorentzian area; convolution with a
/// unit-area Gaussian preserves it).
pub fn voigt_area(amplitude_l: f64, fwhm_l: f64) -> f64 {
    amplitude_l * PI * fwhm_l / 2.0
}

/// Straight line `slope · x + intercept`.
pub fn linear(x: f64, slope: f64, intercept: f64) -> f64 {
    slope * x + intercept
}

/// Two independent straight lines joined at [`CONTINUUM_SPLIT`].
pub fn broken_linear(x: f64, slope_low: f64, intercept_low: f64, slope_high: f64, intercept_high: f64) -> f64 {
    if x < CONTINUUM_SPLIT {
        linear(x, slope_low, intercept_low)
    } else {
        linear(x, slope_high, intercept_high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, step: f64) -> f64 {
        let n = ((hi - lo) / step) as usize;
        (0..n).map(|i| f(lo + (i as f64 + 0.5) * step)).sum::<f64>() * step
    }

    #[test]
    fn gaussian_area_matches_numerical_integral() {
        let area = integrate(|x| gaussian(x, 2.0, 10.0, 1.5), -20.0, 40.0, 1e-3);
        assert!((area - gaussian_area(2.0, 1.5)).abs() < 1e-6);
    }

    #[test]
    fn voigt_area_matches_numerical_integral() {
        // Lorentzian wings decay slowly; integrate far out.
        let area = integrate(|x| voigt(x, 0.0, 1.0, 5.0, 5.0), -3000.0, 3000.0, 0.01);
        let expected = voigt_area(1.0, 5.0);
        assert!((area - expected).abs() / expected < 2e-3, "{area} vs {expected}");
    }

    #[test]
    fn voigt_is_symmetric_and_peaks_at_center() {
        let at = |x| voigt(x, 4861.0, -3.0, 4.0, 6.0);
        assert!((at(4858.0) - at(4864.0)).abs() < 1e-12);
        assert!(at(4861.0) < at(4859.0));
    }

    #[test]
    fn broken_linear_switches_at_split() {
        assert_eq!(broken_linear(5000.0, 0.0, 1.0, 0.0, 2.0), 1.0);
        assert_eq!(broken_linear(6500.0, 0.0, 1.0, 0.0, 2.0), 2.0);
    }
}
