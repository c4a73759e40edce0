//! The narrow 4000 Å break index.

use crate::math::{mean, select, window_mask};

/// Blue continuum window (Å).
pub const DN4000_BLUE: (f64, f64) = (3850.0, 3950.0);
/// Red continuum window (Å).
pub const DN4000_RED: (f64, f64) = (4000.0, 4100.0);

/// Mean flux density in the red window over the mean in the blue window.
///
/// `None` if either window holds no pixels or the blue mean is zero.
pub fn measure_dn4000(wave: &[f64], flux: &[f64]) -> Option<f64> {
    let blue = mean(&select(flux, &window_mask(wave, DN4000_BLUE.0, DN4000_BLUE.1)))?;
    let red = mean(&select(flux, &window_mask(wave, DN4000_RED.0, DN4000_RED.1)))?;
    if blue == 0.0 {
        return None;
    }
    let d = red / blue;
    d.is_finite().then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_spectrum_has_unit_break() {
        let wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let flux = vec![3.7e5; wave.len()];
        assert_eq!(measure_dn4000(&wave, &flux), Some(1.0));
    }

    #[test]
    fn step_spectrum_gives_step_ratio() {
        let wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let flux: Vec<f64> = wave.iter().map(|&w| if w < 3975.0 { 1.0 } else { 1.8 }).collect();
        let d = measure_dn4000(&wave, &flux).unwrap();
        assert!((d - 1.8).abs() < 1e-12);
    }

    #[test]
    fn missing_coverage_is_none() {
        let wave: Vec<f64> = (0..100).map(|i| 6000.0 + i as f64).collect();
        assert_eq!(measure_dn4000(&wave, &vec![1.0; 100]), None);
    }
}
