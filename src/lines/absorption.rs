//! Balmer absorption-line measurement.
//!
//! Each line in [`ABSORPTION_LINES`] is fit inside its window with an absorption profile on
//! a straight continuum `c0 + c1 · (λ - center)`. Model spectra use a Voigt profile;
//! observed spectra use a Gaussian.

use serde::{Deserialize, Serialize};

use crate::domain::LineStatus;
use crate::error::FitError;
use crate::fit::{LmOptions, fit_with_retry};
use crate::lines::catalog::{ABSORPTION_LINES, AbsorptionLine};
use crate::math::{fit_line, select, window_mask};
use crate::models::params::{Constraint, Parameter, ParameterSet};
use crate::models::profile::{gaussian, gaussian_area, voigt, voigt_area};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsorptionProfile {
    Voigt,
    Gaussian,
}

/// One absorption-line measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionMeasurement {
    pub name: String,
    /// Absorbed flux (spectrum units × Å), positive for absorption.
    pub flux: f64,
    /// Rest equivalent width (Å): `flux / continuum(lam)`.
    pub eqw: f64,
    /// Fitted line center (Å).
    pub lam: f64,
    pub status: LineStatus,
}

impl AbsorptionMeasurement {
    fn failed(line: &AbsorptionLine) -> Self {
        Self {
            name: line.name.to_string(),
            flux: f64::NAN,
            eqw: f64::NAN,
            lam: line.center,
            status: LineStatus::FitFailed,
        }
    }

    /// Continuum level at the line, `flux / eqw`.
    pub fn continuum(&self) -> Option<f64> {
        let c = self.flux / self.eqw;
        (self.status == LineStatus::Ok && c.is_finite() && c != 0.0).then_some(c)
    }
}

const CENTER_TOLERANCE: f64 = 15.0;
const WIDTH_MIN: f64 = 0.1;
const WIDTH_MAX: f64 = 50.0;
/// Fraction of the window at each end treated as continuum for the initial guess.
const SIDEBAND_FRACTION: f64 = 0.15;

/// Measure every line in [`ABSORPTION_LINES`] on `(wave, flux)`.
///
/// A line whose fit fails is returned with `LineStatus::FitFailed`.
pub fn measure_abslines(
    wave: &[f64],
    flux: &[f64],
    profile: AbsorptionProfile,
    opts: &LmOptions,
) -> Vec<AbsorptionMeasurement> {
    ABSORPTION_LINES
        .iter()
        .map(|line| match measure_line(wave, flux, line, profile, opts) {
            Ok(m) => m,
            Err(err) => {
                tracing::debug!(line = line.name, error = %err, "absorption fit failed");
                AbsorptionMeasurement::failed(line)
            }
        })
        .collect()
}

/// Fit a single absorption line.
pub fn measure_line(
    wave: &[f64],
    flux: &[f64],
    line: &AbsorptionLine,
    profile: AbsorptionProfile,
    opts: &LmOptions,
) -> Result<AbsorptionMeasurement, FitError> {
    let mask = window_mask(wave, line.window.0, line.window.1);
    let x = select(wave, &mask);
    let y = select(flux, &mask);
    if x.len() < 8 {
        return Err(FitError::EmptyData);
    }

    let (c0, c1) = continuum_guess(&x, &y, line.center)?;
    let min_in_window = y.iter().copied().fold(f64::INFINITY, f64::min);
    let depth = (min_in_window - c0).min(0.0);

    let center = line.center;
    let start = ParameterSet::new(vec![
        Parameter {
            name: "amplitude".into(),
            value: if depth < 0.0 { depth } else { -1e-3 * c0.abs().max(1.0) },
            constraint: Constraint::free(),
        },
        Parameter {
            name: "center".into(),
            value: center,
            constraint: Constraint::bounded(center - CENTER_TOLERANCE, center + CENTER_TOLERANCE),
        },
        Parameter {
            name: "width_a".into(),
            value: match profile {
                AbsorptionProfile::Voigt => 5.0,
                AbsorptionProfile::Gaussian => 3.0,
            },
            constraint: Constraint::bounded(WIDTH_MIN, WIDTH_MAX),
        },
        Parameter {
            name: "width_b".into(),
            value: 5.0,
            constraint: match profile {
                AbsorptionProfile::Voigt => Constraint::bounded(WIDTH_MIN, WIDTH_MAX),
                AbsorptionProfile::Gaussian => Constraint::Fixed,
            },
        },
        Parameter {
            name: "continuum".into(),
            value: c0,
            constraint: Constraint::free(),
        },
        Parameter {
            name: "continuum_slope".into(),
            value: c1,
            constraint: Constraint::free(),
        },
    ])?;

    let model = |xi: f64, p: &[f64]| -> f64 {
        let cont = p[4] + p[5] * (xi - center);
        match profile {
            AbsorptionProfile::Voigt => cont + voigt(xi, p[1], p[0], p[2], p[3]),
            AbsorptionProfile::Gaussian => cont + gaussian(xi, p[0], p[1], p[2]),
        }
    };

    let fit = fit_with_retry(&model, &x, &y, &start, opts)?;
    let p = fit.params.values();

    let area = match profile {
        AbsorptionProfile::Voigt => voigt_area(p[0], p[2]),
        AbsorptionProfile::Gaussian => gaussian_area(p[0], p[2]),
    };
    let lam = p[1];
    let cont_at_line = p[4] + p[5] * (lam - center);
    let absorbed = -area;
    let eqw = absorbed / cont_at_line;
    if !(absorbed.is_finite() && eqw.is_finite()) {
        return Err(FitError::NonFinite);
    }

    Ok(AbsorptionMeasurement {
        name: line.name.to_string(),
        flux: absorbed,
        eqw,
        lam,
        status: LineStatus::Ok,
    })
}

/// `(level at center, slope)` from a straight-line fit to both window ends.
fn continuum_guess(x: &[f64], y: &[f64], center: f64) -> Result<(f64, f64), FitError> {
    let n = x.len();
    let k = ((n as f64 * SIDEBAND_FRACTION).ceil() as usize).max(2).min(n / 2);
    let xs: Vec<f64> = x[..k].iter().chain(x[n - k..].iter()).map(|v| v - center).collect();
    let ys: Vec<f64> = y[..k].iter().chain(y[n - k..].iter()).copied().collect();
    let (slope, intercept) = fit_line(&xs, &ys).ok_or(FitError::Singular)?;
    Ok((intercept, slope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::catalog::ABS_HDELTA;

    fn synthetic(profile: AbsorptionProfile) -> (Vec<f64>, Vec<f64>, f64) {
        let line = ABSORPTION_LINES[ABS_HDELTA];
        let wave: Vec<f64> = (0..400).map(|i| 4000.0 + 0.5 * i as f64).collect();
        let cont = |x: f64| 1.0e6 + 50.0 * (x - line.center);
        let flux: Vec<f64> = wave
            .iter()
            .map(|&x| match profile {
                AbsorptionProfile::Gaussian => cont(x) + gaussian(x, -2.0e5, line.center + 1.0, 4.0),
                AbsorptionProfile::Voigt => cont(x) + voigt(x, line.center + 1.0, -1.5e5, 3.0, 4.0),
            })
            .collect();
        let expected_flux = match profile {
            AbsorptionProfile::Gaussian => -gaussian_area(-2.0e5, 4.0),
            AbsorptionProfile::Voigt => -voigt_area(-1.5e5, 3.0),
        };
        (wave, flux, expected_flux)
    }

    #[test]
    fn gaussian_absorption_is_recovered() {
        let (wave, flux, expected) = synthetic(AbsorptionProfile::Gaussian);
        let m = measure_line(
            &wave,
            &flux,
            &ABSORPTION_LINES[ABS_HDELTA],
            AbsorptionProfile::Gaussian,
            &LmOptions::default(),
        )
        .unwrap();
        assert_eq!(m.status, LineStatus::Ok);
        assert!((m.flux - expected).abs() / expected < 1e-3, "{} vs {expected}", m.flux);
        assert!((m.lam - (ABSORPTION_LINES[ABS_HDELTA].center + 1.0)).abs() < 1e-2);
        let cont = m.continuum().unwrap();
        assert!((cont - (1.0e6 + 50.0)).abs() / 1.0e6 < 1e-3);
        assert!(m.eqw > 0.0);
    }

    #[test]
    fn voigt_absorption_is_recovered() {
        let (wave, flux, expected) = synthetic(AbsorptionProfile::Voigt);
        let m = measure_line(
            &wave,
            &flux,
            &ABSORPTION_LINES[ABS_HDELTA],
            AbsorptionProfile::Voigt,
            &LmOptions::default(),
        )
        .unwrap();
        // The fitted Lorentzian area extrapolates wings beyond the window.
        assert!((m.flux - expected).abs() / expected < 0.05, "{} vs {expected}", m.flux);
    }

    #[test]
    fn lines_outside_coverage_fail_without_aborting() {
        let (wave, flux, _) = synthetic(AbsorptionProfile::Gaussian);
        let all = measure_abslines(&wave, &flux, AbsorptionProfile::Gaussian, &LmOptions::default());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].status, LineStatus::FitFailed);
        assert_eq!(all[ABS_HDELTA].status, LineStatus::Ok);
    }
}
