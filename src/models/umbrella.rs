//! The joint emission-line model: six Gaussians on a two-segment linear continuum.
//!
//! Parameter layout (22 values):
//!
//! - `3i, 3i+1, 3i+2`: amplitude, center, σ of line `i` (catalog order)
//! - `18..22`: `slope_low, intercept_low, slope_high, intercept_high`
//!
//! Ties:
//!
//! - `amp([OIII]5007) = 2.98 · amp([OIII]4959)`, `amp([NII]6583) = 2.93 · amp([NII]6549)`
//! - every center follows `[OIII]4959` through a common redshift offset
//! - `σ([OIII]5007) = σ([OIII]4959)`, `σ([NII]6583) = σ([NII]6549)`

use crate::error::FitError;
use crate::lines::catalog::{EMISSION_LINES, NII_RATIO, OIII_RATIO};
use crate::models::params::{Constraint, Parameter, ParameterSet, Tie};
use crate::models::profile::{broken_linear, gaussian, gaussian_area};

pub const N_LINES: usize = 6;
pub const N_PARAMS: usize = 3 * N_LINES + 4;
const CONTINUUM_OFFSET: usize = 3 * N_LINES;

/// Rest equivalent widths (Å) used to seed line amplitudes.
const EQW_INIT: [f64; N_LINES] = [12.0, 36.0, 16.0, 4.0, 12.0, 48.0];
/// Initial line σ (Å).
pub const SIGMA_INIT: f64 = 3.5;
/// Upper bound on line σ (Å).
pub const SIGMA_MAX: f64 = 10.0;
const SIGMA_MIN: f64 = 0.1;
/// How far (Å) the reference line center may wander from its rest wavelength.
const CENTER_TOLERANCE: f64 = 20.0;

pub fn amp_index(line: usize) -> usize {
    3 * line
}

pub fn center_index(line: usize) -> usize {
    3 * line + 1
}

pub fn sigma_index(line: usize) -> usize {
    3 * line + 2
}

/// Evaluate the full model at `x`.
pub fn evaluate(x: f64, p: &[f64]) -> f64 {
    let mut y = continuum(x, p);
    for i in 0..N_LINES {
        y += gaussian(x, p[amp_index(i)], p[center_index(i)], p[sigma_index(i)]);
    }
    y
}

/// The linear continuum component alone.
pub fn continuum(x: f64, p: &[f64]) -> f64 {
    let c = &p[CONTINUUM_OFFSET..CONTINUUM_OFFSET + 4];
    broken_linear(x, c[0], c[1], c[2], c[3])
}

/// Integrated line fluxes (model units × Å), catalog order.
pub fn line_fluxes(p: &[f64]) -> [f64; N_LINES] {
    let mut out = [0.0; N_LINES];
    for (i, o) in out.iter_mut().enumerate() {
        *o = gaussian_area(p[amp_index(i)], p[sigma_index(i)]);
    }
    out
}

/// Redshift offset implied by the fitted `[OIII]4959` center.
pub fn redshift_offset(p: &[f64]) -> f64 {
    p[center_index(0)] / EMISSION_LINES[0].rest_wavelength - 1.0
}

/// Build the tied parameter set with amplitudes seeded from `continuum_guess`.
pub fn initial_parameters(continuum_guess: f64) -> Result<ParameterSet, FitError> {
    let amp_norm = (2.0 * std::f64::consts::PI * SIGMA_INIT * SIGMA_INIT).sqrt();
    let reference_rest = EMISSION_LINES[0].rest_wavelength;
    let mut params = Vec::with_capacity(N_PARAMS);

    for (i, line) in EMISSION_LINES.iter().enumerate() {
        let amp_constraint = match i {
            1 => Constraint::Tied {
                source: amp_index(0),
                tie: Tie::Scale(OIII_RATIO),
            },
            4 => Constraint::Tied {
                source: amp_index(3),
                tie: Tie::Scale(NII_RATIO),
            },
            _ => Constraint::free(),
        };
        let center_constraint = if i == 0 {
            Constraint::bounded(
                reference_rest - CENTER_TOLERANCE,
                reference_rest + CENTER_TOLERANCE,
            )
        } else {
            Constraint::Tied {
                source: center_index(0),
                tie: Tie::Redshift {
                    reference_rest,
                    rest: line.rest_wavelength,
                },
            }
        };
        let sigma_constraint = match i {
            1 => Constraint::Tied {
                source: sigma_index(0),
                tie: Tie::Equal,
            },
            4 => Constraint::Tied {
                source: sigma_index(3),
                tie: Tie::Equal,
            },
            _ => Constraint::bounded(SIGMA_MIN, SIGMA_MAX),
        };

        params.push(Parameter {
            name: format!("amplitude_{}", line.name),
            value: continuum_guess * EQW_INIT[i] / amp_norm,
            constraint: amp_constraint,
        });
        params.push(Parameter {
            name: format!("center_{}", line.name),
            value: line.rest_wavelength,
            constraint: center_constraint,
        });
        params.push(Parameter {
            name: format!("sigma_{}", line.name),
            value: SIGMA_INIT,
            constraint: sigma_constraint,
        });
    }

    for (name, value) in [
        ("slope_low", 0.0),
        ("intercept_low", continuum_guess),
        ("slope_high", 0.0),
        ("intercept_high", continuum_guess),
    ] {
        params.push(Parameter {
            name: name.to_string(),
            value,
            constraint: Constraint::free(),
        });
    }

    ParameterSet::new(params)
}

/// Start a residual fit from `fitted` line parameters with the continuum reset to zero.
pub fn residual_start(fitted: &ParameterSet) -> ParameterSet {
    let mut start = fitted.clone();
    for k in CONTINUUM_OFFSET..N_PARAMS {
        start.set_value(k, 0.0);
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_hold_in_initial_parameters() {
        let set = initial_parameters(1e6).unwrap();
        let p = set.values();
        assert_eq!(p.len(), N_PARAMS);
        assert!((p[amp_index(1)] - OIII_RATIO * p[amp_index(0)]).abs() < 1e-6);
        assert!((p[amp_index(4)] - NII_RATIO * p[amp_index(3)]).abs() < 1e-6);
        assert_eq!(p[sigma_index(1)], p[sigma_index(0)]);
        for (i, line) in EMISSION_LINES.iter().enumerate() {
            assert!((p[center_index(i)] - line.rest_wavelength).abs() < 1e-9);
        }
        // amp0, center0, sigma0, amp2, sigma2, amp3, sigma3, amp5, sigma5 + 4 continuum
        assert_eq!(set.n_free(), 13);
    }

    #[test]
    fn redshift_offset_moves_every_center() {
        let set = initial_parameters(1.0).unwrap();
        let mut free = set.free_values();
        // center of [OIII]4959 is the second free value
        free[1] = EMISSION_LINES[0].rest_wavelength * 1.001;
        let p = set.expand(&free);
        assert!((redshift_offset(&p) - 0.001).abs() < 1e-12);
        let halpha = center_index(5);
        assert!((p[halpha] - EMISSION_LINES[5].rest_wavelength * 1.001).abs() < 1e-9);
    }

    #[test]
    fn continuum_is_two_segments() {
        let mut set = initial_parameters(2.0).unwrap();
        set.set_value(CONTINUUM_OFFSET + 3, 7.0);
        let p = set.values();
        assert_eq!(continuum(5000.0, &p), 2.0);
        assert_eq!(continuum(6500.0, &p), 7.0);
    }
}
