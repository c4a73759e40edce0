//! Levenberg–Marquardt nonlinear least squares over a constrained parameter set.
//!
//! Each iteration:
//!
//! - builds a forward-difference Jacobian of the model with respect to the free values
//! - scales its columns to unit norm (Marquardt scaling)
//! - solves the damped step `[J·D⁻¹; √λ·I] δ' = [r; 0]` with the SVD solver
//! - clamps the trial point into the parameter bounds and accepts it if the sum of
//!   squared residuals drops
//!
//! Ties are resolved by [`ParameterSet::expand`] before every model evaluation, so the
//! optimizer never sees tied or fixed parameters.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::FitError;
use crate::math::solve_least_squares;
use crate::models::params::ParameterSet;

/// Stopping rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmOptions {
    pub max_iterations: usize,
    /// Relative reduction in the sum of squares below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    pub initial_lambda: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            initial_lambda: 1e-3,
        }
    }
}

/// Converged fit.
#[derive(Debug, Clone)]
pub struct LmFit {
    pub params: ParameterSet,
    pub sse: f64,
    pub iterations: usize,
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;
const DIFF_STEP: f64 = 1.49012e-8;
const GAUSS_NEWTON_LAMBDA: f64 = 1e-2;

/// Fit `model(x, full_params)` to `(x, y)` starting from `start`.
pub fn levenberg_marquardt<F>(
    model: &F,
    x: &[f64],
    y: &[f64],
    start: &ParameterSet,
    opts: &LmOptions,
) -> Result<LmFit, FitError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if x.is_empty() {
        return Err(FitError::EmptyData);
    }
    if x.len() != y.len() {
        return Err(FitError::InvalidParameters(format!(
            "x has {} points but y has {}",
            x.len(),
            y.len()
        )));
    }
    let m = start.n_free();
    if x.len() < m {
        return Err(FitError::InvalidParameters(format!(
            "{} data points cannot constrain {m} free parameters",
            x.len()
        )));
    }

    let bounds = start.free_bounds();
    let mut p = start.free_values();
    let mut r = residuals(model, x, y, &start.expand(&p));
    let mut cost = sum_sq(&r);
    if !cost.is_finite() {
        return Err(FitError::NonFinite);
    }
    if m == 0 {
        return Ok(LmFit {
            params: start.clone(),
            sse: cost,
            iterations: 0,
        });
    }

    let mut lambda = opts.initial_lambda;
    for iteration in 1..=opts.max_iterations {
        let jac = jacobian(model, x, start, &p, &bounds);
        let scale: Vec<f64> = (0..m)
            .map(|j| {
                let norm = jac.column(j).norm();
                if norm > 0.0 && norm.is_finite() { norm } else { 1.0 }
            })
            .collect();

        loop {
            let step = damped_step(&jac, &scale, &r, lambda).ok_or(FitError::Singular)?;
            let trial: Vec<f64> = p
                .iter()
                .zip(step.iter())
                .zip(bounds.iter())
                .map(|((v, d), (lo, hi))| (v + d).clamp(*lo, *hi))
                .collect();
            let r_trial = residuals(model, x, y, &start.expand(&trial));
            let cost_trial = sum_sq(&r_trial);

            if cost_trial.is_finite() && cost_trial < cost {
                let reduction = (cost - cost_trial) / cost;
                let step_norm = norm(&trial.iter().zip(p.iter()).map(|(a, b)| a - b).collect::<Vec<_>>());
                let p_norm = norm(&p);

                p = trial;
                r = r_trial;
                cost = cost_trial;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);

                // Small progress only means convergence once the step is close to Gauss-Newton.
                let near_gauss_newton = lambda <= GAUSS_NEWTON_LAMBDA;
                let small_step = step_norm <= opts.xtol * (p_norm + opts.xtol);
                if cost == 0.0 || (near_gauss_newton && (reduction < opts.ftol || small_step)) {
                    return Ok(finish(start, &p, cost, iteration));
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No downhill step exists at any damping: a stationary point.
                debug!(iteration, cost, "damping saturated; accepting current point");
                return Ok(finish(start, &p, cost, iteration));
            }
        }
    }

    Err(FitError::NotConverged {
        iterations: opts.max_iterations,
    })
}

/// Fit once; on failure retry from a start with every free value moved by 10%.
pub fn fit_with_retry<F>(
    model: &F,
    x: &[f64],
    y: &[f64],
    start: &ParameterSet,
    opts: &LmOptions,
) -> Result<LmFit, FitError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    match levenberg_marquardt(model, x, y, start, opts) {
        Ok(fit) => Ok(fit),
        Err(err @ (FitError::EmptyData | FitError::InvalidParameters(_))) => Err(err),
        Err(err) => {
            debug!(error = %err, "fit failed; retrying from a perturbed start");
            let perturbed = perturb(start, 0.1);
            levenberg_marquardt(model, x, y, &perturbed, opts)
        }
    }
}

/// Multiply every free value by `1 + frac` (zeros move to `frac`), then clamp into bounds.
pub fn perturb(start: &ParameterSet, frac: f64) -> ParameterSet {
    let moved: Vec<f64> = start
        .free_values()
        .iter()
        .zip(start.free_bounds())
        .map(|(&v, (lo, hi))| {
            let v = if v == 0.0 { frac } else { v * (1.0 + frac) };
            v.clamp(lo, hi)
        })
        .collect();
    let mut out = start.clone();
    out.set_free_values(&moved);
    out
}

fn finish(start: &ParameterSet, p: &[f64], cost: f64, iterations: usize) -> LmFit {
    let mut params = start.clone();
    params.set_free_values(p);
    LmFit {
        params,
        sse: cost,
        iterations,
    }
}

fn residuals<F>(model: &F, x: &[f64], y: &[f64], full: &[f64]) -> Vec<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    x.iter().zip(y.iter()).map(|(&xi, &yi)| yi - model(xi, full)).collect()
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|r| r * r).sum()
}

fn norm(v: &[f64]) -> f64 {
    sum_sq(v).sqrt()
}

fn jacobian<F>(model: &F, x: &[f64], set: &ParameterSet, p: &[f64], bounds: &[(f64, f64)]) -> DMatrix<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let m = p.len();
    let base = set.expand(p);
    let f0: Vec<f64> = x.iter().map(|&xi| model(xi, &base)).collect();

    let mut jac = DMatrix::<f64>::zeros(n, m);
    let mut shifted = p.to_vec();
    for j in 0..m {
        let mut h = DIFF_STEP * p[j].abs().max(1.0);
        if p[j] + h > bounds[j].1 {
            h = -h;
        }
        shifted[j] = p[j] + h;
        let full = set.expand(&shifted);
        for i in 0..n {
            jac[(i, j)] = (model(x[i], &full) - f0[i]) / h;
        }
        shifted[j] = p[j];
    }
    jac
}

fn damped_step(jac: &DMatrix<f64>, scale: &[f64], r: &[f64], lambda: f64) -> Option<Vec<f64>> {
    let n = jac.nrows();
    let m = jac.ncols();
    let damping = lambda.sqrt();

    let mut a = DMatrix::<f64>::zeros(n + m, m);
    let mut b = DVector::<f64>::zeros(n + m);
    for j in 0..m {
        for i in 0..n {
            a[(i, j)] = jac[(i, j)] / scale[j];
        }
        a[(n + j, j)] = damping;
    }
    for i in 0..n {
        b[i] = r[i];
    }

    let scaled = solve_least_squares(&a, &b)?;
    Some(scaled.iter().zip(scale.iter()).map(|(d, s)| d / s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::params::{Constraint, Parameter};
    use crate::models::profile::gaussian;

    fn gauss_plus_line(x: f64, p: &[f64]) -> f64 {
        gaussian(x, p[0], p[1], p[2]) + p[3] * (x - 5000.0) + p[4]
    }

    fn start(values: [f64; 5]) -> ParameterSet {
        let names = ["amp", "mean", "sigma", "slope", "intercept"];
        ParameterSet::new(
            names
                .iter()
                .zip(values)
                .map(|(name, value)| Parameter {
                    name: name.to_string(),
                    value,
                    constraint: if *name == "sigma" {
                        Constraint::bounded(0.1, 10.0)
                    } else {
                        Constraint::free()
                    },
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn recovers_noise_free_gaussian_on_a_line() {
        let truth = [3.0e6, 5007.0, 2.5, 40.0, 1.0e7];
        let x: Vec<f64> = (0..400).map(|i| 4900.0 + 0.5 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| gauss_plus_line(xi, &truth)).collect();

        let fit = levenberg_marquardt(
            &gauss_plus_line,
            &x,
            &y,
            &start([1.0e6, 5005.0, 3.5, 0.0, 9.0e6]),
            &LmOptions::default(),
        )
        .unwrap();

        let p = fit.params.values();
        assert!((p[0] - truth[0]).abs() / truth[0] < 1e-4, "amp {}", p[0]);
        assert!((p[1] - truth[1]).abs() < 1e-4, "mean {}", p[1]);
        assert!((p[2] - truth[2]).abs() < 1e-4, "sigma {}", p[2]);
        assert!((p[4] - truth[4]).abs() / truth[4] < 1e-6);
    }

    #[test]
    fn bounds_are_respected() {
        // Data wants sigma = 20 but the bound is 10.
        let truth = [1.0, 5000.0, 20.0, 0.0, 0.0];
        let x: Vec<f64> = (0..200).map(|i| 4900.0 + i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| gauss_plus_line(xi, &truth)).collect();
        let fit = fit_with_retry(
            &gauss_plus_line,
            &x,
            &y,
            &start([1.0, 5000.0, 5.0, 0.0, 0.0]),
            &LmOptions::default(),
        )
        .unwrap();
        assert!(fit.params.values()[2] <= 10.0);
    }

    #[test]
    fn empty_data_is_an_error() {
        let err = levenberg_marquardt(
            &gauss_plus_line,
            &[],
            &[],
            &start([1.0, 0.0, 1.0, 0.0, 0.0]),
            &LmOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, FitError::EmptyData);
    }

    #[test]
    fn perturb_moves_free_values_by_ten_percent() {
        let s = start([2.0, 5000.0, 3.0, 0.0, 1.0]);
        let p = perturb(&s, 0.1).free_values();
        assert!((p[0] - 2.2).abs() < 1e-12);
        assert!((p[3] - 0.1).abs() < 1e-12);
    }
}
