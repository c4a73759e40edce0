//! Linear least squares solver.
//!
//! Every Levenberg–Marquardt step reduces to a small linear problem of the form:
//!
//! ```text
//! minimize ‖A δ - b‖²
//! ```
//!
//! where `A` is either the column-scaled Jacobian stacked on `√λ·I` (the damped step) or
//! a plain design matrix (continuum initial guesses). Parameter counts are tiny (≤ 16
//! columns), so SVD is cheap and both shapes go through the same code path.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = x.clone().svd(true, true);

    // Line amplitudes (~1e7 L_sun/Å) and widths (~3 Å) share one normal matrix, so the
    // tolerance is relative to the largest singular value.
    let smax = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    if !(smax.is_finite() && smax > 0.0) {
        return None;
    }

    for &rel in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, rel * smax) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = slope * x + intercept` by ordinary least squares.
///
/// Used to seed linear continuum parameters before nonlinear fitting.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mut design = DMatrix::<f64>::zeros(n, 2);
    let mut rhs = DVector::<f64>::zeros(n);
    for i in 0..n {
        design[(i, 0)] = x[i];
        design[(i, 1)] = 1.0;
        rhs[i] = y[i];
    }
    let beta = solve_least_squares(&design, &rhs)?;
    Some((beta[0], beta[1]))
}
