//! Sampler parameters ↔ stellar mass formed per age bin.
//!
//! Two parameterizations are supported:
//!
//! - **SFR ratios**: `N-1` values `log10(SFR_i / SFR_{i+1})` between adjacent bins
//!   plus a total mass.
//! - **Stick-breaking fractions**: `N-1` values `z_i ∈ [0, 1]` mapped onto `N` SFR
//!   fractions summing to one (a Dirichlet prior when the `z_i` are Beta-distributed).
//!
//! Both map to masses that sum to `10^total_log_mass` and are non-negative.

use crate::error::SfhError;
use crate::sfh::agebins::AgeBins;

/// Log SFR ratios are clipped to `[-LOGSFR_RATIO_CLIP, LOGSFR_RATIO_CLIP]`.
pub const LOGSFR_RATIO_CLIP: f64 = 10.0;

/// Mass formed in each bin from a total mass and adjacent-bin SFR ratios.
///
/// ```text
/// coeff_0 = 1
/// coeff_i = coeff_{i-1} / 10^{r_{i-1}} · dt_i / dt_{i-1}
/// mass_i  = 10^M · coeff_i / Σ coeff
/// ```
pub fn ratios_to_masses(
    total_log_mass: f64,
    logsfr_ratios: &[f64],
    agebins: &AgeBins,
) -> Result<Vec<f64>, SfhError> {
    let nbins = agebins.len();
    if logsfr_ratios.len() + 1 != nbins {
        return Err(SfhError::LengthMismatch {
            what: "SFR ratios",
            expected: nbins.saturating_sub(1),
            actual: logsfr_ratios.len(),
        });
    }
    if !total_log_mass.is_finite() {
        return Err(SfhError::InvalidSample(format!(
            "non-finite total log mass {total_log_mass}"
        )));
    }
    if let Some(bad) = logsfr_ratios.iter().find(|r| r.is_nan()) {
        return Err(SfhError::InvalidSample(format!("SFR ratio is {bad}")));
    }

    let dt = agebins.widths();
    let mut coeffs = Vec::with_capacity(nbins);
    coeffs.push(1.0);
    for i in 1..nbins {
        let r = logsfr_ratios[i - 1].clamp(-LOGSFR_RATIO_CLIP, LOGSFR_RATIO_CLIP);
        let sratio = 10f64.powf(r);
        let prev = coeffs[i - 1];
        coeffs.push(prev / sratio * (dt[i] / dt[i - 1]));
    }

    let total: f64 = coeffs.iter().sum();
    if !(total.is_finite() && total > 0.0) || coeffs.iter().any(|c| !c.is_finite()) {
        return Err(SfhError::InvalidSample(
            "SFR ratios produce non-finite bin coefficients".into(),
        ));
    }

    let m0 = 10f64.powf(total_log_mass) / total;
    let masses: Vec<f64> = coeffs.iter().map(|c| m0 * c).collect();
    if masses.iter().any(|m| !m.is_finite()) {
        return Err(SfhError::InvalidSample("bin masses overflow".into()));
    }
    Ok(masses)
}

/// Stick-breaking: `N-1` fractions in `[0, 1]` → `N` SFR fractions summing to one.
///
/// The final fraction is `max(0, 1 - Σ others)` so rounding cannot make it negative.
pub fn zfrac_to_sfrac(z_fraction: &[f64]) -> Result<Vec<f64>, SfhError> {
    validate_zfrac(z_fraction)?;
    let n = z_fraction.len();
    let mut sfr_fraction = vec![0.0; n + 1];
    if n == 0 {
        sfr_fraction[0] = 1.0;
        return Ok(sfr_fraction);
    }

    sfr_fraction[0] = 1.0 - z_fraction[0];
    let mut prod = z_fraction[0];
    for i in 1..n {
        sfr_fraction[i] = prod * (1.0 - z_fraction[i]);
        prod *= z_fraction[i];
    }
    let head: f64 = sfr_fraction[..n].iter().sum();
    sfr_fraction[n] = (1.0 - head).max(0.0);

    Ok(sfr_fraction)
}

/// Stick-breaking fractions → mass formed per bin.
///
/// SFR fractions are weighted by bin width, renormalized, and scaled by `10^M`.
pub fn zfrac_to_masses(
    total_log_mass: f64,
    z_fraction: &[f64],
    agebins: &AgeBins,
) -> Result<Vec<f64>, SfhError> {
    let nbins = agebins.len();
    if z_fraction.len() + 1 != nbins {
        return Err(SfhError::LengthMismatch {
            what: "stick-breaking fractions",
            expected: nbins.saturating_sub(1),
            actual: z_fraction.len(),
        });
    }
    if !total_log_mass.is_finite() {
        return Err(SfhError::InvalidSample(format!(
            "non-finite total log mass {total_log_mass}"
        )));
    }

    let sfr_fraction = zfrac_to_sfrac(z_fraction)?;
    let weighted: Vec<f64> = sfr_fraction
        .iter()
        .zip(agebins.widths())
        .map(|(f, dt)| f * dt)
        .collect();
    let norm: f64 = weighted.iter().sum();
    if !(norm.is_finite() && norm > 0.0) {
        return Err(SfhError::InvalidSample(
            "stick-breaking fractions give zero total star formation".into(),
        ));
    }

    let total = 10f64.powf(total_log_mass);
    Ok(weighted.iter().map(|w| total * w / norm).collect())
}

/// Inverse of [`zfrac_to_masses`]: returns `(total_mass, z_fraction)`.
///
/// ```text
/// z_0 = 1 - f_0
/// z_i = 1 - f_i / Π_{j<i} z_j
/// ```
///
/// where `f` are the SFR fractions implied by `mass / dt`. Once the stick is used up
/// (`Π z_j == 0`) the remaining fractions are zero.
pub fn masses_to_zfrac(masses: &[f64], agebins: &AgeBins) -> Result<(f64, Vec<f64>), SfhError> {
    let nbins = agebins.len();
    if masses.len() != nbins {
        return Err(SfhError::LengthMismatch {
            what: "bin masses",
            expected: nbins,
            actual: masses.len(),
        });
    }
    if let Some(bad) = masses.iter().find(|m| !(m.is_finite() && **m >= 0.0)) {
        return Err(SfhError::InvalidInput(format!(
            "bin masses must be finite and non-negative, got {bad}"
        )));
    }
    let total_mass: f64 = masses.iter().sum();
    if !(total_mass > 0.0) {
        return Err(SfhError::InvalidInput("total bin mass is zero".into()));
    }

    let mut sfr_fraction: Vec<f64> = masses
        .iter()
        .zip(agebins.widths())
        .map(|(m, dt)| m / dt)
        .collect();
    let norm: f64 = sfr_fraction.iter().sum();
    for f in sfr_fraction.iter_mut() {
        *f /= norm;
    }

    let n = nbins - 1;
    let mut z_fraction = vec![0.0; n];
    if n == 0 {
        return Ok((total_mass, z_fraction));
    }
    z_fraction[0] = 1.0 - sfr_fraction[0];
    let mut prod = z_fraction[0];
    for i in 1..n {
        z_fraction[i] = if prod > 0.0 {
            (1.0 - sfr_fraction[i] / prod).clamp(0.0, 1.0)
        } else {
            0.0
        };
        prod *= z_fraction[i];
    }

    Ok((total_mass, z_fraction))
}

fn validate_zfrac(z_fraction: &[f64]) -> Result<(), SfhError> {
    if let Some(bad) = z_fraction
        .iter()
        .find(|z| !(z.is_finite() && (0.0..=1.0).contains(*z)))
    {
        return Err(SfhError::InvalidSample(format!(
            "stick-breaking fraction {bad} outside [0, 1]"
        )));
    }
    Ok(())
}
