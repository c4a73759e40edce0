//! Emission-line fluxes, equivalent widths and break indices with bootstrap errors.
//!
//! The observed spectrum is decomposed against two independent continuum models:
//!
//! 1. resolution gate near Hα
//! 2. unit normalization onto rest-frame `L_sun / Å`
//! 3. absorption-line fits on each smoothed model
//! 4. Dn4000 of the observation and both models
//! 5. an umbrella fit to the observation for redshift and velocity dispersion
//! 6. per-model continuum normalization and residual
//! 7. noise from the line-free residual (the smaller of the two is adopted)
//! 8. bootstrap umbrella fits on each residual
//! 9. bootstrap Hδ absorption on the observation
//!
//! Only the resolution gate skips a galaxy silently. A model whose continuum anchor or
//! bootstrap fails is reported with `LineStatus::FitFailed`; the pipeline errors only when
//! nothing usable remains.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ContinuumModel, LineStatus, ModelUnits, Percentiles, Spectrum};
use crate::error::FitError;
use crate::fit::{BootstrapOptions, LmFit, LmOptions, bootstrap, fit_with_retry};
use crate::lines::absorption::{AbsorptionMeasurement, AbsorptionProfile, measure_abslines, measure_line};
use crate::lines::catalog::{
    ABS_HDELTA, ABSORPTION_LINES, CONTINUUM_HIGH, CONTINUUM_LOW, EMISSION_LINES, EMISSION_WINDOWS,
    HALPHA_GATE_WAVELENGTH, HALPHA_INDEX, HBETA_INDEX, LOW_HIGH_SPLIT, MAX_PIXEL_STEP_NEAR_HALPHA,
    WINDOW_ANCHORS,
};
use crate::lines::dn4000::measure_dn4000;
use crate::lines::noise::{adopted_noise, estimate_noise};
use crate::math::constants::{C_ANGSTROM_PER_S, C_KMS, L_SUN_ERG_S};
use crate::math::{Cosmology, interp_onto, mean, nearest_index, percentile, select, smooth_velocity, window_mask};
use crate::models::profile::gaussian_area;
use crate::models::umbrella::{self, N_LINES, N_PARAMS};

/// Dispersion (km/s) models are smoothed to before absorption fitting.
pub const ABSORPTION_SMOOTHING_KMS: f64 = 200.0;
const SMOOTH_MIN_LAM: f64 = 3.0e3;
const SMOOTH_MAX_LAM: f64 = 3.0e8;
/// Below this adopted dispersion (km/s) the observation gets an extra smoothing pass in stage 9.
pub const OBSERVED_SMOOTHING_THRESHOLD_KMS: f64 = 175.0;
pub const SIGMA_SPEC_MIN: f64 = 10.0;
pub const SIGMA_SPEC_MAX: f64 = 300.0;
/// Padding (Å) around each fitting window when rescaling a model.
const WINDOW_PADDING: f64 = 30.0;
/// Lines with the largest equivalent widths used for the velocity dispersion.
const DISPERSION_LINES: usize = 2;

/// Knobs for one decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmissionOptions {
    pub bootstrap: BootstrapOptions,
    pub lm: LmOptions,
    pub cosmology: Cosmology,
}

/// One galaxy's inputs.
#[derive(Debug, Clone)]
pub struct EmissionInputs {
    /// Observed spectrum on rest-frame wavelengths, in `L_sun / cm² / Å`.
    pub observed: Spectrum,
    pub models: [ContinuumModel; 2],
    pub redshift: f64,
}

/// Bootstrap percentiles for one umbrella line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMeasurement {
    pub name: String,
    pub rest_wavelength: f64,
    /// erg/s
    pub lum: Percentiles,
    /// erg/s/cm²
    pub flux: Percentiles,
    /// Å
    pub eqw_rest: Percentiles,
}

/// A model's Balmer absorption in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalmerAbsorption {
    pub name: String,
    pub lum: f64,
    pub flux: f64,
    pub eqw: f64,
    pub lam: f64,
    pub status: LineStatus,
}

/// Everything measured against one continuum model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEmission {
    pub model: String,
    pub status: LineStatus,
    /// Noise (`L_sun / Å`) estimated from this model's residual.
    pub noise: Option<f64>,
    pub lines: Vec<LineMeasurement>,
    /// `L_sun / Å`
    pub continuum_low: Percentiles,
    pub continuum_high: Percentiles,
    /// Hα / Hβ luminosity ratio of the medians.
    pub balmer_decrement: Option<f64>,
    pub absorption: Vec<BalmerAbsorption>,
    pub dn4000: Option<f64>,
    /// Dispersion (km/s) the model was smoothed to before subtraction.
    pub sigsmooth: f64,
    pub bootstrap_failures: usize,
}

/// Hδ absorption and Dn4000 measured directly on the observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedEmission {
    pub dn4000: Option<f64>,
    pub hdelta_lum: Percentiles,
    pub hdelta_flux: Percentiles,
    pub hdelta_eqw: Percentiles,
    /// Continuum level (`L_sun / Å`) under Hδ: `flux_q50 / eqw_q50`.
    pub continuum_obs: f64,
    /// Fitted Hδ center on the unperturbed observation.
    pub continuum_lam: f64,
    pub status: LineStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionSummary {
    pub redshift: f64,
    /// Redshift offset of the stage-5 umbrella fit.
    pub zadj: f64,
    /// Adopted velocity dispersion (km/s).
    pub sigma_spec: f64,
    /// Adopted per-pixel noise (`L_sun / Å`).
    pub noise: f64,
    pub models: Vec<ModelEmission>,
    pub observed: ObservedEmission,
}

/// Pixel step (Å) at the pixel nearest 6563 Å.
///
/// `None` for fewer than two pixels.
pub fn resolution_near_halpha(wave: &[f64]) -> Option<f64> {
    if wave.len() < 2 {
        return None;
    }
    let idx = nearest_index(wave, HALPHA_GATE_WAVELENGTH)?;
    let idx = if idx + 1 == wave.len() { idx - 1 } else { idx };
    Some(wave[idx + 1] - wave[idx])
}

/// `true` if [NII] can be separated from Hα on this grid.
pub fn passes_resolution_gate(wave: &[f64]) -> bool {
    resolution_near_halpha(wave).is_some_and(|step| step <= MAX_PIXEL_STEP_NEAR_HALPHA)
}

/// Convert a model continuum onto rest-frame `L_sun / Å`.
pub fn normalize_model(model: &ContinuumModel, redshift: f64) -> Spectrum {
    match model.units {
        ModelUnits::LsunPerHzRest => model.spectrum.scaled_by(|lam| C_ANGSTROM_PER_S / (lam * lam)),
        ModelUnits::LsunPerAngstromObserved => model.spectrum.deredshifted(redshift),
    }
}

/// Run the full decomposition. `Ok(None)` when the resolution gate rejects the galaxy.
pub fn measure_emission(
    inputs: &EmissionInputs,
    opts: &EmissionOptions,
) -> Result<Option<EmissionSummary>, FitError> {
    // 1) Resolution gate.
    let obs_wave = inputs.observed.wavelength();
    if !passes_resolution_gate(obs_wave) {
        warn!(
            step = ?resolution_near_halpha(obs_wave),
            "spectral sampling too coarse to separate [NII] from H alpha; skipping"
        );
        return Ok(None);
    }

    // 2) Everything onto rest-frame L_sun / Å.
    let z = inputs.redshift;
    let dfactor = opts.cosmology.distance_factor(z);
    if !(dfactor.is_finite() && dfactor > 0.0) {
        return Err(FitError::InvalidParameters(format!(
            "no luminosity distance for redshift {z}"
        )));
    }
    let observed = inputs.observed.scaled_by(|_| dfactor);
    let obs_flux = observed.flux();
    let models: Vec<(&str, Spectrum)> = inputs
        .models
        .iter()
        .map(|m| (m.name.as_str(), normalize_model(m, z)))
        .collect();

    // 3) Absorption lines on each smoothed model.
    let model_absorption: Vec<Vec<AbsorptionMeasurement>> = models
        .iter()
        .map(|(name, spec)| {
            let smoothed = smooth_velocity(
                spec.wavelength(),
                spec.flux(),
                ABSORPTION_SMOOTHING_KMS,
                SMOOTH_MIN_LAM,
                SMOOTH_MAX_LAM,
            );
            let abs = measure_abslines(spec.wavelength(), &smoothed, AbsorptionProfile::Voigt, &opts.lm);
            debug!(model = name, ok = abs.iter().filter(|a| a.status == LineStatus::Ok).count(), "model absorption lines");
            abs
        })
        .collect();

    // 4) Break indices.
    let obs_dn4000 = measure_dn4000(obs_wave, obs_flux);
    let model_dn4000: Vec<Option<f64>> = models
        .iter()
        .map(|(_, s)| measure_dn4000(s.wavelength(), s.flux()))
        .collect();

    // 5) Umbrella fit on the observation.
    let initial = fit_observed_umbrella(obs_wave, obs_flux, &opts.lm)?;
    let initial_p = initial.params.values();
    let zadj = umbrella::redshift_offset(&initial_p);
    let sigma_spec = velocity_dispersion(&initial_p)?;
    info!(zadj, sigma_spec, "initial umbrella fit");

    // 6) + 7) Residuals and noise per model.
    let residuals: Vec<Result<ModelResidual, FitError>> = models
        .iter()
        .zip(model_absorption.iter())
        .map(|((name, spec), abs)| {
            let res = model_residual(spec, abs, &initial_p, zadj, sigma_spec, &observed, &opts.lm);
            if let Err(err) = &res {
                warn!(model = name, error = %err, "continuum normalization failed");
            }
            res
        })
        .collect();
    let noises: Vec<f64> = residuals.iter().flatten().map(|r| r.noise).collect();
    let Some(noise) = adopted_noise(&noises) else {
        return Err(residuals
            .into_iter()
            .find_map(Result::err)
            .unwrap_or(FitError::NonFinite));
    };
    debug!(noise, "adopted noise");

    // 8) Bootstrap the umbrella model on each residual.
    let start = umbrella::residual_start(&initial.params);
    let mut model_zadj: Vec<Option<f64>> = Vec::with_capacity(models.len());
    let mut summaries = Vec::with_capacity(models.len());
    for (k, ((name, _), res)) in models.iter().zip(residuals.iter()).enumerate() {
        let mut summary = ModelEmission {
            model: name.to_string(),
            status: LineStatus::FitFailed,
            noise: res.as_ref().ok().map(|r| r.noise),
            lines: failed_lines(),
            continuum_low: Percentiles::nan(),
            continuum_high: Percentiles::nan(),
            balmer_decrement: None,
            absorption: model_absorption[k]
                .iter()
                .map(|a| physical_absorption(a, dfactor, z))
                .collect(),
            dn4000: model_dn4000[k],
            sigsmooth: sigma_spec,
            bootstrap_failures: 0,
        };
        let mut fitted_zadj = None;
        if let Ok(res) = res {
            let stream = format!("emission-{k}");
            let outcome = bootstrap(&res.residual, noise, &stream, &opts.bootstrap, |y| {
                fit_with_retry(&umbrella::evaluate, &res.x, y, &start, &opts.lm).map(|f| f.params.values())
            })?;
            summary.bootstrap_failures = outcome.failures;
            if outcome.is_usable() {
                fitted_zadj = fill_line_summary(&mut summary, &outcome.samples, obs_wave, res, dfactor, z);
            } else {
                warn!(
                    model = name,
                    failures = outcome.failures,
                    attempted = outcome.attempted(),
                    "too many bootstrap fits failed"
                );
            }
        }
        debug!(model = name, status = ?summary.status, "model emission summary");
        model_zadj.push(fitted_zadj);
        summaries.push(summary);
    }

    // 9) Hδ absorption on the observation.
    let z9 = model_zadj.first().copied().flatten().unwrap_or(zadj);
    let observed_summary = observed_absorption(&observed, z9, sigma_spec, noise, dfactor, z, opts)?;

    Ok(Some(EmissionSummary {
        redshift: z,
        zadj,
        sigma_spec,
        noise,
        models: summaries,
        observed: observed_summary,
    }))
}

/// Wavelengths and fluxes inside the two umbrella windows.
fn window_data(wave: &[f64], flux: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mask = emission_window_mask(wave);
    (select(wave, &mask), select(flux, &mask))
}

fn emission_window_mask(wave: &[f64]) -> Vec<bool> {
    wave.iter()
        .map(|&w| EMISSION_WINDOWS.iter().any(|&(lo, hi)| w > lo && w < hi))
        .collect()
}

/// Umbrella fit to the observation, seeded from the flux nearest 6400 Å.
pub fn fit_observed_umbrella(wave: &[f64], flux: &[f64], lm: &LmOptions) -> Result<LmFit, FitError> {
    let idx = nearest_index(wave, CONTINUUM_HIGH.0).ok_or(FitError::EmptyData)?;
    let continuum_6400 = flux[idx];
    let (x, y) = window_data(wave, flux);
    if x.is_empty() {
        return Err(FitError::EmptyData);
    }
    let start = umbrella::initial_parameters(continuum_6400)?;
    fit_with_retry(&umbrella::evaluate, &x, &y, &start, lm)
}

/// Mean `σ / λ_rest · c` of the two lines with the largest equivalent widths, in km/s,
/// clipped to `[10, 300]`.
pub fn velocity_dispersion(p: &[f64]) -> Result<f64, FitError> {
    let fluxes = umbrella::line_fluxes(p);
    let mut ranked: Vec<(usize, f64)> = EMISSION_LINES
        .iter()
        .enumerate()
        .map(|(i, line)| (i, fluxes[i] / umbrella::continuum(line.rest_wavelength, p)))
        .filter(|(_, eqw)| eqw.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let velocities: Vec<f64> = ranked
        .iter()
        .take(DISPERSION_LINES)
        .map(|(i, _)| p[umbrella::sigma_index(*i)] / EMISSION_LINES[*i].rest_wavelength * C_KMS)
        .collect();
    let sigma = mean(&velocities).ok_or(FitError::NonFinite)?;
    if !sigma.is_finite() {
        return Err(FitError::NonFinite);
    }
    Ok(sigma.clamp(SIGMA_SPEC_MIN, SIGMA_SPEC_MAX))
}

/// A model's residual against the observation inside the umbrella windows.
#[derive(Debug, Clone)]
struct ModelResidual {
    /// Window wavelengths.
    x: Vec<f64>,
    /// Observation minus rescaled, smoothed model on `x`.
    residual: Vec<f64>,
    /// Rescaled, smoothed model on the full observed grid.
    smoothed_model: Vec<f64>,
    noise: f64,
}

fn model_residual(
    model: &Spectrum,
    absorption: &[AbsorptionMeasurement],
    umbrella_p: &[f64],
    zadj: f64,
    sigma_spec: f64,
    observed: &Spectrum,
    lm: &LmOptions,
) -> Result<ModelResidual, FitError> {
    let model_wave = model.wavelength();
    let mut scaled = model.flux().to_vec();

    for (&(lo, hi), &anchor_index) in EMISSION_WINDOWS.iter().zip(WINDOW_ANCHORS.iter()) {
        let anchor = &absorption[anchor_index];
        let abs_continuum = anchor.continuum().ok_or_else(|| {
            FitError::InvalidParameters(format!("no continuum from {} absorption", anchor.name))
        })?;
        let idx = nearest_index(model_wave, anchor.lam).ok_or(FitError::EmptyData)?;
        let norm = umbrella::continuum(model_wave[idx], umbrella_p) / abs_continuum;
        if !norm.is_finite() {
            return Err(FitError::NonFinite);
        }
        for (f, &w) in scaled.iter_mut().zip(model_wave.iter()) {
            if w > lo - WINDOW_PADDING && w < hi + WINDOW_PADDING {
                *f *= norm;
            }
        }
    }

    let shifted: Vec<f64> = model_wave.iter().map(|w| w * (1.0 + zadj)).collect();
    let obs_wave = observed.wavelength();
    let on_grid = interp_onto(obs_wave, &shifted, &scaled, 0.0);
    let smoothed_model = smooth_velocity(obs_wave, &on_grid, sigma_spec, SMOOTH_MIN_LAM, SMOOTH_MAX_LAM);

    let mask = emission_window_mask(obs_wave);
    let x = select(obs_wave, &mask);
    let residual: Vec<f64> = observed
        .flux()
        .iter()
        .zip(smoothed_model.iter())
        .zip(mask.iter())
        .filter(|(_, keep)| **keep)
        .map(|((o, m), _)| o - m)
        .collect();

    let noise = estimate_noise(&x, &residual, lm)?;
    Ok(ModelResidual {
        x,
        residual,
        smoothed_model,
        noise,
    })
}

/// Mean of (umbrella continuum + smoothed model) over `window` of the observed grid.
fn window_continuum(wave: &[f64], smoothed_model: &[f64], p: &[f64], window: (f64, f64)) -> f64 {
    let mask = window_mask(wave, window.0, window.1);
    let values: Vec<f64> = wave
        .iter()
        .zip(smoothed_model.iter())
        .zip(mask.iter())
        .filter(|(_, keep)| **keep)
        .map(|((&w, &m), _)| umbrella::continuum(w, p) + m)
        .collect();
    mean(&values).unwrap_or(f64::NAN)
}

fn failed_lines() -> Vec<LineMeasurement> {
    EMISSION_LINES
        .iter()
        .map(|line| LineMeasurement {
            name: line.name.to_string(),
            rest_wavelength: line.rest_wavelength,
            lum: Percentiles::nan(),
            flux: Percentiles::nan(),
            eqw_rest: Percentiles::nan(),
        })
        .collect()
}

/// Fill `summary` from bootstrap parameter samples. Returns the median redshift offset.
fn fill_line_summary(
    summary: &mut ModelEmission,
    samples: &[Vec<f64>],
    obs_wave: &[f64],
    res: &ModelResidual,
    dfactor: f64,
    z: f64,
) -> Option<f64> {
    let column = |k: usize| -> Vec<f64> { samples.iter().map(|s| s[k]).collect() };
    let medians: Vec<f64> = (0..N_PARAMS).map(|k| percentile(&column(k), 50.0)).collect();

    let cont_low = window_continuum(obs_wave, &res.smoothed_model, &medians, CONTINUUM_LOW);
    let cont_high = window_continuum(obs_wave, &res.smoothed_model, &medians, CONTINUUM_HIGH);
    let low_samples: Vec<f64> = samples
        .iter()
        .map(|s| window_continuum(obs_wave, &res.smoothed_model, s, CONTINUUM_LOW))
        .collect();
    let high_samples: Vec<f64> = samples
        .iter()
        .map(|s| window_continuum(obs_wave, &res.smoothed_model, s, CONTINUUM_HIGH))
        .collect();
    summary.continuum_low = Percentiles::from_samples(&low_samples);
    summary.continuum_high = Percentiles::from_samples(&high_samples);

    let to_flux = 1.0 / dfactor / (1.0 + z);
    summary.lines = EMISSION_LINES
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let areas: Vec<f64> = samples
                .iter()
                .map(|s| gaussian_area(s[umbrella::amp_index(i)], s[umbrella::sigma_index(i)]))
                .collect();
            let cont = if line.rest_wavelength < LOW_HIGH_SPLIT { cont_low } else { cont_high };
            let eqws: Vec<f64> = areas.iter().map(|a| a / cont).collect();
            let lum = Percentiles::from_samples(&areas).scaled(L_SUN_ERG_S);
            LineMeasurement {
                name: line.name.to_string(),
                rest_wavelength: line.rest_wavelength,
                lum,
                flux: lum.scaled(to_flux),
                eqw_rest: Percentiles::from_samples(&eqws),
            }
        })
        .collect();
    debug_assert_eq!(summary.lines.len(), N_LINES);

    let halpha = summary.lines[HALPHA_INDEX].lum.q50;
    let hbeta = summary.lines[HBETA_INDEX].lum.q50;
    summary.balmer_decrement = (halpha > 0.0 && hbeta > 0.0).then(|| halpha / hbeta);
    summary.status = LineStatus::Ok;

    let zadj = umbrella::redshift_offset(&medians);
    zadj.is_finite().then_some(zadj)
}

fn physical_absorption(a: &AbsorptionMeasurement, dfactor: f64, z: f64) -> BalmerAbsorption {
    let lum = a.flux * L_SUN_ERG_S;
    BalmerAbsorption {
        name: a.name.clone(),
        lum,
        flux: lum / dfactor / (1.0 + z),
        eqw: a.eqw,
        lam: a.lam,
        status: a.status,
    }
}

fn observed_absorption(
    observed: &Spectrum,
    zadj: f64,
    sigma_spec: f64,
    noise: f64,
    dfactor: f64,
    z: f64,
    opts: &EmissionOptions,
) -> Result<ObservedEmission, FitError> {
    let wave: Vec<f64> = observed.wavelength().iter().map(|w| w / (1.0 + zadj)).collect();
    let flux = if sigma_spec < OBSERVED_SMOOTHING_THRESHOLD_KMS {
        smooth_velocity(&wave, observed.flux(), ABSORPTION_SMOOTHING_KMS, SMOOTH_MIN_LAM, SMOOTH_MAX_LAM)
    } else {
        observed.flux().to_vec()
    };
    let dn4000 = measure_dn4000(observed.wavelength(), observed.flux());
    let hdelta = &ABSORPTION_LINES[ABS_HDELTA];

    let outcome = bootstrap(&flux, noise, "hdelta", &opts.bootstrap, |y| {
        measure_line(&wave, y, hdelta, AbsorptionProfile::Gaussian, &opts.lm).map(|m| (m.flux, m.eqw))
    })?;
    let best = measure_line(&wave, &flux, hdelta, AbsorptionProfile::Gaussian, &opts.lm);

    if !outcome.is_usable() {
        warn!(
            failures = outcome.failures,
            attempted = outcome.attempted(),
            "H delta bootstrap failed on the observed spectrum"
        );
        return Ok(ObservedEmission {
            dn4000,
            hdelta_lum: Percentiles::nan(),
            hdelta_flux: Percentiles::nan(),
            hdelta_eqw: Percentiles::nan(),
            continuum_obs: f64::NAN,
            continuum_lam: best.map(|m| m.lam).unwrap_or(f64::NAN),
            status: LineStatus::FitFailed,
        });
    }

    let fluxes: Vec<f64> = outcome.samples.iter().map(|s| s.0).collect();
    let eqws: Vec<f64> = outcome.samples.iter().map(|s| s.1).collect();
    let absorbed = Percentiles::from_samples(&fluxes);
    let eqw = Percentiles::from_samples(&eqws);
    let lum = absorbed.scaled(L_SUN_ERG_S);

    Ok(ObservedEmission {
        dn4000,
        hdelta_lum: lum,
        hdelta_flux: lum.scaled(1.0 / dfactor / (1.0 + z)),
        hdelta_eqw: eqw,
        continuum_obs: absorbed.q50 / eqw.q50,
        continuum_lam: best.map(|m| m.lam).unwrap_or(f64::NAN),
        status: LineStatus::Ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{add_gaussian_noise, realization_rng};
    use crate::models::profile::{gaussian, voigt};

    const CONT: f64 = 1.0e6;
    const LINE_SIGMA: f64 = 3.0;
    const AMPS: [f64; 6] = [1.0e6, 2.98e6, 1.5e6, 0.5e6, 1.465e6, 4.5e6];

    fn stellar(x: f64) -> f64 {
        let mut y = CONT * (1.0 + 1e-5 * (x - 5500.0));
        for line in ABSORPTION_LINES {
            y += voigt(x, line.center, -0.06 * CONT, 20.0, 20.0);
        }
        y
    }

    fn nebular(x: f64) -> f64 {
        EMISSION_LINES
            .iter()
            .zip(AMPS)
            .map(|(line, amp)| gaussian(x, amp, line.rest_wavelength, LINE_SIGMA))
            .sum()
    }

    fn synthetic(z: f64, step: f64) -> EmissionInputs {
        let dfactor = Cosmology::default().distance_factor(z);
        let obs_wave: Vec<f64> = (0..)
            .map(|i| 3700.0 + step * i as f64)
            .take_while(|w| *w <= 7000.0)
            .collect();
        let clean: Vec<f64> = obs_wave.iter().map(|&x| stellar(x) + nebular(x)).collect();
        let mut rng = realization_rng(5, "synthetic", 0);
        let noisy = add_gaussian_noise(&clean, 0.005 * CONT, &mut rng).unwrap();
        let observed = Spectrum::new(obs_wave, noisy.iter().map(|f| f / dfactor).collect()).unwrap();

        let model_wave: Vec<f64> = (0..3700).map(|i| 3500.0 + i as f64).collect();
        let per_hz: Vec<f64> = model_wave
            .iter()
            .map(|&x| stellar(x) * x * x / C_ANGSTROM_PER_S)
            .collect();
        let model_a = ContinuumModel {
            name: "fsps".into(),
            units: ModelUnits::LsunPerHzRest,
            spectrum: Spectrum::new(model_wave.clone(), per_hz).unwrap(),
        };
        let model_b = ContinuumModel {
            name: "template".into(),
            units: ModelUnits::LsunPerAngstromObserved,
            spectrum: Spectrum::new(
                model_wave.iter().map(|x| x * (1.0 + z)).collect(),
                model_wave.iter().map(|&x| stellar(x)).collect(),
            )
            .unwrap(),
        };
        EmissionInputs {
            observed,
            models: [model_a, model_b],
            redshift: z,
        }
    }

    fn quick_options() -> EmissionOptions {
        EmissionOptions {
            bootstrap: BootstrapOptions { nboot: 6, seed: 1 },
            ..EmissionOptions::default()
        }
    }

    #[test]
    fn resolution_gate_is_idempotent() {
        let inputs = synthetic(0.05, 20.0);
        let opts = quick_options();
        assert!(measure_emission(&inputs, &opts).unwrap().is_none());
        assert!(measure_emission(&inputs, &opts).unwrap().is_none());
    }

    #[test]
    fn resolution_step_uses_neighbor_of_last_pixel() {
        assert_eq!(resolution_near_halpha(&[6000.0, 6100.0, 6200.0]), Some(100.0));
        assert_eq!(resolution_near_halpha(&[6563.0]), None);
        assert!(passes_resolution_gate(&[6550.0, 6560.0, 6570.0]));
    }

    #[test]
    fn model_units_are_normalized() {
        let inputs = synthetic(0.1, 1.0);
        let a = normalize_model(&inputs.models[0], 0.1);
        let b = normalize_model(&inputs.models[1], 0.1);
        let i = nearest_index(a.wavelength(), 5500.0).unwrap();
        assert!((a.flux()[i] - stellar(5500.0)).abs() / CONT < 1e-9);
        assert!((b.wavelength()[i] - 5500.0).abs() < 1e-9);
        assert!((b.flux()[i] - a.flux()[i]).abs() / CONT < 1e-9);
    }

    #[test]
    fn velocity_dispersion_uses_strongest_lines() {
        let mut p = umbrella::initial_parameters(CONT).unwrap().values();
        for (i, amp) in AMPS.iter().enumerate() {
            p[umbrella::amp_index(i)] = *amp;
            p[umbrella::sigma_index(i)] = LINE_SIGMA;
        }
        let expected = 0.5 * (LINE_SIGMA / 6562.80 + LINE_SIGMA / 5006.84) * C_KMS;
        assert!((velocity_dispersion(&p).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn recovers_injected_halpha() {
        let inputs = synthetic(0.05, 1.0);
        let summary = measure_emission(&inputs, &quick_options()).unwrap().unwrap();

        assert!(summary.zadj.abs() < 1e-4, "zadj {}", summary.zadj);
        assert_eq!(summary.models.len(), 2);
        let expected = gaussian_area(AMPS[5], LINE_SIGMA) * L_SUN_ERG_S;
        for model in &summary.models {
            assert_eq!(model.status, LineStatus::Ok, "{}", model.model);
            let halpha = &model.lines[HALPHA_INDEX];
            assert!(
                (halpha.lum.q50 - expected).abs() / expected < 0.05,
                "{}: {} vs {expected}",
                model.model,
                halpha.lum.q50
            );
            assert!(halpha.eqw_rest.q50 > 0.0);
            assert!(model.balmer_decrement.unwrap() > 1.0);
        }
        assert!(summary.observed.dn4000.is_some());
    }
}
