//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and post-processing
//! - exported to JSON
//! - reloaded later for plotting or comparisons

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, SpectrumError};
use crate::math::percentile;
use crate::sfh::DEFAULT_FIXED_EDGES;

/// A sampled spectrum: strictly increasing wavelengths (Å) and a flux density per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
}

impl Spectrum {
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>) -> Result<Self, SpectrumError> {
        if wavelength.len() != flux.len() {
            return Err(SpectrumError::LengthMismatch {
                wavelength: wavelength.len(),
                flux: flux.len(),
            });
        }
        if wavelength.is_empty() {
            return Err(SpectrumError::Empty);
        }
        if let Some(index) = wavelength.iter().position(|w| !w.is_finite()) {
            return Err(SpectrumError::NonFinite { index });
        }
        if let Some(index) = flux.iter().position(|f| !f.is_finite()) {
            return Err(SpectrumError::NonFinite { index });
        }
        if let Some(pos) = wavelength.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SpectrumError::Unsorted { index: pos + 1 });
        }
        Ok(Self { wavelength, flux })
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Same wavelengths, flux multiplied pixel by pixel by `factor(λ)`.
    pub fn scaled_by<F: Fn(f64) -> f64>(&self, factor: F) -> Self {
        let flux = self
            .wavelength
            .iter()
            .zip(self.flux.iter())
            .map(|(&w, &f)| f * factor(w))
            .collect();
        Self {
            wavelength: self.wavelength.clone(),
            flux,
        }
    }

    /// Wavelengths divided by `1 + z`, flux unchanged.
    pub fn deredshifted(&self, z: f64) -> Self {
        Self {
            wavelength: self.wavelength.iter().map(|w| w / (1.0 + z)).collect(),
            flux: self.flux.clone(),
        }
    }
}

/// Units in which a continuum model arrives from its fitting engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelUnits {
    /// `L_sun / Hz` on rest-frame wavelengths.
    LsunPerHzRest,
    /// `L_sun / Å` on observed-frame wavelengths.
    LsunPerAngstromObserved,
}

/// A model continuum spectrum tagged with the engine that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuumModel {
    pub name: String,
    pub units: ModelUnits,
    pub spectrum: Spectrum,
}

/// Serde for `f64` fields that may be NaN: non-finite values are written as `null`
/// and `null` reads back as NaN.
pub mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Median and 1σ percentiles, in the persisted `{q50, q84, q16}` form.
///
/// A failed measurement carries NaN, persisted as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    #[serde(with = "nan_as_null")]
    pub q50: f64,
    #[serde(with = "nan_as_null")]
    pub q84: f64,
    #[serde(with = "nan_as_null")]
    pub q16: f64,
}

impl Percentiles {
    /// Percentiles of an unweighted sample; non-finite values are ignored.
    pub fn from_samples(values: &[f64]) -> Self {
        Self {
            q50: percentile(values, 50.0),
            q84: percentile(values, 84.0),
            q16: percentile(values, 16.0),
        }
    }

    pub fn nan() -> Self {
        Self {
            q50: f64::NAN,
            q84: f64::NAN,
            q16: f64::NAN,
        }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self {
            q50: self.q50 * k,
            q84: self.q84 * k,
            q16: self.q16 * k,
        }
    }
}

/// A posterior quantity: weighted percentiles plus the per-sample chain they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySummary {
    #[serde(with = "nan_as_null")]
    pub q50: f64,
    #[serde(with = "nan_as_null")]
    pub q84: f64,
    #[serde(with = "nan_as_null")]
    pub q16: f64,
    pub chain: Vec<f64>,
}

/// Outcome of one line measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Ok,
    /// The fit did not converge, even after one perturbed retry.
    FitFailed,
}

/// How the sampler parameterizes the SFH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SfhParameterization {
    /// `logmass` + `logsfr_ratios_{1..N-1}`.
    LogSfrRatios,
    /// `logmass` + `z_fraction_{1..N-1}`.
    ZFraction,
}

/// Everything needed to process one galaxy.
///
/// Built from CLI arguments, optionally overlaid by a JSON run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub objname: String,
    pub runname: String,
    pub outdir: PathBuf,
    pub overwrite: bool,

    /// Fit redshift.
    pub redshift: f64,
    /// Number of SFH bins.
    pub nbins: usize,
    /// Leading fixed log10(yr) bin edges.
    pub fixed_edges: Vec<f64>,
    pub parameterization: SfhParameterization,

    /// Posterior samples to post-process.
    pub ncalc: usize,
    /// Bootstrap realizations per emission-line fit.
    pub nboot: usize,
    pub seed: u64,

    pub chain: Option<PathBuf>,
    pub observed: Option<PathBuf>,
    pub model_a: Option<PathBuf>,
    pub model_b: Option<PathBuf>,
    pub model_a_units: ModelUnits,
    pub model_b_units: ModelUnits,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            objname: "galaxy".to_string(),
            runname: "run".to_string(),
            outdir: PathBuf::from("results"),
            overwrite: false,
            redshift: 0.0,
            nbins: 7,
            fixed_edges: DEFAULT_FIXED_EDGES.to_vec(),
            parameterization: SfhParameterization::LogSfrRatios,
            ncalc: 3000,
            nboot: 100,
            seed: 42,
            chain: None,
            observed: None,
            model_a: None,
            model_b: None,
            model_a_units: ModelUnits::LsunPerHzRest,
            model_b_units: ModelUnits::LsunPerAngstromObserved,
        }
    }
}

impl RunConfig {
    /// Fail fast on settings that would only error deep inside a run.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.objname.trim().is_empty() {
            return Err(AppError::new(2, "objname must not be empty."));
        }
        if self.runname.trim().is_empty() {
            return Err(AppError::new(2, "runname must not be empty."));
        }
        if !(self.redshift.is_finite() && self.redshift >= 0.0) {
            return Err(AppError::new(
                2,
                format!("redshift must be finite and >= 0 (got {}).", self.redshift),
            ));
        }
        if self.fixed_edges.len() < 2 {
            return Err(AppError::new(2, "need at least two fixed bin edges."));
        }
        if self.fixed_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::new(2, "fixed bin edges must be strictly increasing."));
        }
        if self.nbins < self.fixed_edges.len() {
            return Err(AppError::new(
                2,
                format!(
                    "nbins={} must exceed the {} fixed young bins.",
                    self.nbins,
                    self.fixed_edges.len() - 1
                ),
            ));
        }
        if self.ncalc == 0 {
            return Err(AppError::new(2, "ncalc must be >= 1."));
        }
        if self.nboot < 2 {
            return Err(AppError::new(2, "nboot must be >= 2."));
        }
        Ok(())
    }

    /// `<outdir>/<runname>/<objname>_<suffix>.json`
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        self.outdir
            .join(&self.runname)
            .join(format!("{}_{suffix}.json", self.objname))
    }
}
