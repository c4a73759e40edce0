//! Post-processing of a posterior chain into SFH-derived quantities.
//!
//! A weighted subset of the chain is drawn, each selected theta is resolved through the
//! model schema into bin masses, and the SFH quantities of every sample are summarized
//! with weighted percentiles. The per-sample loop runs on the rayon pool.

use std::collections::BTreeMap;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::QuantitySummary;
use crate::error::{SchemaError, SfhError};
use crate::math::weighted_quantiles;
use crate::params::ModelSchema;
use crate::posterior::chain::{Chain, select_samples};
use crate::sfh::{BinnedSfh, SFR_WINDOWS_GYR, sfh_time_vector};

/// Quantile levels in persisted order: median, upper, lower.
const QUANTILES: [f64; 3] = [0.5, 0.84, 0.16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosteriorOptions {
    pub ncalc: usize,
    pub seed: u64,
}

impl Default for PosteriorOptions {
    fn default() -> Self {
        Self { ncalc: 3000, seed: 42 }
    }
}

/// SFH quantities of one posterior sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleQuantities {
    pub stellar_mass: f64,
    /// SFR over each of [`SFR_WINDOWS_GYR`].
    pub sfr: [f64; 3],
    pub half_time: f64,
    pub avg_age: f64,
    /// SFR on the summary time grid.
    pub sfh: Vec<f64>,
}

impl SampleQuantities {
    fn is_finite(&self) -> bool {
        self.stellar_mass.is_finite()
            && self.sfr.iter().all(|v| v.is_finite())
            && self.half_time.is_finite()
            && self.avg_age.is_finite()
    }
}

/// Resolve one theta and compute its SFH quantities on `times_gyr`.
pub fn derive_sample(schema: &ModelSchema, theta: &[f64], times_gyr: &[f64]) -> Result<SampleQuantities, SchemaError> {
    let resolved = schema.resolve(theta)?;
    let masses = resolved
        .get("mass")
        .ok_or_else(|| SfhError::InvalidInput("schema has no `mass` parameter".into()))?
        .to_vec();
    let sfh = BinnedSfh::new(schema.agebins().clone(), masses)?;
    Ok(SampleQuantities {
        stellar_mass: sfh.total_mass(),
        sfr: SFR_WINDOWS_GYR.map(|w| sfh.sfr_over(w)),
        half_time: sfh.halfmass_assembly_time(),
        avg_age: sfh.mass_weighted_age(),
        sfh: sfh.sfh_on(times_gyr),
    })
}

/// Weighted percentiles of the SFH on a time grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SfhSummary {
    /// Lookback time (Gyr).
    pub t: Vec<f64>,
    pub q50: Vec<f64>,
    pub q84: Vec<f64>,
    pub q16: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSummary {
    /// Chain row of every kept sample; the first is the most probable.
    pub sample_idx: Vec<usize>,
    pub weights: Vec<f64>,
    pub thetas: BTreeMap<String, QuantitySummary>,
    pub extras: BTreeMap<String, QuantitySummary>,
    pub sfh: SfhSummary,
    /// Samples dropped because their SFH was not finite.
    pub rejected: usize,
}

fn summarize(chain: Vec<f64>, weights: &[f64]) -> QuantitySummary {
    let q = weighted_quantiles(&chain, &QUANTILES, weights);
    QuantitySummary {
        q50: q[0],
        q84: q[1],
        q16: q[2],
        chain,
    }
}

fn column<F: Fn(&SampleQuantities) -> f64>(samples: &[SampleQuantities], f: F) -> Vec<f64> {
    samples.iter().map(f).collect()
}

/// Post-process `chain` under `schema`.
pub fn postprocess(chain: &Chain, schema: &ModelSchema, opts: &PosteriorOptions) -> Result<PosteriorSummary, SchemaError> {
    let labels = schema.theta_labels();
    let columns = schema
        .theta_label_aliases()
        .iter()
        .map(|names| {
            names
                .iter()
                .find_map(|name| chain.column_index(name))
                .ok_or_else(|| SchemaError::UnknownInput {
                    parameter: "chain".to_string(),
                    input: names.join(" | "),
                })
        })
        .collect::<Result<Vec<usize>, SchemaError>>()?;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let selected = select_samples(chain, opts.ncalc, &mut rng)?;
    let times = sfh_time_vector(schema.agebins());

    let started = Instant::now();
    let results: Vec<(usize, Result<SampleQuantities, SchemaError>)> = selected
        .par_iter()
        .enumerate()
        .map(|(jj, &row)| {
            let t0 = Instant::now();
            let theta = chain.theta_for(row, &columns);
            let out = derive_sample(schema, &theta, &times);
            debug!(sample = jj, row, elapsed_us = t0.elapsed().as_micros() as u64, "derived sample");
            (row, out)
        })
        .collect();

    let mut kept_idx = Vec::with_capacity(results.len());
    let mut samples = Vec::with_capacity(results.len());
    let mut rejected = 0;
    for (row, result) in results {
        match result {
            Ok(q) if q.is_finite() => {
                kept_idx.push(row);
                samples.push(q);
            }
            Ok(_) | Err(SchemaError::Sfh(SfhError::InvalidSample(_))) => rejected += 1,
            Err(err) => return Err(err),
        }
    }
    if samples.is_empty() {
        return Err(SfhError::InvalidSample("every selected sample produced a non-finite SFH".into()).into());
    }
    if rejected > 0 {
        warn!(rejected, kept = samples.len(), "rejected non-finite posterior samples");
    }
    info!(
        samples = samples.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "posterior samples processed"
    );

    let weights: Vec<f64> = kept_idx.iter().map(|&i| chain.weights()[i]).collect();

    // Thetas come from the whole weighted chain; the selected subset feeds only the
    // derived quantities.
    let mut thetas = BTreeMap::new();
    for (label, &col) in labels.iter().zip(columns.iter()) {
        let values: Vec<f64> = (0..chain.len()).map(|i| chain.row(i)[col]).collect();
        thetas.insert(label.clone(), summarize(values, chain.weights()));
    }

    let mass = column(&samples, |s| s.stellar_mass);
    let mut extras = BTreeMap::new();
    for (k, window) in SFR_WINDOWS_GYR.iter().enumerate() {
        let tag = (window * 1000.0).round() as u32;
        let sfr = column(&samples, |s| s.sfr[k]);
        let ssfr: Vec<f64> = sfr.iter().zip(mass.iter()).map(|(s, m)| s / m).collect();
        extras.insert(format!("sfr_{tag}"), summarize(sfr, &weights));
        extras.insert(format!("ssfr_{tag}"), summarize(ssfr, &weights));
    }
    extras.insert("half_time".to_string(), summarize(column(&samples, |s| s.half_time), &weights));
    extras.insert("avg_age".to_string(), summarize(column(&samples, |s| s.avg_age), &weights));
    extras.insert("stellar_mass".to_string(), summarize(mass, &weights));

    let mut sfh = SfhSummary {
        t: times.clone(),
        q50: Vec::with_capacity(times.len()),
        q84: Vec::with_capacity(times.len()),
        q16: Vec::with_capacity(times.len()),
    };
    for i in 0..times.len() {
        let at_t: Vec<f64> = samples.iter().map(|s| s.sfh[i]).collect();
        let q = weighted_quantiles(&at_t, &QUANTILES, &weights);
        sfh.q50.push(q[0]);
        sfh.q84.push(q[1]);
        sfh.q16.push(q[2]);
    }

    Ok(PosteriorSummary {
        sample_idx: kept_idx,
        weights,
        thetas,
        extras,
        sfh,
        rejected,
    })
}
