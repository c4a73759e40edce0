//! Per-galaxy pipeline shared by the single-galaxy subcommands and `sedpost batch`.
//!
//! One galaxy runs up to two independent stages:
//! inputs -> emission-line decomposition -> `<objname>_emline.json`
//! chain -> schema resolution -> SFH post-processing -> `<objname>_post.json`
//!
//! Front-ends only decide what to print.

use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn};

use crate::domain::{ContinuumModel, ModelUnits, RunConfig};
use crate::error::AppError;
use crate::fit::BootstrapOptions;
use crate::io::{WriteOutcome, load_chain, load_manifest, load_spectrum, output_blocked, write_summary};
use crate::lines::{EmissionInputs, EmissionOptions, EmissionSummary, measure_emission};
use crate::math::Cosmology;
use crate::params::ModelSchema;
use crate::posterior::{PosteriorOptions, PosteriorSummary, postprocess};
use crate::sfh::{AgeBins, construct_agebins};

pub const EMISSION_SUFFIX: &str = "emline";
pub const POSTERIOR_SUFFIX: &str = "post";

/// What one stage did for one galaxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Written(PathBuf),
    /// Output already present and overwriting is off.
    Exists(PathBuf),
    /// Spectral sampling too coarse to separate [NII] from Hα.
    Gated,
    /// The stage's inputs were not configured.
    NotConfigured,
}

impl From<WriteOutcome> for StageOutcome {
    fn from(value: WriteOutcome) -> Self {
        match value {
            WriteOutcome::Written(p) => StageOutcome::Written(p),
            WriteOutcome::Skipped(p) => StageOutcome::Exists(p),
        }
    }
}

/// A stage outcome plus the summary, when one was computed.
#[derive(Debug, Clone)]
pub struct StageRun<T> {
    pub outcome: StageOutcome,
    pub summary: Option<T>,
}

impl<T> StageRun<T> {
    fn without_summary(outcome: StageOutcome) -> Self {
        Self { outcome, summary: None }
    }
}

#[derive(Debug, Clone)]
pub struct GalaxyRun {
    pub objname: String,
    pub emission: StageOutcome,
    pub posterior: StageOutcome,
}

/// Every galaxy of a batch with its result, in manifest order.
pub type BatchResults = Vec<(String, Result<GalaxyRun, AppError>)>;

/// Age bins for the run's redshift and bin layout.
pub fn run_agebins(config: &RunConfig, cosmology: &Cosmology) -> Result<AgeBins, AppError> {
    let tuniv = cosmology.age_years(config.redshift);
    Ok(construct_agebins(&config.fixed_edges, config.nbins, tuniv)?)
}

/// Emission-line decomposition for one galaxy.
///
/// The observed CSV carries observed-frame wavelengths (Å) and flux in `L_sun / cm² / Å`;
/// each model CSV is in the units named by the run.
pub fn run_emission(config: &RunConfig) -> Result<StageRun<EmissionSummary>, AppError> {
    let (Some(observed), Some(model_a), Some(model_b)) = (&config.observed, &config.model_a, &config.model_b)
    else {
        return Ok(StageRun::without_summary(StageOutcome::NotConfigured));
    };
    if output_blocked(config, EMISSION_SUFFIX) {
        let path = config.output_path(EMISSION_SUFFIX);
        info!(path = %path.display(), "emission summary exists; skipping");
        return Ok(StageRun::without_summary(StageOutcome::Exists(path)));
    }

    // 1) Read the observation and both continuum models.
    let observed = load_spectrum(observed)?.data.deredshifted(config.redshift);
    let inputs = EmissionInputs {
        observed,
        models: [
            load_model(model_a, "model_a", config.model_a_units)?,
            load_model(model_b, "model_b", config.model_b_units)?,
        ],
        redshift: config.redshift,
    };

    // 2) Decompose.
    let opts = EmissionOptions {
        bootstrap: BootstrapOptions {
            nboot: config.nboot,
            seed: config.seed,
        },
        ..EmissionOptions::default()
    };
    let Some(summary) = measure_emission(&inputs, &opts)? else {
        return Ok(StageRun::without_summary(StageOutcome::Gated));
    };

    // 3) Persist.
    let outcome = write_summary(config, EMISSION_SUFFIX, &summary)?;
    Ok(StageRun {
        outcome: outcome.into(),
        summary: Some(summary),
    })
}

fn load_model(path: &Path, name: &str, units: ModelUnits) -> Result<ContinuumModel, AppError> {
    Ok(ContinuumModel {
        name: name.to_string(),
        units,
        spectrum: load_spectrum(path)?.data,
    })
}

/// SFH post-processing of one galaxy's posterior chain.
pub fn run_posterior(config: &RunConfig) -> Result<StageRun<PosteriorSummary>, AppError> {
    let Some(chain_path) = &config.chain else {
        return Ok(StageRun::without_summary(StageOutcome::NotConfigured));
    };
    if output_blocked(config, POSTERIOR_SUFFIX) {
        let path = config.output_path(POSTERIOR_SUFFIX);
        info!(path = %path.display(), "posterior summary exists; skipping");
        return Ok(StageRun::without_summary(StageOutcome::Exists(path)));
    }

    // 1) Bins and the parameter schema they imply.
    let agebins = run_agebins(config, &Cosmology::default())?;
    let schema = ModelSchema::nonparametric_sfh(agebins, config.parameterization)?;

    // 2) Chain.
    let chain = load_chain(chain_path)?.data;
    info!(samples = chain.len(), params = schema.n_theta(), "loaded posterior chain");

    // 3) Post-process and persist.
    let opts = PosteriorOptions {
        ncalc: config.ncalc,
        seed: config.seed,
    };
    let summary = postprocess(&chain, &schema, &opts)?;
    let outcome = write_summary(config, POSTERIOR_SUFFIX, &summary)?;
    Ok(StageRun {
        outcome: outcome.into(),
        summary: Some(summary),
    })
}

/// Both stages for one galaxy. Either stage failing fails the galaxy.
pub fn run_galaxy(config: &RunConfig) -> Result<GalaxyRun, AppError> {
    config.validate()?;
    let span = info_span!("galaxy", objname = %config.objname);
    let _guard = span.enter();

    let emission = run_emission(config)?.outcome;
    let posterior = run_posterior(config)?.outcome;
    if emission == StageOutcome::NotConfigured && posterior == StageOutcome::NotConfigured {
        warn!("no chain or spectra configured; nothing to do");
    }
    Ok(GalaxyRun {
        objname: config.objname.clone(),
        emission,
        posterior,
    })
}

/// Run every galaxy of a manifest. A failing galaxy is logged and the batch moves on.
pub fn run_batch(manifest: &Path, base: &RunConfig) -> Result<BatchResults, AppError> {
    let galaxies = load_manifest(manifest, base)?.data;
    info!(galaxies = galaxies.len(), manifest = %manifest.display(), "starting batch");

    let mut results = Vec::with_capacity(galaxies.len());
    for config in &galaxies {
        let result = run_galaxy(config);
        if let Err(err) = &result {
            error!(objname = %config.objname, code = err.exit_code(), "{err}");
        }
        results.push((config.objname.clone(), result));
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!(failed, total = results.len(), "batch finished with failures");
        for (objname, result) in &results {
            if let Err(err) = result {
                warn!(objname = %objname, "failed: {err}");
            }
        }
    } else {
        info!(total = results.len(), "batch finished");
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> RunConfig {
        RunConfig {
            objname: "ngc0337".into(),
            runname: "test".into(),
            outdir: dir.path().join("out"),
            redshift: 0.01,
            ncalc: 40,
            ..RunConfig::default()
        }
    }

    fn write_chain(dir: &tempfile::TempDir) -> PathBuf {
        let mut body = String::from("logmass,logsfr_ratios_1,logsfr_ratios_2,logsfr_ratios_3,logsfr_ratios_4,logsfr_ratios_5,logsfr_ratios_6,weight\n");
        for i in 0..100 {
            let m = 9.5 + 0.01 * i as f64;
            body.push_str(&format!("{m},0.1,-0.1,0.0,0.2,0.0,-0.2,1.0\n"));
        }
        let path = dir.path().join("chain.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn agebins_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let bins = run_agebins(&config(&dir), &Cosmology::default()).unwrap();
        assert_eq!(bins.len(), 7);
        assert_eq!(bins.bins()[0], [0.0, 7.4772]);
    }

    #[test]
    fn posterior_stage_writes_then_respects_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.chain = Some(write_chain(&dir));

        let run = run_posterior(&cfg).unwrap();
        assert!(matches!(run.outcome, StageOutcome::Written(_)));
        let summary = run.summary.unwrap();
        assert_eq!(summary.sample_idx.len(), 40);

        let again = run_posterior(&cfg).unwrap();
        assert!(matches!(again.outcome, StageOutcome::Exists(_)));
        assert!(again.summary.is_none());
    }

    #[test]
    fn unconfigured_stages_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_galaxy(&config(&dir)).unwrap();
        assert_eq!(run.emission, StageOutcome::NotConfigured);
        assert_eq!(run.posterior, StageOutcome::NotConfigured);
    }

    #[test]
    fn batch_keeps_going_after_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let chain = write_chain(&dir);
        let manifest = dir.path().join("manifest.csv");
        std::fs::write(
            &manifest,
            format!("objname,redshift,chain\ngood,0.01,{}\nbad,0.01,missing.csv\n", chain.display()),
        )
        .unwrap();

        let results = run_batch(&manifest, &config(&dir)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(dir.path().join("out/test/good_post.json").exists());
        assert!(!dir.path().join("out/test/bad_post.json").exists());
    }
}
