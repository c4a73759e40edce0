//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs logging
//! - parses CLI arguments into a `RunConfig`
//! - runs the per-galaxy pipeline
//! - prints terminal summaries

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AgebinsArgs, BatchArgs, Command, EmlinesArgs, PostprocessArgs, RunArgs};
use crate::domain::RunConfig;
use crate::error::AppError;
use crate::math::Cosmology;

pub mod pipeline;

/// Environment variable holding the log filter (`info` when unset).
pub const LOG_ENV: &str = "SEDPOST_LOG";

/// Entry point for the `sedpost` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Agebins(args) => handle_agebins(args),
        Command::Emlines(args) => handle_emlines(args),
        Command::Postprocess(args) => handle_postprocess(args),
        Command::Batch(args) => handle_batch(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // A second install (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_agebins(args: AgebinsArgs) -> Result<(), AppError> {
    let mut config = base_config(&args.run)?;
    args.sfh.apply(&mut config);
    config.validate()?;

    let cosmology = Cosmology::default();
    let tuniv = match args.tuniv {
        Some(gyr) => gyr * 1e9,
        None => cosmology.age_years(config.redshift),
    };
    let agebins = crate::sfh::construct_agebins(&config.fixed_edges, config.nbins, tuniv)?;
    println!("{}", crate::report::format_agebins(&agebins, config.redshift, tuniv));
    Ok(())
}

fn handle_emlines(args: EmlinesArgs) -> Result<(), AppError> {
    let mut config = base_config(&args.run)?;
    args.lines.apply(&mut config);
    config.observed = args.observed.or(config.observed);
    config.model_a = args.model_a.or(config.model_a);
    config.model_b = args.model_b.or(config.model_b);
    if config.observed.is_none() || config.model_a.is_none() || config.model_b.is_none() {
        return Err(AppError::new(
            2,
            "emlines needs --observed, --model-a and --model-b (or the same keys in --config).",
        ));
    }
    config.validate()?;

    let run = pipeline::run_emission(&config)?;
    if let Some(summary) = &run.summary {
        println!("{}", crate::report::format_emission_summary(&config.objname, summary));
    }
    println!("{}", crate::report::format_stage_outcome("emlines", &run.outcome));
    Ok(())
}

fn handle_postprocess(args: PostprocessArgs) -> Result<(), AppError> {
    let mut config = base_config(&args.run)?;
    args.sfh.apply(&mut config);
    config.chain = args.chain.or(config.chain);
    if config.chain.is_none() {
        return Err(AppError::new(2, "postprocess needs --chain (or `chain` in --config)."));
    }
    config.validate()?;

    let run = pipeline::run_posterior(&config)?;
    if let Some(summary) = &run.summary {
        println!("{}", crate::report::format_posterior_summary(&config.objname, summary));
    }
    println!("{}", crate::report::format_stage_outcome("postprocess", &run.outcome));
    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let mut config = base_config(&args.run)?;
    args.sfh.apply(&mut config);
    args.lines.apply(&mut config);

    let results = pipeline::run_batch(&args.manifest, &config)?;
    let tally = crate::report::tally_batch(&results);
    println!("{}", crate::report::format_batch_report(&tally));

    if tally.failed.is_empty() {
        Ok(())
    } else {
        Err(AppError::new(
            1,
            format!("{} of {} galaxies failed.", tally.failed.len(), tally.galaxies),
        ))
    }
}

/// `--config` JSON (or defaults) with the shared flags applied on top.
pub fn base_config(args: &RunArgs) -> Result<RunConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RunConfig::default(),
    };
    args.apply(&mut config);
    Ok(config)
}

fn load_config(path: &Path) -> Result<RunConfig, AppError> {
    let config = crate::io::load_run_config(path)?;
    tracing::debug!(path = %path.display(), "loaded run config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"runname": "brownseds", "seed": 3, "redshift": 0.02}"#).unwrap();

        let args = RunArgs {
            config: Some(path),
            seed: Some(11),
            ..RunArgs::default()
        };
        let cfg = base_config(&args).unwrap();
        assert_eq!(cfg.runname, "brownseds");
        assert_eq!(cfg.seed, 11);
        assert!((cfg.redshift - 0.02).abs() < 1e-12);
        assert_eq!(cfg.nbins, RunConfig::default().nbins);
    }

    #[test]
    fn missing_config_file_is_a_usage_error() {
        let args = RunArgs {
            config: Some("/nonexistent/run.json".into()),
            ..RunArgs::default()
        };
        assert_eq!(base_config(&args).unwrap_err().exit_code(), 2);
    }
}
