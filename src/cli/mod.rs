//! Command-line parsing for the `sedpost` driver.
//!
//! Argument parsing and command dispatch stay separate from the numerical code. Every
//! run-level flag is optional so a `--config` JSON file can supply the value instead;
//! flags given on the command line win.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ModelUnits, RunConfig, SfhParameterization};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sedpost",
    version,
    about = "Post-processing for non-parametric SED fits: SFH quantities and emission lines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the SFH age bins for a redshift.
    Agebins(AgebinsArgs),
    /// Measure emission lines, Balmer absorption and Dn4000 for one galaxy.
    Emlines(EmlinesArgs),
    /// Turn one posterior chain into SFH-derived quantities.
    Postprocess(PostprocessArgs),
    /// Run both stages for every galaxy of a manifest CSV.
    Batch(BatchArgs),
}

/// Identity and output options shared by every subcommand.
#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    /// Run config JSON; command-line flags override its fields.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Galaxy name, used in output file names.
    #[arg(long)]
    pub objname: Option<String>,

    /// Run name; outputs go to `<outdir>/<runname>/`.
    #[arg(long)]
    pub runname: Option<String>,

    /// Output root directory.
    #[arg(long)]
    pub outdir: Option<PathBuf>,

    /// Replace existing output files.
    #[arg(long)]
    pub overwrite: bool,

    /// Random seed for sample selection and bootstrap noise.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Redshift of the fit.
    #[arg(short = 'z', long)]
    pub redshift: Option<f64>,
}

/// SFH binning and posterior options.
#[derive(Debug, Args, Clone, Default)]
pub struct SfhArgs {
    /// Number of SFH bins.
    #[arg(long)]
    pub nbins: Option<usize>,

    /// Leading fixed log10(yr) bin edges, comma separated (default 0,7.4772,8).
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub fixed_edges: Option<Vec<f64>>,

    /// How the chain parameterizes the SFH.
    #[arg(long, value_enum)]
    pub parameterization: Option<SfhParameterization>,

    /// Posterior samples to post-process.
    #[arg(long)]
    pub ncalc: Option<usize>,
}

/// Emission-line options.
#[derive(Debug, Args, Clone, Default)]
pub struct LineArgs {
    /// Bootstrap realizations per line fit.
    #[arg(long)]
    pub nboot: Option<usize>,

    /// Units of the first continuum model.
    #[arg(long, value_enum)]
    pub model_a_units: Option<ModelUnits>,

    /// Units of the second continuum model.
    #[arg(long, value_enum)]
    pub model_b_units: Option<ModelUnits>,
}

#[derive(Debug, Args, Clone)]
pub struct AgebinsArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub sfh: SfhArgs,

    /// Age of the universe (Gyr); defaults to the cosmological age at the redshift.
    #[arg(long)]
    pub tuniv: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct EmlinesArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub lines: LineArgs,

    /// Observed spectrum CSV (observed-frame wavelength, flux in Lsun/cm2/A).
    #[arg(long, value_name = "CSV")]
    pub observed: Option<PathBuf>,

    /// First continuum model CSV.
    #[arg(long, value_name = "CSV")]
    pub model_a: Option<PathBuf>,

    /// Second continuum model CSV.
    #[arg(long, value_name = "CSV")]
    pub model_b: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct PostprocessArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub sfh: SfhArgs,

    /// Posterior chain CSV (theta columns, `weight`, optional `lnprob`).
    #[arg(long, value_name = "CSV")]
    pub chain: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub sfh: SfhArgs,

    #[command(flatten)]
    pub lines: LineArgs,

    /// Manifest CSV: `objname` plus optional `redshift,chain,observed,model_a,model_b`.
    #[arg(long, value_name = "CSV")]
    pub manifest: PathBuf,
}

impl RunArgs {
    pub fn apply(&self, cfg: &mut RunConfig) {
        if let Some(v) = &self.objname {
            cfg.objname = v.clone();
        }
        if let Some(v) = &self.runname {
            cfg.runname = v.clone();
        }
        if let Some(v) = &self.outdir {
            cfg.outdir = v.clone();
        }
        if self.overwrite {
            cfg.overwrite = true;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.redshift {
            cfg.redshift = v;
        }
    }
}

impl SfhArgs {
    pub fn apply(&self, cfg: &mut RunConfig) {
        if let Some(v) = self.nbins {
            cfg.nbins = v;
        }
        if let Some(v) = &self.fixed_edges {
            cfg.fixed_edges = v.clone();
        }
        if let Some(v) = self.parameterization {
            cfg.parameterization = v;
        }
        if let Some(v) = self.ncalc {
            cfg.ncalc = v;
        }
    }
}

impl LineArgs {
    pub fn apply(&self, cfg: &mut RunConfig) {
        if let Some(v) = self.nboot {
            cfg.nboot = v;
        }
        if let Some(v) = self.model_a_units {
            cfg.model_a_units = v;
        }
        if let Some(v) = self.model_b_units {
            cfg.model_b_units = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postprocess_flags_parse() {
        let cli = Cli::parse_from([
            "sedpost",
            "postprocess",
            "--chain",
            "chain.csv",
            "--objname",
            "ngc4449",
            "--ncalc",
            "500",
            "--fixed-edges",
            "0,7,8",
            "--parameterization",
            "z-fraction",
            "--overwrite",
        ]);
        let Command::Postprocess(args) = cli.command else {
            panic!("expected postprocess");
        };
        let mut cfg = RunConfig::default();
        args.run.apply(&mut cfg);
        args.sfh.apply(&mut cfg);
        assert_eq!(cfg.objname, "ngc4449");
        assert_eq!(cfg.ncalc, 500);
        assert_eq!(cfg.fixed_edges, vec![0.0, 7.0, 8.0]);
        assert_eq!(cfg.parameterization, SfhParameterization::ZFraction);
        assert!(cfg.overwrite);
        assert_eq!(args.chain, Some(PathBuf::from("chain.csv")));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = Cli::parse_from(["sedpost", "emlines", "--nboot", "20"]);
        let Command::Emlines(args) = cli.command else {
            panic!("expected emlines");
        };
        let mut cfg = RunConfig {
            seed: 7,
            runname: "brownseds".into(),
            ..RunConfig::default()
        };
        args.run.apply(&mut cfg);
        args.lines.apply(&mut cfg);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.runname, "brownseds");
        assert_eq!(cfg.nboot, 20);
    }
}
