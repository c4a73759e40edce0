//! Terminal formatting for run summaries.
//!
//! Everything here returns a `String`; the caller decides where it goes.

use crate::app::pipeline::StageOutcome;
use crate::domain::{LineStatus, Percentiles};
use crate::lines::EmissionSummary;
use crate::posterior::PosteriorSummary;
use crate::report::BatchTally;
use crate::sfh::AgeBins;

/// Age bin table: log10 edges plus linear edges and widths in Gyr.
pub fn format_agebins(agebins: &AgeBins, redshift: f64, tuniv_years: f64) -> String {
    let mut out = String::new();

    out.push_str("=== sedpost - age bins ===\n");
    out.push_str(&format!(
        "z={redshift:.4} | t_univ={:.3} Gyr | nbins={}\n\n",
        tuniv_years / 1e9,
        agebins.len()
    ));

    out.push_str(&format!(
        "{:>4} {:>9} {:>9} {:>11} {:>11} {:>11}\n",
        "bin", "log_lo", "log_hi", "t_lo[Gyr]", "t_hi[Gyr]", "dt[Gyr]"
    ));
    out.push_str(&format!(
        "{:->4} {:->9} {:->9} {:->11} {:->11} {:->11}\n",
        "", "", "", "", "", ""
    ));
    for (i, (bin, width)) in agebins.bins().iter().zip(agebins.widths()).enumerate() {
        out.push_str(&format!(
            "{:>4} {:>9.4} {:>9.4} {:>11.5} {:>11.5} {:>11.5}\n",
            i + 1,
            bin[0],
            bin[1],
            10f64.powf(bin[0]) / 1e9,
            10f64.powf(bin[1]) / 1e9,
            width / 1e9,
        ));
    }

    out
}

/// Line fluxes and indices of one decomposition.
pub fn format_emission_summary(objname: &str, summary: &EmissionSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== sedpost - emission lines: {objname} ===\n"));
    out.push_str(&format!(
        "z={:.5} | zadj={:+.2e} | sigma={:.1} km/s | noise={:.3e} Lsun/A\n",
        summary.redshift, summary.zadj, summary.sigma_spec, summary.noise
    ));
    out.push_str(&format!(
        "Dn4000 (obs): {} | Hdelta EQW (obs): {} A{}\n",
        fmt_opt(summary.observed.dn4000),
        fmt_pct(&summary.observed.hdelta_eqw),
        fmt_status(summary.observed.status),
    ));

    for model in &summary.models {
        out.push_str(&format!(
            "\n[{}]{} sigsmooth={:.1} km/s | Dn4000={} | Ha/Hb={} | boot failures={}\n",
            model.model,
            fmt_status(model.status),
            model.sigsmooth,
            fmt_opt(model.dn4000),
            fmt_opt(model.balmer_decrement),
            model.bootstrap_failures,
        ));
        out.push_str(&format!(
            "{:<16} {:>10} {:>34} {:>26}\n",
            "line", "lam[A]", "flux[erg/s/cm2] q50 (q16, q84)", "eqw[A] q50 (q16, q84)"
        ));
        for line in &model.lines {
            out.push_str(&format!(
                "{:<16} {:>10.2} {:>34} {:>26}\n",
                truncate(&line.name, 16),
                line.rest_wavelength,
                fmt_pct(&line.flux),
                fmt_pct(&line.eqw_rest),
            ));
        }
        for abs in &model.absorption {
            out.push_str(&format!(
                "  abs {:<12} eqw={:>9.3} A at {:.2} A{}\n",
                abs.name,
                abs.eqw,
                abs.lam,
                fmt_status(abs.status)
            ));
        }
    }

    out
}

/// Posterior medians of the derived SFH quantities and every theta.
pub fn format_posterior_summary(objname: &str, summary: &PosteriorSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== sedpost - posterior: {objname} ===\n"));
    out.push_str(&format!(
        "samples={} | rejected={} | maxprob row={}\n",
        summary.sample_idx.len(),
        summary.rejected,
        summary.sample_idx.first().map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
    ));

    out.push_str("\nDerived:\n");
    for (name, q) in &summary.extras {
        out.push_str(&format!(
            "  {:<14} {:>12.4e} (+{:.3e} / -{:.3e})\n",
            name,
            q.q50,
            q.q84 - q.q50,
            q.q50 - q.q16
        ));
    }

    out.push_str("\nTheta:\n");
    for (name, q) in &summary.thetas {
        out.push_str(&format!(
            "  {:<20} {:>10.4} [{:.4}, {:.4}]\n",
            truncate(name, 20),
            q.q50,
            q.q16,
            q.q84
        ));
    }
    out.push_str(&format!("\nSFH grid (Gyr): {}\n", fmt_vec(&summary.sfh.t)));

    out
}

/// One line per stage outcome.
pub fn format_stage_outcome(stage: &str, outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Written(path) => format!("{stage}: wrote {}", path.display()),
        StageOutcome::Exists(path) => format!("{stage}: {} exists (use --overwrite)", path.display()),
        StageOutcome::Gated => format!("{stage}: skipped, spectral sampling too coarse near H alpha"),
        StageOutcome::NotConfigured => format!("{stage}: not configured"),
    }
}

/// End-of-batch report listing every failed galaxy.
pub fn format_batch_report(tally: &BatchTally) -> String {
    let mut out = String::new();

    out.push_str("=== sedpost - batch ===\n");
    out.push_str(&format!(
        "galaxies={} | written={} | existing={} | gated={} | failed={}\n",
        tally.galaxies,
        tally.written,
        tally.existing,
        tally.gated,
        tally.failed.len()
    ));
    if !tally.failed.is_empty() {
        out.push_str("\nFailed:\n");
        for (objname, message) in &tally.failed {
            out.push_str(&format!("- {objname}: {message}\n"));
        }
    }

    out
}

fn fmt_pct(p: &Percentiles) -> String {
    if p.q50.is_nan() {
        return "-".to_string();
    }
    format!("{:.3e} ({:.3e}, {:.3e})", p.q50, p.q16, p.q84)
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.3}"),
        _ => "-".to_string(),
    }
}

fn fmt_status(status: LineStatus) -> &'static str {
    match status {
        LineStatus::Ok => "",
        LineStatus::FitFailed => " (fit failed)",
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfh::AgeBins;

    #[test]
    fn agebins_table_has_one_row_per_bin() {
        let bins = AgeBins::from_edges(&[0.0, 8.0, 9.0, 10.0]).unwrap();
        let text = format_agebins(&bins, 0.0, 1e10);
        let rows = text.lines().filter(|l| l.trim_start().starts_with(char::is_numeric)).count();
        assert_eq!(rows, 3);
        assert!(text.contains("nbins=3"));
        assert!(text.contains("10.00000"));
    }

    #[test]
    fn batch_report_lists_failures() {
        let tally = BatchTally {
            galaxies: 2,
            written: 1,
            failed: vec![("ngc1275".to_string(), "chain has no samples".to_string())],
            ..BatchTally::default()
        };
        let text = format_batch_report(&tally);
        assert!(text.contains("failed=1"));
        assert!(text.contains("- ngc1275: chain has no samples"));
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(fmt_pct(&Percentiles::nan()), "-");
        assert_eq!(fmt_opt(None), "-");
        assert_eq!(fmt_opt(Some(f64::NAN)), "-");
        assert_eq!(truncate("logsfr_ratios_12", 8), "logsfr_.");
    }
}
