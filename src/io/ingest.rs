//! CSV / JSON ingest.
//!
//! - spectra: `wavelength,flux` columns (case-insensitive, extra columns ignored)
//! - chains: one column per theta label plus `weight` and optional `lnprob`
//! - batch manifests: one galaxy per row
//! - run configs: `RunConfig` JSON
//!
//! Headers are matched after trimming, stripping a UTF-8 BOM and lowercasing. Rows that
//! fail to parse are skipped and reported; a file with no usable rows is an error.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::warn;

use crate::domain::{RunConfig, Spectrum};
use crate::error::AppError;
use crate::posterior::Chain;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed file plus per-row bookkeeping.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub data: T,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl<T> Ingested<T> {
    fn log_row_errors(&self, path: &Path) {
        if self.row_errors.is_empty() {
            return;
        }
        warn!(
            path = %path.display(),
            skipped = self.row_errors.len(),
            rows = self.rows_read,
            first = %self.row_errors[0].message,
            "skipped unparseable rows"
        );
    }
}

fn open_csv(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>, StringRecord), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{}': {e}", path.display())))?
        .clone();
    let header_map = build_header_map(&headers);
    Ok((reader, header_map, headers))
}

/// Load a two-column spectrum.
pub fn load_spectrum(path: &Path) -> Result<Ingested<Spectrum>, AppError> {
    let (mut reader, header_map, _) = open_csv(path)?;
    let wave_col = require_column(&header_map, "wavelength", path)?;
    let flux_col = require_column(&header_map, "flux", path)?;

    let mut wavelength = Vec::new();
    let mut flux = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| {
                let w = parse_field(&record, wave_col, "wavelength")?;
                let f = parse_field(&record, flux_col, "flux")?;
                Ok((w, f))
            });
        match parsed {
            Ok((w, f)) => {
                wavelength.push(w);
                flux.push(f);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if wavelength.is_empty() {
        return Err(AppError::new(3, format!("No valid rows in spectrum '{}'.", path.display())));
    }
    let spectrum = Spectrum::new(wavelength, flux)
        .map_err(|e| AppError::new(3, format!("Invalid spectrum '{}': {e}", path.display())))?;

    let out = Ingested {
        data: spectrum,
        row_errors,
        rows_read,
    };
    out.log_row_errors(path);
    Ok(out)
}

/// Load a weighted chain. Every column other than `weight` / `lnprob` is a theta label.
pub fn load_chain(path: &Path) -> Result<Ingested<Chain>, AppError> {
    let (mut reader, header_map, headers) = open_csv(path)?;
    let weight_col = require_column(&header_map, "weight", path)?;
    let lnprob_col = header_map.get("lnprob").copied();

    let theta_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, normalize_header_name(h)))
        .filter(|(i, _)| *i != weight_col && Some(*i) != lnprob_col)
        .collect();
    if theta_cols.is_empty() {
        return Err(AppError::new(2, format!("Chain '{}' has no theta columns.", path.display())));
    }

    let mut rows = Vec::new();
    let mut weights = Vec::new();
    let mut lnprob = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| {
                let theta = theta_cols
                    .iter()
                    .map(|(col, name)| parse_field(&record, *col, name))
                    .collect::<Result<Vec<f64>, String>>()?;
                let w = parse_field(&record, weight_col, "weight")?;
                let lp = match lnprob_col {
                    Some(col) => Some(parse_field(&record, col, "lnprob")?),
                    None => None,
                };
                Ok((theta, w, lp))
            });
        match parsed {
            Ok((theta, w, lp)) => {
                rows.push(theta);
                weights.push(w);
                if let Some(lp) = lp {
                    lnprob.push(lp);
                }
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let labels = theta_cols.into_iter().map(|(_, name)| name).collect();
    let lnprob = lnprob_col.map(|_| lnprob);
    let chain = Chain::new(labels, rows, weights, lnprob)
        .map_err(|e| AppError::new(3, format!("Invalid chain '{}': {e}", path.display())))?;

    let out = Ingested {
        data: chain,
        row_errors,
        rows_read,
    };
    out.log_row_errors(path);
    Ok(out)
}

/// Load a batch manifest: `objname` plus optional `redshift`, `chain`, `observed`,
/// `model_a`, `model_b` columns overriding `base`. Relative paths resolve against the
/// manifest's directory.
pub fn load_manifest(path: &Path, base: &RunConfig) -> Result<Ingested<Vec<RunConfig>>, AppError> {
    let (mut reader, header_map, _) = open_csv(path)?;
    let obj_col = require_column(&header_map, "objname", path)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut configs = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let objname = record.get(obj_col).unwrap_or("").to_string();
        if objname.is_empty() {
            row_errors.push(RowError {
                line,
                message: "missing objname".to_string(),
            });
            continue;
        }
        let mut cfg = base.clone();
        cfg.objname = objname;
        if let Some(z) = get_optional(&record, &header_map, "redshift") {
            match z.parse::<f64>() {
                Ok(z) => cfg.redshift = z,
                Err(_) => {
                    row_errors.push(RowError {
                        line,
                        message: format!("invalid redshift '{z}'"),
                    });
                    continue;
                }
            }
        }
        let resolve = |name: &str| get_optional(&record, &header_map, name).map(|p| resolve_path(&dir, p));
        cfg.chain = resolve("chain").or(cfg.chain);
        cfg.observed = resolve("observed").or(cfg.observed);
        cfg.model_a = resolve("model_a").or(cfg.model_a);
        cfg.model_b = resolve("model_b").or(cfg.model_b);
        configs.push(cfg);
    }

    if configs.is_empty() {
        return Err(AppError::new(3, format!("No galaxies in manifest '{}'.", path.display())));
    }
    let out = Ingested {
        data: configs,
        row_errors,
        rows_read,
    };
    out.log_row_errors(path);
    Ok(out)
}

/// Read a `RunConfig` JSON file. Missing fields take their defaults.
pub fn load_run_config(path: &Path) -> Result<RunConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open run config '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid run config '{}': {e}", path.display())))
}

fn resolve_path(dir: &Path, p: &str) -> PathBuf {
    let p = PathBuf::from(p);
    if p.is_absolute() { p } else { dir.join(p) }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(header_map: &HashMap<String, usize>, name: &str, path: &Path) -> Result<usize, AppError> {
    header_map
        .get(name)
        .copied()
        .ok_or_else(|| AppError::new(2, format!("Missing required column `{name}` in '{}'.", path.display())))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = *header_map.get(name)?;
    record.get(idx).filter(|s| !s.is_empty())
}

fn parse_field(record: &StringRecord, col: usize, name: &str) -> Result<f64, String> {
    let raw = record.get(col).ok_or_else(|| format!("missing `{name}`"))?;
    let v: f64 = raw.parse().map_err(|_| format!("invalid `{name}` value '{raw}'"))?;
    if v.is_finite() { Ok(v) } else { Err(format!("non-finite `{name}` value '{raw}'")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn spectrum_headers_are_case_insensitive_and_bom_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "spec.csv", "\u{feff}Wavelength, FLUX ,note\n4000,1.0,a\n4001,bad,b\n4002,1.5,c\n");
        let got = load_spectrum(&path).unwrap();
        assert_eq!(got.data.wavelength(), &[4000.0, 4002.0]);
        assert_eq!(got.data.flux(), &[1.0, 1.5]);
        assert_eq!(got.rows_read, 3);
        assert_eq!(got.row_errors.len(), 1);
        assert_eq!(got.row_errors[0].line, 3);
    }

    #[test]
    fn missing_flux_column_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "spec.csv", "wavelength,f\n1,2\n");
        assert_eq!(load_spectrum(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn unsorted_spectrum_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "spec.csv", "wavelength,flux\n2,1\n1,1\n");
        assert_eq!(load_spectrum(&path).unwrap_err().exit_code(), 3);
    }

    #[test]
    fn chain_columns_split_into_theta_weight_lnprob() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "chain.csv",
            "logmass,logsfr_ratios_1,weight,lnprob\n10.0,0.1,0.5,-3\n10.2,-0.1,0.5,-2\n",
        );
        let chain = load_chain(&path).unwrap().data;
        assert_eq!(chain.labels(), &["logmass".to_string(), "logsfr_ratios_1".to_string()]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.maxprob_index(), 1);
    }

    #[test]
    fn manifest_overrides_base_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "batch.csv", "objname,redshift,chain\nngc1,0.01,ngc1.csv\nngc2,,\n,0.2,\n");
        let base = RunConfig::default();
        let got = load_manifest(&path, &base).unwrap();
        assert_eq!(got.data.len(), 2);
        assert_eq!(got.data[0].redshift, 0.01);
        assert_eq!(got.data[0].chain.as_deref(), Some(dir.path().join("ngc1.csv").as_path()));
        assert_eq!(got.data[1].redshift, base.redshift);
        assert_eq!(got.row_errors.len(), 1);
    }

    #[test]
    fn run_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "run.json", r#"{"objname": "m51", "redshift": 0.002, "parameterization": "z_fraction"}"#);
        let cfg = load_run_config(&path).unwrap();
        assert_eq!(cfg.objname, "m51");
        assert_eq!(cfg.nbins, RunConfig::default().nbins);
        assert_eq!(cfg.parameterization, crate::domain::SfhParameterization::ZFraction);
    }
}
