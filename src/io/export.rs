//! JSON summary export.
//!
//! Summaries are wrapped in a small envelope carrying the run identity and a UTC
//! timestamp, and written pretty-printed. Existing files are left alone unless the run
//! allows overwriting.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RunConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryFile<T> {
    pub tool: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub objname: String,
    pub runname: String,
    pub redshift: f64,
    pub summary: T,
}

/// What happened to an output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// The file exists and overwriting is off.
    Skipped(PathBuf),
}

impl<T> SummaryFile<T> {
    pub fn new(config: &RunConfig, summary: T) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
            objname: config.objname.clone(),
            runname: config.runname.clone(),
            redshift: config.redshift,
            summary,
        }
    }
}

/// `true` if the run's output for `suffix` already exists and may not be replaced.
pub fn output_blocked(config: &RunConfig, suffix: &str) -> bool {
    !config.overwrite && config.output_path(suffix).exists()
}

/// Write `summary` to `<outdir>/<runname>/<objname>_<suffix>.json`.
pub fn write_summary<T: Serialize>(config: &RunConfig, suffix: &str, summary: &T) -> Result<WriteOutcome, AppError> {
    let path = config.output_path(suffix);
    if !config.overwrite && path.exists() {
        return Ok(WriteOutcome::Skipped(path));
    }
    write_json(&path, &SummaryFile::new(config, summary))?;
    Ok(WriteOutcome::Written(path))
}

/// Pretty-print any serializable value to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", parent.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))
}
