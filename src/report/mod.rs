//! Reporting utilities: batch tallies and formatted terminal output.

pub mod format;

pub use format::*;

use crate::app::pipeline::{BatchResults, StageOutcome};

/// Per-stage counts and failures for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub galaxies: usize,
    pub written: usize,
    pub existing: usize,
    pub gated: usize,
    /// `(objname, message)` of every failed galaxy, in batch order.
    pub failed: Vec<(String, String)>,
}

/// Count what each stage did across a batch.
pub fn tally_batch(results: &BatchResults) -> BatchTally {
    let mut tally = BatchTally {
        galaxies: results.len(),
        ..BatchTally::default()
    };
    for (objname, result) in results {
        match result {
            Ok(run) => {
                for stage in [&run.emission, &run.posterior] {
                    match stage {
                        StageOutcome::Written(_) => tally.written += 1,
                        StageOutcome::Exists(_) => tally.existing += 1,
                        StageOutcome::Gated => tally.gated += 1,
                        StageOutcome::NotConfigured => {}
                    }
                }
            }
            Err(err) => tally.failed.push((objname.clone(), err.to_string())),
        }
    }
    tally
}
