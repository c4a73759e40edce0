//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - validated spectra and continuum models (`Spectrum`, `ContinuumModel`)
//! - persisted summary forms (`Percentiles`, `QuantitySummary`, `LineStatus`)
//! - run configuration (`RunConfig`, `SfhParameterization`)

pub mod types;

pub use types::*;
