//! Spectral line measurements: absorption, emission, break index and residual noise.

pub mod absorption;
pub mod catalog;
pub mod dn4000;
pub mod emission;
pub mod noise;

pub use absorption::{AbsorptionMeasurement, AbsorptionProfile, measure_abslines};
pub use dn4000::measure_dn4000;
pub use emission::{EmissionInputs, EmissionOptions, EmissionSummary, measure_emission};
