//! Posterior post-processing: weighted sample selection and SFH-derived summaries.

pub mod chain;
pub mod derive;

pub use chain::{Chain, select_samples};
pub use derive::{PosteriorOptions, PosteriorSummary, SampleQuantities, SfhSummary, derive_sample, postprocess};
