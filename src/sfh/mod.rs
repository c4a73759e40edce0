//! Non-parametric star-formation histories: age bins, the sampler-parameter ↔ bin-mass
//! transforms, and quantities derived from binned masses.

pub mod agebins;
pub mod stats;
pub mod transform;

pub use agebins::*;
pub use stats::*;
pub use transform::*;
