//! Mathematical utilities: least squares, interpolation, smoothing, statistics, cosmology.

pub mod constants;
pub mod cosmology;
pub mod interp;
pub mod ols;
pub mod smooth;
pub mod stats;

pub use cosmology::Cosmology;
pub use interp::*;
pub use ols::*;
pub use smooth::*;
pub use stats::*;
