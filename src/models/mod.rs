//! Spectral model components.
//!
//! Models are implemented as small, pure functions of `(x, params)` so that fitting code
//! can stay generic over them.

pub mod params;
pub mod profile;
pub mod umbrella;

pub use params::*;
pub use profile::*;
