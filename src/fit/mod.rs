//! Nonlinear fitting.
//!
//! Responsibilities:
//!
//! - Levenberg–Marquardt over constrained parameter sets, with one perturbed retry
//! - parallel, deterministic parametric bootstrap

pub mod bootstrap;
pub mod lm;

pub use bootstrap::*;
pub use lm::*;
