//! `sedpost` library crate.
//!
//! The binary (`sedpost`) is a thin wrapper around this library so that:
//!
//! - the SFH transforms and line decomposition are testable without spawning processes
//! - posterior post-processing can be called from other tools on in-memory chains

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod lines;
pub mod math;
pub mod models;
pub mod params;
pub mod posterior;
pub mod report;
pub mod sfh;
