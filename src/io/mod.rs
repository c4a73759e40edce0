//! Input/output helpers.
//!
//! - CSV / JSON ingest and validation (`ingest`)
//! - JSON summary export (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
