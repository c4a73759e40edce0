//! Model-parameter schema with explicit dependency edges.

pub mod schema;

pub use schema::*;
