//! Compute module - Escape-time evaluation and evolutionary search.

mod escape;

pub mod evolution;

pub use escape::*;
