//! Schema module - Parameter, genome and statistics types for fractal evolution.

mod evolution;
mod fractal;

pub use evolution::*;
pub use fractal::*;
