//! Fractal Genesis - Evolutionary search over deformable complex-plane fractals.
//!
//! A population of genomes, each describing a Julia-style iteration bent by
//! two blended nonlinear deformations, is evolved under an image-derived
//! fitness function to find visually interesting fractals.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Parameter, genome and statistics types
//! - `compute`: Escape-time iteration, fitness evaluation and the evolution engine
//!
//! # Example
//!
//! ```rust,no_run
//! use fractal_genesis::{EvolutionEngine, EvolutionParameters, FractalParams};
//!
//! let engine = EvolutionEngine::with_parameters(EvolutionParameters::default()).unwrap();
//! engine.initialize(7);
//! engine.start_evolution();
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! engine.stop_evolution();
//!
//! // Hand the winner to a renderer.
//! let params = engine.best_individual().apply_to_fractal(&FractalParams::default());
//! println!("Best constant: {:?}", params.julia_constant);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, FitnessEvaluator, FractalGallery, GenomeRng};
pub use schema::{EvolutionParameters, EvolutionStats, FractalParams, Genome};
