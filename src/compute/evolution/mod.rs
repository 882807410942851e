//! Evolutionary search module for discovering interesting fractals.
//!
//! # Overview
//!
//! The evolutionary search system consists of:
//!
//! - **Fitness** (`fitness`): renders a genome and scores the image
//! - **Genome Operations** (`genome`): random generation, crossover, mutation and distance
//! - **Speciation** (`species`): niche assignment and fitness sharing
//! - **Search** (`search`): selection, elitism, adaptive mutation and termination
//! - **Engine** (`engine`): background worker with pause, resume and stop
//! - **Gallery** (`gallery`): storage and export of the best fractals
//!
//! # Example
//!
//! ```rust,no_run
//! use fractal_genesis::compute::evolution::EvolutionEngine;
//! use fractal_genesis::schema::EvolutionParameters;
//!
//! let engine = EvolutionEngine::with_parameters(EvolutionParameters {
//!     population_size: 20,
//!     max_generations: 50,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! engine.set_generation_callback(|generation, stats| {
//!     println!("Generation {generation}: best fitness = {:.3}", stats.best_fitness);
//! });
//!
//! engine.initialize(42);
//! engine.start_evolution();
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! engine.stop_evolution();
//!
//! println!("Best fitness: {:.3}", engine.best_individual().fitness);
//! ```
//!
//! # Fitness Metrics
//!
//! - `Complexity`: local 3x3 standard deviation
//! - `Symmetry`: agreement with the horizontal mirror image
//! - `ColorDiversity`: entropy of the escape-value histogram
//! - `EdgeDefinition`: mean gradient magnitude
//! - `Stability`: prefers constants near the origin
//! - `Performance`: prefers low iteration caps

mod engine;
mod fitness;
mod gallery;
mod genome;
mod search;
mod species;

pub use engine::{BestFoundCallback, EvolutionEngine, GenerationCallback};
pub use fitness::{
    EscapeImage, FitnessBreakdown, FitnessError, FitnessEvaluator, MetricResult, render_params,
};
pub use gallery::{FractalGallery, GalleryEntry, GalleryError};
pub use genome::{GenomeRng, genome_distance};
pub use search::{BEST_FOUND_THRESHOLD, Breeder, compute_diversity};
pub use species::{Species, adjust_threshold, shared_fitness, speciate};
