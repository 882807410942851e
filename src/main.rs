//! Fractal Genesis CLI - Run an evolution from JSON parameters.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fractal_genesis::{
    compute::evolution::{EvolutionEngine, FitnessEvaluator, FractalGallery},
    schema::EvolutionParameters,
};

/// Entries written to the gallery at the end of a run.
const GALLERY_SIZE: usize = 10;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <params.json> [seconds] [seed]", args[0]);
        eprintln!();
        eprintln!("Evolve deformable fractals from JSON evolution parameters.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  params.json  Path to evolution parameters");
        eprintln!("  seconds      Wall-clock budget for the run (default: 30)");
        eprintln!("  seed         Population seed (default: 0)");
        eprintln!();
        eprintln!("Example parameters are generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_parameters();
        return;
    }

    let params_path = PathBuf::from(&args[1]);
    let seconds: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(30);
    let seed: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);

    // Load parameters
    let params_str = fs::read_to_string(&params_path).unwrap_or_else(|e| {
        eprintln!("Error reading parameters file: {}", e);
        std::process::exit(1);
    });

    let params: EvolutionParameters = serde_json::from_str(&params_str).unwrap_or_else(|e| {
        eprintln!("Error parsing parameters: {}", e);
        std::process::exit(1);
    });

    let engine = EvolutionEngine::with_parameters(params.clone()).unwrap_or_else(|e| {
        eprintln!("Invalid parameters: {}", e);
        std::process::exit(1);
    });

    println!("Fractal Genesis");
    println!("===============");
    println!("Population: {}", params.population_size);
    println!("Max generations: {}", params.max_generations);
    println!(
        "Render: {}x{} px, {} iterations, {:?}",
        params.render.image_size,
        params.render.image_size,
        params.render.max_iterations,
        params.render.mode
    );
    println!("Budget: {}s, seed {}", seconds, seed);
    println!();

    // Genomes that crossed the best-found threshold during the run
    let discoveries = Arc::new(Mutex::new(FractalGallery::new()));
    let sink = Arc::clone(&discoveries);
    engine.set_best_found_callback(move |genome, fitness| {
        if let Ok(mut gallery) = sink.lock() {
            let name = gallery.add(genome, fitness, "", "best found during run");
            gallery.add_tags(&name, &["discovery"]);
        }
    });

    let report_every = (params.max_generations / 10).max(1);
    engine.set_generation_callback(move |generation, stats| {
        if generation % report_every == 0 {
            println!(
                "  Generation {}: best={:.4}, avg={:.4}, diversity={:.3}, species={}, {:.1} gen/s",
                generation,
                stats.best_fitness,
                stats.average_fitness,
                stats.diversity_index,
                stats.species_count,
                stats.generations_per_second
            );
        }
    });

    // Run evolution
    println!("Running evolution...");
    let start = Instant::now();
    let budget = Duration::from_secs(seconds);

    engine.initialize(seed);
    engine.start_evolution();
    while engine.is_running() && start.elapsed() < budget {
        thread::sleep(Duration::from_millis(50));
    }
    engine.stop_evolution();

    let elapsed = start.elapsed();
    let stats = engine.stats();

    println!();
    println!("Final state:");
    println!("  Generations: {}", stats.current_generation);
    println!("  Best fitness: {:.4}", stats.best_fitness);
    println!("  Average fitness: {:.4}", stats.average_fitness);
    println!("  Mutation rate: {:.4}", stats.current_mutation_rate);
    println!("  Stop reason: {:?}", stats.stop_reason);
    println!("  Time: {:.2}s", elapsed.as_secs_f32());

    // Write the best individuals next to the parameters file
    let evaluator = FitnessEvaluator::new(params.fitness_weights, params.render);
    let mut gallery = discoveries
        .lock()
        .map(|g| g.clone())
        .unwrap_or_default();
    for genome in engine.best_individuals(GALLERY_SIZE) {
        let name = gallery.add(&genome, genome.fitness, "", "");
        if let Ok(breakdown) = evaluator.evaluate_detailed(&genome) {
            gallery.set_breakdown(&name, &breakdown);
        }
    }

    let gallery_path = params_path.with_extension("gallery.json");
    match gallery.save_to_file(&gallery_path) {
        Ok(()) => println!("  Gallery: {} ({} entries)", gallery_path.display(), gallery.len()),
        Err(e) => eprintln!("Error saving gallery: {}", e),
    }

    if let Some(best) = gallery.best() {
        let fractal = best.genome.apply_to_fractal(&params.render.base_params());
        match serde_json::to_string_pretty(&fractal) {
            Ok(json) => {
                println!();
                println!("Best fractal:");
                println!("{}", json);
            }
            Err(e) => eprintln!("Error serializing fractal: {}", e),
        }
    }
}

fn print_example_parameters() {
    let params = EvolutionParameters::default();

    println!("Example parameters (params.json):");
    match serde_json::to_string_pretty(&params) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing parameters: {}", e),
    }
}
