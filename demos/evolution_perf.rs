//! Quick evolution performance test

use fractal_genesis::{
    EvolutionEngine,
    schema::{EvolutionParameters, RenderSettings, SelectionMethod},
};
use std::thread;
use std::time::{Duration, Instant};

fn run(params: EvolutionParameters) -> (fractal_genesis::EvolutionStats, Duration) {
    let engine = match EvolutionEngine::with_parameters(params) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid parameters: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    engine.initialize(42);
    engine.start_evolution();
    while engine.is_running() {
        thread::sleep(Duration::from_millis(5));
    }
    engine.stop_evolution();

    (engine.stats(), start.elapsed())
}

fn main() {
    println!("=== Evolution Performance Test ===\n");

    // Test different render sizes
    for image_size in [32, 64, 128] {
        println!("Render size: {}x{}", image_size, image_size);

        let (stats, elapsed) = run(EvolutionParameters {
            population_size: 20,
            max_generations: 10,
            target_fitness: 2.0,
            render: RenderSettings {
                image_size,
                ..Default::default()
            },
            ..Default::default()
        });

        let total_evals = stats.current_generation as u64 * 20;
        println!("  Generations:    {}", stats.current_generation);
        println!("  Evaluations:    {}", total_evals);
        println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
        println!("  Evals/sec:      {:.1}", stats.evaluations_per_second);
        println!("  Best fitness:   {:.4}", stats.best_fitness);
        println!();
    }

    println!("=== Selection Methods (fixed 64x64 render) ===\n");

    for selection in [
        SelectionMethod::Tournament,
        SelectionMethod::RouletteWheel,
        SelectionMethod::RankBased,
    ] {
        let (stats, elapsed) = run(EvolutionParameters {
            population_size: 30,
            max_generations: 15,
            target_fitness: 2.0,
            selection,
            render: RenderSettings {
                image_size: 64,
                ..Default::default()
            },
            ..Default::default()
        });

        println!(
            "  {:?}: best={:.4}, avg={:.4}, diversity={:.3}, {:.2}s",
            selection,
            stats.best_fitness,
            stats.average_fitness,
            stats.diversity_index,
            elapsed.as_secs_f64()
        );
    }

    println!("\n=== Scalability Test (thread count) ===\n");

    for thread_count in [1, 2, 4, 0] {
        let (stats, elapsed) = run(EvolutionParameters {
            population_size: 40,
            max_generations: 5,
            target_fitness: 2.0,
            thread_count,
            render: RenderSettings {
                image_size: 64,
                ..Default::default()
            },
            ..Default::default()
        });

        let label = if thread_count == 0 {
            "auto".to_string()
        } else {
            thread_count.to_string()
        };
        println!(
            "  Threads {:>4}: {:.2}s, {:.1} evals/sec",
            label,
            elapsed.as_secs_f64(),
            stats.evaluations_per_second
        );
    }
}
