//! Benchmarks for fractal fitness evaluation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use num_complex::Complex32;

use fractal_genesis::{
    compute::evolution::{Breeder, FitnessEvaluator, GenomeRng},
    schema::{EvolutionParameters, FitnessWeights, FractalParams, Genome, RenderSettings},
};

fn bench_escape(c: &mut Criterion) {
    let params = Genome::default().apply_to_fractal(&FractalParams::default());

    c.bench_function("escape_origin_interior", |b| {
        b.iter(|| params.escape(black_box(Complex32::new(0.0, 0.0))));
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("fitness_evaluate");
    let genome = GenomeRng::new(42).random_genome();

    for size in [64, 128, 256] {
        let evaluator = FitnessEvaluator::new(
            FitnessWeights::default(),
            RenderSettings {
                image_size: size,
                ..Default::default()
            },
        );

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", size, size)),
            &size,
            |b, _| {
                b.iter(|| evaluator.evaluate(black_box(&genome)));
            },
        );
    }

    group.finish();
}

fn bench_breed(c: &mut Criterion) {
    let mut group = c.benchmark_group("breed");

    for population_size in [20, 50, 100] {
        let params = EvolutionParameters {
            population_size,
            ..Default::default()
        };
        let mut breeder = Breeder::new(7, &params);
        let mut population = breeder.initial_population(population_size);
        for (i, genome) in population.iter_mut().enumerate() {
            genome.fitness = i as f32 / population_size as f32;
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(population_size),
            &population_size,
            |b, _| {
                b.iter(|| {
                    breeder.observe(black_box(&population), &params, 1);
                    breeder.breed(black_box(&population), &params, 1)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_escape, bench_evaluate, bench_breed);
criterion_main!(benches);
