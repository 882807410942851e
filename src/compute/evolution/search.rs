//! Generational genetic algorithm over fractal genomes.
//!
//! [`Breeder`] owns all stochastic and adaptive state of a run: the RNG, the
//! annealed mutation rate, the best fitness seen so far and the speciation
//! threshold. It never evaluates fitness itself; the engine fills in
//! `Genome::fitness` and hands the population back for statistics and
//! reproduction.

use crate::schema::{EvolutionParameters, EvolutionStats, Genome, SelectionMethod, StopReason};

use super::genome::{GenomeRng, genome_distance};
use super::species::{Species, adjust_threshold, shared_fitness, speciate};

/// Improvements smaller than this do not reset the stagnation counter.
const IMPROVEMENT_EPSILON: f32 = 1e-4;

/// Generation best above which the best-found callback fires.
pub const BEST_FOUND_THRESHOLD: f32 = 0.9;

/// Selection, reproduction and bookkeeping for one evolution run.
#[derive(Debug, Clone)]
pub struct Breeder {
    rng: GenomeRng,
    mutation_rate: f32,
    best_ever: f32,
    stagnation_count: u32,
    threshold: f32,
    species: Vec<Species>,
    above_best_found: bool,
}

impl Breeder {
    /// Create a breeder seeded for reproducible runs.
    pub fn new(seed: u64, params: &EvolutionParameters) -> Self {
        Self {
            rng: GenomeRng::new(seed),
            mutation_rate: params.mutation_rate,
            best_ever: f32::NEG_INFINITY,
            stagnation_count: 0,
            threshold: params.compatibility_threshold,
            species: Vec::new(),
            above_best_found: false,
        }
    }

    /// Global mutation rate applied to the next offspring.
    pub fn mutation_rate(&self, params: &EvolutionParameters) -> f32 {
        if params.adaptive_mutation {
            self.mutation_rate
        } else {
            params.mutation_rate
        }
    }

    /// Species found by the last call to [`Breeder::observe`].
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Random population of `size` genomes.
    pub fn initial_population(&mut self, size: usize) -> Vec<Genome> {
        (0..size).map(|_| self.rng.random_genome()).collect()
    }

    /// Record an evaluated generation and summarize it.
    ///
    /// `completed` is the number of generations finished including this one.
    pub fn observe(
        &mut self,
        population: &[Genome],
        params: &EvolutionParameters,
        completed: u32,
    ) -> EvolutionStats {
        let (best, average) = fitness_summary(population);

        if best > self.best_ever + IMPROVEMENT_EPSILON {
            self.best_ever = best;
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }

        if params.speciation_enabled() {
            self.species = speciate(population, self.threshold);
            self.threshold = adjust_threshold(self.threshold, self.species.len(), params.species_count);
        } else {
            self.species.clear();
        }

        EvolutionStats {
            current_generation: completed,
            best_fitness: best,
            average_fitness: average,
            diversity_index: compute_diversity(population),
            stagnation_count: self.stagnation_count,
            current_mutation_rate: self.mutation_rate(params),
            species_count: self.species.len(),
            ..Default::default()
        }
    }

    /// Whether the run should end after the generation summarized by `stats`.
    pub fn should_stop(&self, stats: &EvolutionStats, params: &EvolutionParameters) -> Option<StopReason> {
        if stats.best_fitness >= params.target_fitness {
            return Some(StopReason::TargetReached);
        }
        if self.stagnation_count >= params.stagnation_generations {
            return Some(StopReason::Stagnation);
        }
        if stats.current_generation >= params.max_generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    /// True once each time the generation best rises above [`BEST_FOUND_THRESHOLD`].
    pub fn crossed_best_found(&mut self, generation_best: f32) -> bool {
        let above = generation_best > BEST_FOUND_THRESHOLD;
        let crossed = above && !self.above_best_found;
        self.above_best_found = above;
        crossed
    }

    /// Produce the next population from an evaluated one.
    ///
    /// The result always holds exactly `params.population_size` genomes. Elites
    /// are chosen by raw fitness; parents by shared fitness when speciation
    /// is active.
    pub fn breed(
        &mut self,
        population: &[Genome],
        params: &EvolutionParameters,
        next_generation: u32,
    ) -> Vec<Genome> {
        let size = params.population_size;
        if population.is_empty() {
            return self.initial_population(size);
        }

        let selection_fitness: Vec<f32> = if self.species_cover(population) {
            shared_fitness(population, &self.species, params.diversity_pressure)
        } else {
            population.iter().map(|g| g.fitness).collect()
        };

        let mut ranked: Vec<usize> = (0..population.len()).collect();
        ranked.sort_by(|&a, &b| selection_fitness[b].total_cmp(&selection_fitness[a]));

        let pool_size = (size / 2).max(1);
        let parents: Vec<usize> = (0..pool_size)
            .map(|_| self.select_index(params, &selection_fitness, &ranked))
            .collect();

        let mut next = Vec::with_capacity(size);

        let mut by_raw: Vec<&Genome> = population.iter().collect();
        by_raw.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        for elite in by_raw.into_iter().take(params.elite_count()) {
            let mut elite = elite.clone();
            elite.age += 1;
            next.push(elite);
        }

        let rate = self.mutation_rate(params);
        while next.len() < size {
            let parent1 = &population[parents[self.rng.index(parents.len())]];
            let parent2 = &population[parents[self.rng.index(parents.len())]];

            let mut child = if self.rng.chance(params.crossover_rate) {
                self.rng.crossover(parent1, parent2, params.gene_mutation_floor)
            } else {
                Genome {
                    fitness: 0.0,
                    age: 0,
                    parent_ids: vec![parent1.generation],
                    ..parent1.clone()
                }
            };

            self.rng.mutate(&mut child, rate);
            child.generation = next_generation;
            next.push(child);
        }

        if params.adaptive_mutation {
            self.mutation_rate = (self.mutation_rate * params.mutation_decay).max(params.min_mutation_rate);
        }

        next
    }

    /// Whether the last speciation partitions exactly this population.
    fn species_cover(&self, population: &[Genome]) -> bool {
        !self.species.is_empty()
            && self.species.iter().map(|s| s.members.len()).sum::<usize>() == population.len()
            && self
                .species
                .iter()
                .flat_map(|s| &s.members)
                .all(|&i| i < population.len())
    }

    /// Select a parent index using the configured method.
    fn select_index(&mut self, params: &EvolutionParameters, fitness: &[f32], ranked: &[usize]) -> usize {
        match params.selection {
            SelectionMethod::Tournament => {
                let mut best_idx = self.rng.index(fitness.len());
                for _ in 1..params.tournament_size.max(1) {
                    let idx = self.rng.index(fitness.len());
                    if fitness[idx] > fitness[best_idx] {
                        best_idx = idx;
                    }
                }
                best_idx
            }
            SelectionMethod::RouletteWheel => {
                let total: f32 = fitness.iter().map(|f| f.max(0.0)).sum();
                if total <= 0.0 {
                    return self.rng.index(fitness.len());
                }

                let target = self.rng.unit() * total;
                let mut cumulative = 0.0;
                for (i, f) in fitness.iter().enumerate() {
                    cumulative += f.max(0.0);
                    if cumulative >= target {
                        return i;
                    }
                }
                fitness.len() - 1
            }
            SelectionMethod::RankBased => {
                let n = ranked.len();
                let total_rank = n * (n + 1) / 2;
                let mut target = self.rng.index(total_rank);
                for (position, &i) in ranked.iter().enumerate() {
                    let rank = n - position;
                    if target < rank {
                        return i;
                    }
                    target -= rank;
                }
                ranked[0]
            }
        }
    }
}

/// Best and mean fitness of a population.
pub fn fitness_summary(population: &[Genome]) -> (f32, f32) {
    if population.is_empty() {
        return (0.0, 0.0);
    }
    let best = population
        .iter()
        .map(|g| g.fitness)
        .fold(f32::NEG_INFINITY, f32::max);
    let average = population.iter().map(|g| g.fitness).sum::<f32>() / population.len() as f32;
    (best, average)
}

/// Mean pairwise genetic distance.
pub fn compute_diversity(population: &[Genome]) -> f32 {
    if population.len() < 2 {
        return 0.0;
    }

    let mut total_distance = 0.0f32;
    let mut count = 0usize;

    for i in 0..population.len() {
        for j in (i + 1)..population.len() {
            total_distance += genome_distance(&population[i], &population[j]);
            count += 1;
        }
    }

    total_distance / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize) -> EvolutionParameters {
        EvolutionParameters {
            population_size: size,
            ..Default::default()
        }
    }

    /// Score genomes by how close their constant is to the origin.
    fn evaluate(population: &mut [Genome]) {
        for genome in population {
            let (re, im) = genome.julia_constant();
            genome.fitness = 1.0 / (1.0 + re * re + im * im);
        }
    }

    #[test]
    fn test_population_size_preserved() {
        let params = params(17);
        let mut breeder = Breeder::new(5, &params);
        let mut population = breeder.initial_population(17);

        for generation in 1..6 {
            evaluate(&mut population);
            breeder.observe(&population, &params, generation);
            population = breeder.breed(&population, &params, generation);
            assert_eq!(population.len(), 17);
            assert!(population.iter().all(|g| g.is_within_bounds()));
        }
    }

    #[test]
    fn test_elitism_keeps_best() {
        for selection in [
            SelectionMethod::Tournament,
            SelectionMethod::RouletteWheel,
            SelectionMethod::RankBased,
        ] {
            let params = EvolutionParameters {
                population_size: 20,
                elite_percentage: 0.1,
                selection,
                ..Default::default()
            };
            let mut breeder = Breeder::new(9, &params);
            let mut population = breeder.initial_population(20);
            let mut previous_best = f32::NEG_INFINITY;

            for generation in 1..10 {
                evaluate(&mut population);
                let stats = breeder.observe(&population, &params, generation);
                assert!(stats.best_fitness >= previous_best);
                previous_best = stats.best_fitness;
                population = breeder.breed(&population, &params, generation);
            }
        }
    }

    #[test]
    fn test_elites_age() {
        let params = EvolutionParameters {
            population_size: 10,
            elite_percentage: 0.2,
            ..Default::default()
        };
        let mut breeder = Breeder::new(1, &params);
        let mut population = breeder.initial_population(10);
        evaluate(&mut population);
        breeder.observe(&population, &params, 1);

        let next = breeder.breed(&population, &params, 1);
        assert_eq!(next[0].age, 1);
        assert_eq!(next[1].age, 1);
        assert!(next[2..].iter().all(|g| g.age == 0 && g.generation == 1 && g.fitness == 0.0));
    }

    #[test]
    fn test_adaptive_mutation_decays_to_floor() {
        let params = EvolutionParameters {
            population_size: 4,
            mutation_rate: 0.1,
            mutation_decay: 0.5,
            min_mutation_rate: 0.03,
            ..Default::default()
        };
        let mut breeder = Breeder::new(2, &params);
        let population = breeder.initial_population(4);

        breeder.breed(&population, &params, 1);
        assert!((breeder.mutation_rate(&params) - 0.05).abs() < 1e-6);
        breeder.breed(&population, &params, 2);
        assert!((breeder.mutation_rate(&params) - 0.03).abs() < 1e-6);

        let fixed = EvolutionParameters {
            adaptive_mutation: false,
            ..params
        };
        assert_eq!(breeder.mutation_rate(&fixed), 0.1);
    }

    #[test]
    fn test_stagnation_and_stop_reasons() {
        let params = EvolutionParameters {
            population_size: 2,
            max_generations: 100,
            stagnation_generations: 3,
            target_fitness: 0.95,
            ..Default::default()
        };
        let mut breeder = Breeder::new(0, &params);
        let mut population = vec![Genome::default(), Genome::default()];
        population[0].fitness = 0.5;

        let stats = breeder.observe(&population, &params, 1);
        assert_eq!(stats.stagnation_count, 0);
        assert_eq!(breeder.should_stop(&stats, &params), None);

        // A sub-epsilon gain counts as stagnation.
        population[0].fitness = 0.50005;
        let stats = (2..5)
            .map(|generation| breeder.observe(&population, &params, generation))
            .last()
            .unwrap();
        assert_eq!(stats.stagnation_count, 3);
        assert_eq!(breeder.should_stop(&stats, &params), Some(StopReason::Stagnation));

        population[0].fitness = 0.97;
        let stats = breeder.observe(&population, &params, 5);
        assert_eq!(breeder.should_stop(&stats, &params), Some(StopReason::TargetReached));
    }

    #[test]
    fn test_max_generations() {
        let params = EvolutionParameters {
            population_size: 2,
            max_generations: 3,
            ..Default::default()
        };
        let mut breeder = Breeder::new(0, &params);
        let mut population = vec![Genome::default(), Genome::default()];
        population[0].fitness = 0.1;

        let stats = breeder.observe(&population, &params, 3);
        assert_eq!(breeder.should_stop(&stats, &params), Some(StopReason::MaxGenerations));
    }

    #[test]
    fn test_best_found_fires_once_per_crossing() {
        let mut breeder = Breeder::new(0, &EvolutionParameters::default());
        assert!(!breeder.crossed_best_found(0.5));
        assert!(breeder.crossed_best_found(0.92));
        assert!(!breeder.crossed_best_found(0.95));
        assert!(!breeder.crossed_best_found(0.8));
        assert!(breeder.crossed_best_found(0.91));
    }

    #[test]
    fn test_speciation_toggle() {
        let mut params = params(12);
        let mut breeder = Breeder::new(4, &params);
        let mut population = breeder.initial_population(12);
        evaluate(&mut population);

        let stats = breeder.observe(&population, &params, 1);
        assert!(stats.species_count >= 1);
        assert_eq!(stats.species_count, breeder.species().len());

        params.diversity_pressure = 0.0;
        let stats = breeder.observe(&population, &params, 2);
        assert_eq!(stats.species_count, 0);
    }

    #[test]
    fn test_breed_ignores_species_of_another_population() {
        let params = params(8);
        let mut breeder = Breeder::new(6, &params);
        let mut observed = breeder.initial_population(8);
        evaluate(&mut observed);
        breeder.observe(&observed, &params, 1);
        assert!(!breeder.species().is_empty());

        let mut smaller = breeder.initial_population(4);
        evaluate(&mut smaller);
        let next = breeder.breed(&smaller, &params, 2);
        assert_eq!(next.len(), 8);
        assert!(next.iter().all(|g| g.is_within_bounds()));
    }

    #[test]
    fn test_diversity() {
        assert_eq!(compute_diversity(&[]), 0.0);
        assert_eq!(compute_diversity(&[Genome::default(), Genome::default()]), 0.0);

        let mut other = Genome::default();
        other.julia_real.set(1.355);
        let diversity = compute_diversity(&[Genome::default(), other]);
        assert!((diversity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_breed_is_deterministic() {
        let params = params(8);
        let run = || {
            let mut breeder = Breeder::new(77, &params);
            let mut population = breeder.initial_population(8);
            evaluate(&mut population);
            breeder.observe(&population, &params, 1);
            breeder.breed(&population, &params, 1)
        };
        assert_eq!(run(), run());
    }
}
