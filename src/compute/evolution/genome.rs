//! Genome manipulation utilities for evolutionary search.
//!
//! Provides random generation, crossover, and mutation operations.

use crate::schema::{Gene, Genome};
use rand::prelude::*;

/// Random number generator wrapper for genome operations.
///
/// Every stochastic step of the search draws from one explicit instance, so a
/// run is reproducible from its seed.
#[derive(Debug, Clone)]
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate a genome with every gene drawn uniformly within its bounds.
    pub fn random_genome(&mut self) -> Genome {
        let mut genome = Genome::default();
        for gene in genome.genes_mut() {
            gene.value = self.uniform((gene.min, gene.max));
        }
        genome
    }

    /// Uniform random in bounds.
    fn uniform(&mut self, bounds: (f32, f32)) -> f32 {
        if bounds.0 < bounds.1 {
            self.rng.gen_range(bounds.0..=bounds.1)
        } else {
            bounds.0
        }
    }

    /// Gaussian mutation: add noise scaled by the width of `bounds`.
    pub fn gaussian_mutate(&mut self, value: f32, strength: f32, bounds: (f32, f32)) -> f32 {
        let noise: f32 = self.rng.sample(rand_distr::StandardNormal);
        let mutated = value + noise * strength * (bounds.1 - bounds.0);
        mutated.clamp(bounds.0, bounds.1)
    }

    /// Mutate a genome in place.
    ///
    /// Each gene mutates with probability `gene.mutation_rate * global_rate`,
    /// receiving Gaussian noise with a standard deviation of a tenth of its range.
    pub fn mutate(&mut self, genome: &mut Genome, global_rate: f32) {
        for gene in genome.genes_mut() {
            self.mutate_gene(gene, global_rate);
        }
    }

    fn mutate_gene(&mut self, gene: &mut Gene, global_rate: f32) {
        if self.rng.r#gen::<f32>() < gene.mutation_rate * global_rate {
            gene.value = self.gaussian_mutate(gene.value, 0.1, (gene.min, gene.max));
        }
    }

    /// Uniform crossover between two genomes.
    ///
    /// Each value comes from either parent with equal probability. The child's
    /// per-gene mutation rate is the parental mean, raised to `rate_floor`.
    pub fn crossover(&mut self, parent1: &Genome, parent2: &Genome, rate_floor: f32) -> Genome {
        let mut child = Genome {
            fitness: 0.0,
            generation: 0,
            age: 0,
            parent_ids: vec![parent1.generation, parent2.generation],
            ..parent1.clone()
        };

        for (gene, other) in child.genes_mut().into_iter().zip(parent2.genes()) {
            if self.rng.gen_bool(0.5) {
                gene.set(other.value);
            }
            gene.mutation_rate = ((gene.mutation_rate + other.mutation_rate) * 0.5).max(rate_floor);
        }

        child
    }

    /// Pick an index in `0..len`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Uniform value in `[0, 1)`.
    pub fn unit(&mut self) -> f32 {
        self.rng.r#gen()
    }

    /// Bernoulli trial with probability `p`.
    pub fn chance(&mut self, p: f32) -> bool {
        self.unit() < p
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// Compute genetic distance between two genomes.
///
/// Sum of absolute differences over the structural genes only.
pub fn genome_distance(g1: &Genome, g2: &Genome) -> f32 {
    g1.structural_genes()
        .iter()
        .zip(g2.structural_genes())
        .map(|(a, b)| (a.value - b.value).abs())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_random_genome() {
        let mut rng = GenomeRng::new(42);
        let genome = rng.random_genome();
        assert!(genome.is_within_bounds());
        assert_ne!(genome, Genome::default());
    }

    #[test]
    fn test_crossover() {
        let mut rng = GenomeRng::new(42);
        let mut g1 = rng.random_genome();
        let mut g2 = rng.random_genome();
        g1.generation = 3;
        g2.generation = 4;

        let child = rng.crossover(&g1, &g2, 0.0);
        assert_eq!(child.parent_ids, vec![3, 4]);
        assert_eq!(child.fitness, 0.0);

        for ((c, a), b) in child.genes().iter().zip(g1.genes()).zip(g2.genes()) {
            assert!(c.value == a.value || c.value == b.value);
        }
    }

    #[test]
    fn test_crossover_averages_rates() {
        let mut rng = GenomeRng::new(7);
        let g1 = Genome::default();
        let mut g2 = Genome::default();
        for gene in g2.genes_mut() {
            gene.mutation_rate = 0.0;
        }

        let child = rng.crossover(&g1, &g2, 0.0);
        assert!((child.julia_real.mutation_rate - 0.025).abs() < 1e-6);

        let floored = rng.crossover(&g2, &g2, 0.04);
        assert!(floored.genes().iter().all(|g| g.mutation_rate == 0.04));
    }

    #[test]
    fn test_mutation() {
        let mut rng = GenomeRng::new(42);
        let mut genome = Genome::default();

        // Rates are at most 0.3, so a large global rate mutates every gene.
        rng.mutate(&mut genome, 10.0);

        assert!(genome.is_within_bounds());
        assert_ne!(genome, Genome::default());
    }

    #[test]
    fn test_zero_rate_leaves_genome_untouched() {
        let mut rng = GenomeRng::new(1);
        let mut genome = rng.random_genome();
        let original = genome.clone();
        rng.mutate(&mut genome, 0.0);
        assert_eq!(genome, original);
    }

    #[test]
    fn test_determinism() {
        let run = |seed| {
            let mut rng = GenomeRng::new(seed);
            let a = rng.random_genome();
            let b = rng.random_genome();
            let mut child = rng.crossover(&a, &b, 0.0);
            rng.mutate(&mut child, 2.0);
            child
        };
        assert_eq!(run(99), run(99));
        assert_ne!(run(99), run(100));
    }

    #[test]
    fn test_genome_distance() {
        let mut rng = GenomeRng::new(42);
        let g1 = rng.random_genome();
        let g2 = g1.clone();
        let g3 = rng.random_genome();

        assert!((genome_distance(&g1, &g2)).abs() < 1e-6);
        assert!(genome_distance(&g1, &g3) > 0.0);
    }

    #[test]
    fn test_distance_ignores_cosmetic_genes() {
        let g1 = Genome::default();
        let mut g2 = Genome::default();
        g2.deform_mix.set(1.0);
        g2.function_blend.set(1.0);
        g2.edge_saturation.set(0.0);
        g2.edge_glow_a.set(2.0);
        assert_eq!(genome_distance(&g1, &g2), 0.0);

        g2.julia_real.set(1.355);
        assert!((genome_distance(&g1, &g2) - 1.0).abs() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_operators_respect_bounds(seed in any::<u64>(), rate in 0.0f32..20.0, rounds in 1usize..20) {
            let mut rng = GenomeRng::new(seed);
            let mut a = rng.random_genome();
            let mut b = rng.random_genome();
            for _ in 0..rounds {
                let mut child = rng.crossover(&a, &b, 0.0);
                rng.mutate(&mut child, rate);
                prop_assert!(child.is_within_bounds());
                a = b;
                b = child;
            }
        }

        #[test]
        fn prop_distance_symmetric(s1 in any::<u64>(), s2 in any::<u64>()) {
            let a = GenomeRng::new(s1).random_genome();
            let b = GenomeRng::new(s2).random_genome();
            prop_assert_eq!(genome_distance(&a, &b), genome_distance(&b, &a));
            prop_assert_eq!(genome_distance(&a, &a), 0.0);
        }
    }
}
