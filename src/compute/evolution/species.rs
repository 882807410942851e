//! Speciation and fitness sharing.
//!
//! Individuals are grouped greedily by genetic distance. Selection fitness is
//! divided by species size, scaled by the diversity pressure, so large niches
//! cannot crowd out small ones.

use super::genome::genome_distance;
use crate::schema::Genome;

/// Additive step applied to the compatibility threshold each generation.
const THRESHOLD_STEP: f32 = 0.1;

/// Lower bound for the compatibility threshold.
const MIN_THRESHOLD: f32 = 0.05;

/// A niche of genetically similar individuals.
#[derive(Debug, Clone)]
pub struct Species {
    /// First individual assigned to the species.
    pub representative: Genome,
    /// Population indices of the members.
    pub members: Vec<usize>,
}

/// Partition `population` into species.
///
/// Each individual joins the first species whose representative lies within
/// `threshold`, otherwise it founds a new one. Every index appears in exactly
/// one species.
pub fn speciate(population: &[Genome], threshold: f32) -> Vec<Species> {
    let mut species: Vec<Species> = Vec::new();

    for (index, genome) in population.iter().enumerate() {
        let home = species
            .iter_mut()
            .find(|s| genome_distance(&s.representative, genome) < threshold);
        match home {
            Some(s) => s.members.push(index),
            None => species.push(Species {
                representative: genome.clone(),
                members: vec![index],
            }),
        }
    }

    species
}

/// Selection fitness for every individual.
///
/// Interpolates between raw fitness and raw fitness divided by species size,
/// with `pressure` as the weight.
pub fn shared_fitness(population: &[Genome], species: &[Species], pressure: f32) -> Vec<f32> {
    let mut adjusted: Vec<f32> = population.iter().map(|g| g.fitness).collect();
    let pressure = pressure.clamp(0.0, 1.0);

    for s in species {
        let size = s.members.len() as f32;
        for &i in &s.members {
            let raw = population[i].fitness;
            adjusted[i] = raw + (raw / size - raw) * pressure;
        }
    }

    adjusted
}

/// Move the threshold one step toward producing `target` species.
pub fn adjust_threshold(threshold: f32, found: usize, target: usize) -> f32 {
    let next = if found < target {
        threshold - THRESHOLD_STEP
    } else if found > target {
        threshold + THRESHOLD_STEP
    } else {
        threshold
    };
    next.max(MIN_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::GenomeRng;

    fn with_real(value: f32, fitness: f32) -> Genome {
        let mut genome = Genome::default();
        genome.julia_real.set(value);
        genome.fitness = fitness;
        genome
    }

    #[test]
    fn test_speciate_partitions_population() {
        let mut rng = GenomeRng::new(3);
        let population: Vec<Genome> = (0..30).map(|_| rng.random_genome()).collect();
        let species = speciate(&population, 2.0);

        let mut seen: Vec<usize> = species.iter().flat_map(|s| s.members.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_speciate_groups_by_distance() {
        let population = vec![
            with_real(0.0, 0.2),
            with_real(0.1, 0.4),
            with_real(1.5, 0.9),
        ];
        let species = speciate(&population, 0.5);

        assert_eq!(species.len(), 2);
        assert_eq!(species[0].members, vec![0, 1]);
        assert_eq!(species[1].members, vec![2]);
    }

    #[test]
    fn test_shared_fitness_pressure() {
        let population = vec![
            with_real(0.0, 0.6),
            with_real(0.1, 0.6),
            with_real(1.5, 0.6),
        ];
        let species = speciate(&population, 0.5);

        let none = shared_fitness(&population, &species, 0.0);
        assert_eq!(none, vec![0.6, 0.6, 0.6]);

        let full = shared_fitness(&population, &species, 1.0);
        assert!((full[0] - 0.3).abs() < 1e-6);
        assert!((full[2] - 0.6).abs() < 1e-6);

        let half = shared_fitness(&population, &species, 0.5);
        assert!((half[1] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_adjust_threshold() {
        assert!((adjust_threshold(2.0, 2, 5) - 1.9).abs() < 1e-6);
        assert!((adjust_threshold(2.0, 8, 5) - 2.1).abs() < 1e-6);
        assert_eq!(adjust_threshold(2.0, 5, 5), 2.0);
        assert_eq!(adjust_threshold(0.06, 1, 5), MIN_THRESHOLD);
    }
}
