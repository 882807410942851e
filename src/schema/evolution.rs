//! Evolution configuration and genome types for fractal discovery.
//!
//! This module provides the parameter set driving the evolution engine, the
//! genetic representation of a deformable fractal, and the statistics records
//! published to viewers and exporters.

use serde::{Deserialize, Serialize};

use super::{DeformFunction, DeformState, FractalMode, FractalParams};

const PI: f32 = std::f32::consts::PI;

/// Top-level configuration for the evolution engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionParameters {
    /// Number of genomes in the population.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Maximum number of generations per run.
    #[serde(default = "default_max_generations")]
    pub max_generations: u32,
    /// Initial global mutation rate (multiplies each gene's own rate).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f32,
    /// Probability that offspring come from crossover rather than cloning.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    /// Fraction of the population carried over unchanged.
    #[serde(default = "default_elite_percentage")]
    pub elite_percentage: f32,
    /// Strength of fitness sharing between members of a species (0.0-1.0).
    #[serde(default = "default_diversity_pressure")]
    pub diversity_pressure: f32,
    /// Target number of species (0 disables speciation).
    #[serde(default = "default_species_count")]
    pub species_count: usize,
    /// Initial genetic distance below which genomes share a species.
    #[serde(default = "default_compatibility_threshold")]
    pub compatibility_threshold: f32,
    /// Anneal the global mutation rate every generation.
    #[serde(default = "default_adaptive_mutation")]
    pub adaptive_mutation: bool,
    /// Per-generation multiplier for the adaptive mutation rate.
    #[serde(default = "default_mutation_decay")]
    pub mutation_decay: f32,
    /// Floor for the adaptive mutation rate.
    #[serde(default = "default_min_mutation_rate")]
    pub min_mutation_rate: f32,
    /// Stop once the best fitness reaches this value.
    #[serde(default = "default_target_fitness")]
    pub target_fitness: f32,
    /// Stop after this many generations without improvement.
    #[serde(default = "default_stagnation_generations")]
    pub stagnation_generations: u32,
    /// Fitness evaluation threads (0 = auto-detect).
    #[serde(default)]
    pub thread_count: usize,
    /// Weights of the image statistics combined into fitness.
    #[serde(default)]
    pub fitness_weights: FitnessWeights,
    /// Parent selection strategy.
    #[serde(default)]
    pub selection: SelectionMethod,
    /// Individuals sampled per tournament.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Lower bound for per-gene mutation rates inherited through crossover.
    /// Zero keeps the plain parental average.
    #[serde(default)]
    pub gene_mutation_floor: f32,
    /// Canonical render used for fitness evaluation.
    #[serde(default)]
    pub render: RenderSettings,
}

impl Default for EvolutionParameters {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            max_generations: default_max_generations(),
            mutation_rate: default_mutation_rate(),
            crossover_rate: default_crossover_rate(),
            elite_percentage: default_elite_percentage(),
            diversity_pressure: default_diversity_pressure(),
            species_count: default_species_count(),
            compatibility_threshold: default_compatibility_threshold(),
            adaptive_mutation: default_adaptive_mutation(),
            mutation_decay: default_mutation_decay(),
            min_mutation_rate: default_min_mutation_rate(),
            target_fitness: default_target_fitness(),
            stagnation_generations: default_stagnation_generations(),
            thread_count: 0,
            fitness_weights: FitnessWeights::default(),
            selection: SelectionMethod::default(),
            tournament_size: default_tournament_size(),
            gene_mutation_floor: 0.0,
            render: RenderSettings::default(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_max_generations() -> u32 {
    1000
}
fn default_mutation_rate() -> f32 {
    0.15
}
fn default_crossover_rate() -> f32 {
    0.7
}
fn default_elite_percentage() -> f32 {
    0.1
}
fn default_diversity_pressure() -> f32 {
    0.2
}
fn default_species_count() -> usize {
    5
}
fn default_compatibility_threshold() -> f32 {
    2.0
}
fn default_adaptive_mutation() -> bool {
    true
}
fn default_mutation_decay() -> f32 {
    0.95
}
fn default_min_mutation_rate() -> f32 {
    0.01
}
fn default_target_fitness() -> f32 {
    0.95
}
fn default_stagnation_generations() -> u32 {
    50
}
fn default_tournament_size() -> usize {
    3
}

/// Parent selection method.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SelectionMethod {
    /// Best of `tournament_size` random draws.
    #[default]
    Tournament,
    /// Fitness-proportionate selection.
    RouletteWheel,
    /// Probability proportional to rank.
    RankBased,
}

/// Weights for the image statistics making up fitness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitnessWeights {
    pub complexity: f32,
    pub symmetry: f32,
    pub color_diversity: f32,
    pub edge_definition: f32,
    pub stability: f32,
    pub performance: f32,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            complexity: 0.3,
            symmetry: 0.1,
            color_diversity: 0.2,
            edge_definition: 0.15,
            stability: 0.03,
            performance: 0.02,
        }
    }
}

impl FitnessWeights {
    /// Weight applied to `metric`.
    pub fn weight(&self, metric: FitnessMetric) -> f32 {
        match metric {
            FitnessMetric::Complexity => self.complexity,
            FitnessMetric::Symmetry => self.symmetry,
            FitnessMetric::ColorDiversity => self.color_diversity,
            FitnessMetric::EdgeDefinition => self.edge_definition,
            FitnessMetric::Stability => self.stability,
            FitnessMetric::Performance => self.performance,
        }
    }
}

/// Image statistics combined into fitness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FitnessMetric {
    /// Mean local 3x3 standard deviation.
    Complexity,
    /// Agreement with the horizontal mirror image.
    Symmetry,
    /// Normalized entropy of a 10-bin value histogram.
    ColorDiversity,
    /// Mean gradient magnitude.
    EdgeDefinition,
    /// Penalty for constants that diverge at once or never escape.
    Stability,
    /// Preference for cheaper iteration caps.
    Performance,
}

impl FitnessMetric {
    /// All metrics in evaluation order.
    pub const ALL: [FitnessMetric; 6] = [
        Self::Complexity,
        Self::Symmetry,
        Self::ColorDiversity,
        Self::EdgeDefinition,
        Self::Stability,
        Self::Performance,
    ];

    /// Snake-case name, matching the weight field.
    pub fn name(self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::Symmetry => "symmetry",
            Self::ColorDiversity => "color_diversity",
            Self::EdgeDefinition => "edge_definition",
            Self::Stability => "stability",
            Self::Performance => "performance",
        }
    }
}

/// Canonical render settings for fitness evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RenderSettings {
    /// Side length of the square scalar field, in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    /// Iteration cap per pixel.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Julia- or Mandelbrot-style iteration.
    #[serde(default)]
    pub mode: FractalMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            max_iterations: default_max_iterations(),
            mode: FractalMode::Julia,
        }
    }
}

fn default_image_size() -> usize {
    256
}
fn default_max_iterations() -> u32 {
    100
}

impl RenderSettings {
    /// Base fractal parameters carrying these settings.
    pub fn base_params(&self) -> FractalParams {
        FractalParams {
            mode: self.mode,
            max_iterations: self.max_iterations,
            ..Default::default()
        }
    }
}

// ============================================================================
// Genome Representation
// ============================================================================

/// A bounded, mutation-tagged scalar parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Gene {
    /// Current value, always within `[min, max]`.
    pub value: f32,
    /// Per-gene mutation probability.
    pub mutation_rate: f32,
    pub min: f32,
    pub max: f32,
}

impl Gene {
    /// Create a gene; the value is clamped into its bounds.
    pub fn new(value: f32, mutation_rate: f32, min: f32, max: f32) -> Self {
        Self {
            value: value.clamp(min, max),
            mutation_rate,
            min,
            max,
        }
    }

    /// Width of the allowed range.
    #[inline]
    pub fn range(&self) -> f32 {
        self.max - self.min
    }

    /// Set the value, clamped into bounds. Non-finite input is ignored.
    #[inline]
    pub fn set(&mut self, value: f32) {
        if value.is_finite() {
            self.value = value.clamp(self.min, self.max);
        }
    }

    /// Whether the value lies within bounds.
    #[inline]
    pub fn in_bounds(&self) -> bool {
        self.value >= self.min && self.value <= self.max
    }
}

/// Number of genes in a genome.
pub const GENE_COUNT: usize = 19;

/// Number of genes compared by the genetic distance.
pub const STRUCTURAL_GENE_COUNT: usize = 11;

/// Gene names in canonical order.
pub const GENE_NAMES: [&str; GENE_COUNT] = [
    "julia_real",
    "julia_imag",
    "escape_threshold",
    "angle_a",
    "freq_a",
    "phase_a",
    "function_a",
    "edge_glow_a",
    "edge_hue_shift_a",
    "angle_b",
    "freq_b",
    "phase_b",
    "function_b",
    "edge_glow_b",
    "edge_hue_shift_b",
    "function_blend",
    "deform_mix",
    "shift",
    "edge_saturation",
];

/// Genetic representation of one deformable fractal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genome {
    pub julia_real: Gene,
    pub julia_imag: Gene,
    pub escape_threshold: Gene,

    pub angle_a: Gene,
    pub freq_a: Gene,
    pub phase_a: Gene,
    pub function_a: Gene,
    pub edge_glow_a: Gene,
    pub edge_hue_shift_a: Gene,

    pub angle_b: Gene,
    pub freq_b: Gene,
    pub phase_b: Gene,
    pub function_b: Gene,
    pub edge_glow_b: Gene,
    pub edge_hue_shift_b: Gene,

    pub function_blend: Gene,
    pub deform_mix: Gene,
    pub shift: Gene,
    pub edge_saturation: Gene,

    /// Fitness from the last evaluation; stale until re-evaluated.
    #[serde(default)]
    pub fitness: f32,
    /// Generation this genome was created in.
    #[serde(default)]
    pub generation: u32,
    /// Generations survived through elitism.
    #[serde(default)]
    pub age: u32,
    /// Generations of the parents this genome was bred from.
    #[serde(default)]
    pub parent_ids: Vec<u32>,
}

impl Default for Genome {
    fn default() -> Self {
        Self {
            julia_real: Gene::new(0.355, 0.05, -2.0, 2.0),
            julia_imag: Gene::new(0.355, 0.05, -2.0, 2.0),
            escape_threshold: Gene::new(4.0, 0.02, 2.0, 10.0),

            angle_a: Gene::new(0.0, 0.1, -PI, PI),
            freq_a: Gene::new(1.0, 0.08, 0.1, 3.0),
            phase_a: Gene::new(0.0, 0.1, -PI, PI),
            function_a: Gene::new(0.0, 0.3, 0.0, 10.0),
            edge_glow_a: Gene::new(1.0, 0.05, 0.1, 2.0),
            edge_hue_shift_a: Gene::new(1.0, 0.05, 0.1, 2.0),

            angle_b: Gene::new(0.0, 0.1, -PI, PI),
            freq_b: Gene::new(1.0, 0.08, 0.1, 3.0),
            phase_b: Gene::new(0.0, 0.1, -PI, PI),
            function_b: Gene::new(1.0, 0.3, 0.0, 10.0),
            edge_glow_b: Gene::new(1.0, 0.05, 0.1, 2.0),
            edge_hue_shift_b: Gene::new(1.0, 0.05, 0.1, 2.0),

            function_blend: Gene::new(0.0, 0.03, 0.0, 1.0),
            deform_mix: Gene::new(0.0, 0.03, 0.0, 1.0),
            shift: Gene::new(0.0, 0.05, -2.0, 2.0),
            edge_saturation: Gene::new(1.0, 0.02, 0.0, 2.0),

            fitness: 0.0,
            generation: 0,
            age: 0,
            parent_ids: Vec::new(),
        }
    }
}

impl Genome {
    /// All genes in canonical order (see [`GENE_NAMES`]).
    pub fn genes(&self) -> [&Gene; GENE_COUNT] {
        [
            &self.julia_real,
            &self.julia_imag,
            &self.escape_threshold,
            &self.angle_a,
            &self.freq_a,
            &self.phase_a,
            &self.function_a,
            &self.edge_glow_a,
            &self.edge_hue_shift_a,
            &self.angle_b,
            &self.freq_b,
            &self.phase_b,
            &self.function_b,
            &self.edge_glow_b,
            &self.edge_hue_shift_b,
            &self.function_blend,
            &self.deform_mix,
            &self.shift,
            &self.edge_saturation,
        ]
    }

    /// Mutable access to all genes in canonical order.
    pub fn genes_mut(&mut self) -> [&mut Gene; GENE_COUNT] {
        [
            &mut self.julia_real,
            &mut self.julia_imag,
            &mut self.escape_threshold,
            &mut self.angle_a,
            &mut self.freq_a,
            &mut self.phase_a,
            &mut self.function_a,
            &mut self.edge_glow_a,
            &mut self.edge_hue_shift_a,
            &mut self.angle_b,
            &mut self.freq_b,
            &mut self.phase_b,
            &mut self.function_b,
            &mut self.edge_glow_b,
            &mut self.edge_hue_shift_b,
            &mut self.function_blend,
            &mut self.deform_mix,
            &mut self.shift,
            &mut self.edge_saturation,
        ]
    }

    /// Genes that define the fractal's structure.
    ///
    /// Blend, mix and colouring genes are left out so that distance reflects
    /// structural rather than cosmetic divergence.
    pub fn structural_genes(&self) -> [&Gene; STRUCTURAL_GENE_COUNT] {
        [
            &self.julia_real,
            &self.julia_imag,
            &self.escape_threshold,
            &self.angle_a,
            &self.freq_a,
            &self.phase_a,
            &self.function_a,
            &self.angle_b,
            &self.freq_b,
            &self.phase_b,
            &self.function_b,
        ]
    }

    /// Complex constant `(re, im)`.
    #[inline]
    pub fn julia_constant(&self) -> (f32, f32) {
        (self.julia_real.value, self.julia_imag.value)
    }

    /// Create a genome from a fractal parameter set, with default gene bounds.
    pub fn from_fractal(params: &FractalParams) -> Self {
        let mut genome = Self::default();
        genome.extract_from_fractal(params);
        genome
    }

    /// Convert the genome into a full rendering parameter set.
    ///
    /// Mode and iteration cap are not evolved and come from `base`.
    pub fn apply_to_fractal(&self, base: &FractalParams) -> FractalParams {
        FractalParams {
            mode: base.mode,
            julia_constant: self.julia_constant(),
            escape_threshold: self.escape_threshold.value,
            max_iterations: base.max_iterations,
            deform_a: DeformState {
                angle: self.angle_a.value,
                frequency: self.freq_a.value,
                phase: self.phase_a.value,
                function: DeformFunction::from_selector(self.function_a.value),
                edge_glow: self.edge_glow_a.value,
                edge_hue_shift: self.edge_hue_shift_a.value,
            },
            deform_b: DeformState {
                angle: self.angle_b.value,
                frequency: self.freq_b.value,
                phase: self.phase_b.value,
                function: DeformFunction::from_selector(self.function_b.value),
                edge_glow: self.edge_glow_b.value,
                edge_hue_shift: self.edge_hue_shift_b.value,
            },
            function_blend: self.function_blend.value,
            deform_mix: self.deform_mix.value,
            shift: self.shift.value,
            edge_saturation: self.edge_saturation.value,
        }
    }

    /// Read gene values back from a (possibly hand-edited) parameter set.
    ///
    /// Values are clamped into each gene's bounds; metadata is untouched.
    pub fn extract_from_fractal(&mut self, params: &FractalParams) {
        self.julia_real.set(params.julia_constant.0);
        self.julia_imag.set(params.julia_constant.1);
        self.escape_threshold.set(params.escape_threshold);

        let a = &params.deform_a;
        self.angle_a.set(a.angle);
        self.freq_a.set(a.frequency);
        self.phase_a.set(a.phase);
        self.function_a.set(a.function.selector());
        self.edge_glow_a.set(a.edge_glow);
        self.edge_hue_shift_a.set(a.edge_hue_shift);

        let b = &params.deform_b;
        self.angle_b.set(b.angle);
        self.freq_b.set(b.frequency);
        self.phase_b.set(b.phase);
        self.function_b.set(b.function.selector());
        self.edge_glow_b.set(b.edge_glow);
        self.edge_hue_shift_b.set(b.edge_hue_shift);

        self.function_blend.set(params.function_blend);
        self.deform_mix.set(params.deform_mix);
        self.shift.set(params.shift);
        self.edge_saturation.set(params.edge_saturation);
    }

    /// Whether every gene lies within its bounds.
    pub fn is_within_bounds(&self) -> bool {
        self.genes().iter().all(|g| g.in_bounds())
    }

    /// Restore the canonical gene bounds and clamp every value into them.
    ///
    /// Non-finite values and mutation rates fall back to the defaults, so
    /// genomes loaded from untrusted JSON are always safe to evolve.
    pub fn clamp_to_bounds(&mut self) {
        let template = Genome::default();
        for (gene, reference) in self.genes_mut().into_iter().zip(template.genes()) {
            gene.min = reference.min;
            gene.max = reference.max;
            gene.mutation_rate = if gene.mutation_rate.is_finite() {
                gene.mutation_rate.clamp(0.0, 1.0)
            } else {
                reference.mutation_rate
            };
            let value = if gene.value.is_finite() {
                gene.value
            } else {
                reference.value
            };
            gene.value = value.clamp(gene.min, gene.max);
        }
    }
}

// ============================================================================
// Engine State and Statistics
// ============================================================================

/// Lifecycle state of the evolution engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No worker running (possibly with a seeded population).
    #[default]
    Idle,
    /// Worker running generations.
    Running,
    /// Worker alive but waiting.
    Paused,
    /// Worker finished or was stopped.
    Stopped,
}

/// Point-in-time statistics, rebuilt every generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvolutionStats {
    /// Number of completed generations.
    pub current_generation: u32,
    /// Best fitness of the last evaluated generation.
    pub best_fitness: f32,
    /// Mean fitness of the last evaluated generation.
    pub average_fitness: f32,
    /// Mean pairwise genetic distance.
    pub diversity_index: f32,
    /// Generations since the best fitness last improved.
    pub stagnation_count: u32,
    /// Global mutation rate applied to the next offspring.
    pub current_mutation_rate: f32,
    /// Species found in the last generation.
    pub species_count: usize,
    pub generations_per_second: f32,
    pub evaluations_per_second: f32,
    /// Set once the run has ended.
    pub stop_reason: Option<StopReason>,
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Reached target fitness.
    TargetReached,
    /// Stagnation limit hit.
    Stagnation,
    /// Stopped by the caller.
    Cancelled,
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution parameter validation errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParameterError {
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Maximum generations must be positive")]
    NoGenerations,
    #[error("Stagnation limit must be positive")]
    NoStagnationLimit,
    #[error("Parameter {name} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("Tournament size must be at least 1")]
    EmptyTournament,
    #[error("Image size must be at least 3 pixels, got {0}")]
    ImageTooSmall(usize),
    #[error("Iteration cap must be positive")]
    NoIterations,
}

impl EvolutionParameters {
    /// Validate evolution parameters.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.population_size < 2 {
            return Err(ParameterError::PopulationTooSmall(self.population_size));
        }
        if self.max_generations == 0 {
            return Err(ParameterError::NoGenerations);
        }
        if self.stagnation_generations == 0 {
            return Err(ParameterError::NoStagnationLimit);
        }
        if self.tournament_size == 0 {
            return Err(ParameterError::EmptyTournament);
        }

        let check_range = |name: &'static str, value: f32, min: f32, max: f32| {
            // NaN fails both comparisons.
            if value >= min && value <= max {
                Ok(())
            } else {
                Err(ParameterError::OutOfRange {
                    name,
                    value,
                    min,
                    max,
                })
            }
        };

        check_range("mutation_rate", self.mutation_rate, 0.0, f32::MAX)?;
        check_range("crossover_rate", self.crossover_rate, 0.0, 1.0)?;
        check_range("elite_percentage", self.elite_percentage, 0.0, 1.0)?;
        check_range("diversity_pressure", self.diversity_pressure, 0.0, 1.0)?;
        check_range(
            "compatibility_threshold",
            self.compatibility_threshold,
            f32::MIN_POSITIVE,
            f32::MAX,
        )?;
        check_range("mutation_decay", self.mutation_decay, f32::MIN_POSITIVE, 1.0)?;
        check_range("min_mutation_rate", self.min_mutation_rate, 0.0, f32::MAX)?;
        check_range("target_fitness", self.target_fitness, f32::MIN, f32::MAX)?;
        check_range("gene_mutation_floor", self.gene_mutation_floor, 0.0, 1.0)?;

        for metric in FitnessMetric::ALL {
            check_range(metric.name(), self.fitness_weights.weight(metric), 0.0, f32::MAX)?;
        }

        if self.render.image_size < 3 {
            return Err(ParameterError::ImageTooSmall(self.render.image_size));
        }
        if self.render.max_iterations == 0 {
            return Err(ParameterError::NoIterations);
        }

        Ok(())
    }

    /// Number of elites carried into the next generation.
    ///
    /// Any positive percentage keeps at least one individual.
    pub fn elite_count(&self) -> usize {
        if self.elite_percentage <= 0.0 {
            return 0;
        }
        let count = (self.population_size as f32 * self.elite_percentage) as usize;
        count.clamp(1, self.population_size)
    }

    /// Whether speciation and fitness sharing are active.
    pub fn speciation_enabled(&self) -> bool {
        self.species_count > 0 && self.diversity_pressure > 0.0
    }
}
