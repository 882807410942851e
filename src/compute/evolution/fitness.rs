//! Fitness evaluation for evolved fractals.
//!
//! A genome is rendered on the canonical window `[-2, 2) x [-2, 2)` at the
//! configured resolution and scored by a weighted sum of image statistics.

use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{FitnessMetric, FitnessWeights, FractalParams, Genome, RenderSettings};

/// Half-width of the canonical render window.
const VIEW_RADIUS: f32 = 2.0;

/// Histogram resolution used by the colour diversity metric.
const HISTOGRAM_BINS: usize = 10;

/// Reasons an evaluation produced no usable score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitnessError {
    #[error("render size {0} is too small, need at least 3x3 pixels")]
    ImageTooSmall(usize),

    #[error("metric {0} produced a non-finite score")]
    NonFinite(&'static str),

    #[error("weighted fitness is not finite")]
    NonFiniteTotal,
}

/// Result of evaluating a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: FitnessMetric,
    pub score: f32,
    pub weight: f32,
}

/// Combined fitness together with the per-metric scores that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    /// Weighted sum clamped to `[0, 1]`.
    pub fitness: f32,
    pub metrics: Vec<MetricResult>,
}

impl FitnessBreakdown {
    /// Raw score of `metric`, if it was evaluated.
    pub fn score(&self, metric: FitnessMetric) -> Option<f32> {
        self.metrics
            .iter()
            .find(|r| r.metric == metric)
            .map(|r| r.score)
    }
}

/// Normalized escape image, row-major.
#[derive(Debug, Clone)]
pub struct EscapeImage {
    pub size: usize,
    /// Smooth escape value divided by the iteration cap, in `[0, 1]`.
    pub values: Vec<f32>,
}

impl EscapeImage {
    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.size + x]
    }
}

/// Evaluates genomes and returns fitness scores.
///
/// Holds only plain data, so a single evaluator can be shared by every
/// worker thread.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    weights: FitnessWeights,
    render: RenderSettings,
}

impl FitnessEvaluator {
    /// Create a new fitness evaluator.
    pub fn new(weights: FitnessWeights, render: RenderSettings) -> Self {
        Self { weights, render }
    }

    pub fn weights(&self) -> &FitnessWeights {
        &self.weights
    }

    pub fn render_settings(&self) -> &RenderSettings {
        &self.render
    }

    /// Render a genome on the canonical window.
    pub fn render(&self, genome: &Genome) -> Result<EscapeImage, FitnessError> {
        let params = genome.apply_to_fractal(&self.render.base_params());
        render_params(&params, self.render.image_size)
    }

    /// Evaluate a genome, reporting every metric.
    pub fn evaluate_detailed(&self, genome: &Genome) -> Result<FitnessBreakdown, FitnessError> {
        let params = genome.apply_to_fractal(&self.render.base_params());
        let image = render_params(&params, self.render.image_size)?;

        let mut metrics = Vec::with_capacity(FitnessMetric::ALL.len());
        for metric in FitnessMetric::ALL {
            let score = compute_metric(metric, &image, &params);
            if !score.is_finite() {
                return Err(FitnessError::NonFinite(metric.name()));
            }
            metrics.push(MetricResult {
                metric,
                score,
                weight: self.weights.weight(metric),
            });
        }

        let total: f32 = metrics.iter().map(|r| r.score * r.weight).sum();
        if total.is_nan() {
            return Err(FitnessError::NonFiniteTotal);
        }

        Ok(FitnessBreakdown {
            fitness: total.clamp(0.0, 1.0),
            metrics,
        })
    }

    /// Combined fitness in `[0, 1]`; failed evaluations score zero.
    pub fn evaluate(&self, genome: &Genome) -> f32 {
        match self.evaluate_detailed(genome) {
            Ok(breakdown) => breakdown.fitness,
            Err(err) => {
                log::warn!("Fitness evaluation failed: {err}");
                0.0
            }
        }
    }
}

/// Render `params` on the canonical window at `size x size` pixels.
pub fn render_params(params: &FractalParams, size: usize) -> Result<EscapeImage, FitnessError> {
    if size < 3 {
        return Err(FitnessError::ImageTooSmall(size));
    }

    let cap = params.max_iterations.max(1) as f32;
    let half = size as f32 / 2.0;
    let mut values = Vec::with_capacity(size * size);

    for y in 0..size {
        let im = (y as f32 - half) / half * VIEW_RADIUS;
        for x in 0..size {
            let re = (x as f32 - half) / half * VIEW_RADIUS;
            let smooth = params.calculate_smooth(Complex32::new(re, im));
            values.push((smooth / cap).clamp(0.0, 1.0));
        }
    }

    Ok(EscapeImage { size, values })
}

/// Compute a single fitness metric.
fn compute_metric(metric: FitnessMetric, image: &EscapeImage, params: &FractalParams) -> f32 {
    match metric {
        FitnessMetric::Complexity => compute_complexity(image),
        FitnessMetric::Symmetry => compute_symmetry(image),
        FitnessMetric::ColorDiversity => compute_color_diversity(image),
        FitnessMetric::EdgeDefinition => compute_edge_definition(image),
        FitnessMetric::Stability => compute_stability(params),
        FitnessMetric::Performance => compute_performance(params),
    }
}

/// Complexity: RMS deviation of each 3x3 neighbourhood from its centre pixel.
pub fn compute_complexity(image: &EscapeImage) -> f32 {
    let s = image.size;
    let mut total = 0.0f32;

    for y in 1..s - 1 {
        for x in 1..s - 1 {
            let center = image.at(x, y);
            let mut deviation = 0.0f32;
            for dy in 0..3 {
                for dx in 0..3 {
                    let d = image.at(x + dx - 1, y + dy - 1) - center;
                    deviation += d * d;
                }
            }
            total += (deviation / 9.0).sqrt();
        }
    }

    (total / (s * s) as f32 / 0.1).min(1.0)
}

/// Symmetry: agreement between the left half and its horizontal mirror.
pub fn compute_symmetry(image: &EscapeImage) -> f32 {
    let s = image.size;
    let half = s / 2;
    let mut total = 0.0f32;

    for y in 0..s {
        for x in 0..half {
            let diff = (image.at(x, y) - image.at(s - 1 - x, y)).abs();
            total += 1.0 - diff;
        }
    }

    total / (s * half) as f32
}

/// Colour diversity: entropy of a value histogram, normalized to `[0, 1]`.
pub fn compute_color_diversity(image: &EscapeImage) -> f32 {
    let mut histogram = [0usize; HISTOGRAM_BINS];
    for &v in &image.values {
        let bin = ((v * HISTOGRAM_BINS as f32) as usize).min(HISTOGRAM_BINS - 1);
        histogram[bin] += 1;
    }

    let n = image.values.len() as f32;
    let entropy: f32 = histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f32 / n;
            -p * p.ln()
        })
        .sum();

    entropy / (HISTOGRAM_BINS as f32).ln()
}

/// Edge definition: mean central-difference gradient magnitude.
pub fn compute_edge_definition(image: &EscapeImage) -> f32 {
    let s = image.size;
    let mut total = 0.0f32;

    for y in 1..s - 1 {
        for x in 1..s - 1 {
            let gx = image.at(x + 1, y) - image.at(x - 1, y);
            let gy = image.at(x, y + 1) - image.at(x, y - 1);
            total += (gx * gx + gy * gy).sqrt();
        }
    }

    (total / (s * s) as f32 / 0.5).min(1.0)
}

/// Stability: constants far from the origin diverge almost everywhere.
pub fn compute_stability(params: &FractalParams) -> f32 {
    let (re, im) = params.julia_constant;
    (-(re * re + im * im) / 4.0).exp()
}

/// Performance: cheaper iteration caps score higher.
pub fn compute_performance(params: &FractalParams) -> f32 {
    (1.0 - params.max_iterations as f32 / 1000.0).max(0.0)
}
