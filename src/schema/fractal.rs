//! Rendering parameters for the deformable fractal family.

use serde::{Deserialize, Serialize};

/// Smallest squared-magnitude bailout the iteration accepts.
pub const MIN_ESCAPE_THRESHOLD: f32 = 2.0;

/// Iteration start convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FractalMode {
    /// `z` starts at the sample point, the genome constant is added each step.
    #[default]
    Julia,
    /// `z` starts at zero, the sample point is added each step.
    Mandelbrot,
}

/// Nonlinear map applied by a deformation state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeformFunction {
    #[default]
    Sin,
    Cos,
    Abs,
    Atan,
    Sinh,
    Cosh,
    SqrtAbs,
    Asin,
    Tan,
    SinAbs,
    CosSquare,
}

impl DeformFunction {
    /// Number of available maps.
    pub const COUNT: usize = 11;

    /// All maps in selector order.
    pub const ALL: [DeformFunction; Self::COUNT] = [
        Self::Sin,
        Self::Cos,
        Self::Abs,
        Self::Atan,
        Self::Sinh,
        Self::Cosh,
        Self::SqrtAbs,
        Self::Asin,
        Self::Tan,
        Self::SinAbs,
        Self::CosSquare,
    ];

    /// Map a (possibly out-of-range) gene value onto a function.
    ///
    /// The value is truncated and wrapped modulo [`Self::COUNT`], so genes
    /// pushed outside their nominal range by crossover still select a map.
    pub fn from_selector(value: f32) -> Self {
        let index = (value as i64).rem_euclid(Self::COUNT as i64) as usize;
        Self::ALL[index]
    }

    /// Selector value as stored in a gene.
    pub fn selector(self) -> f32 {
        Self::ALL.iter().position(|&f| f == self).unwrap_or(0) as f32
    }
}

/// One deformation state (A or B).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DeformState {
    /// Rotation applied to `z` (radians).
    pub angle: f32,
    /// Scale applied to `z` before the nonlinear map.
    pub frequency: f32,
    /// Offset added to the real part before the nonlinear map.
    pub phase: f32,
    /// Selected nonlinear map.
    pub function: DeformFunction,
    /// Edge glow intensity (preview only).
    pub edge_glow: f32,
    /// Edge hue shift (preview only).
    pub edge_hue_shift: f32,
}

impl Default for DeformState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            frequency: 1.0,
            phase: 0.0,
            function: DeformFunction::Sin,
            edge_glow: 1.0,
            edge_hue_shift: 1.0,
        }
    }
}

/// Fully populated parameter set for rendering one fractal.
///
/// This is what the viewer and the GPU preview consume; genomes are converted
/// to and from it with `Genome::apply_to_fractal` / `Genome::extract_from_fractal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FractalParams {
    /// Iteration start convention.
    #[serde(default)]
    pub mode: FractalMode,
    /// Complex constant `(re, im)`.
    pub julia_constant: (f32, f32),
    /// Squared-magnitude bailout.
    pub escape_threshold: f32,
    /// Iteration cap.
    pub max_iterations: u32,
    /// Deformation state A.
    pub deform_a: DeformState,
    /// Deformation state B.
    pub deform_b: DeformState,
    /// A/B blend used by the shader preview.
    pub function_blend: f32,
    /// Interpolation weight between the deformed A and B values.
    pub deform_mix: f32,
    /// Offset shared by both deformation states.
    pub shift: f32,
    /// Edge colour saturation (preview only).
    #[serde(default = "default_edge_saturation")]
    pub edge_saturation: f32,
}

fn default_edge_saturation() -> f32 {
    1.0
}

impl Default for FractalParams {
    fn default() -> Self {
        Self {
            mode: FractalMode::Julia,
            julia_constant: (-0.7, 0.27015),
            escape_threshold: 4.0,
            max_iterations: 100,
            deform_a: DeformState {
                angle: 0.3,
                frequency: 1.2,
                phase: 0.0,
                function: DeformFunction::Sin,
                edge_glow: 1.5,
                edge_hue_shift: 0.9,
            },
            deform_b: DeformState {
                angle: -0.2,
                frequency: 1.8,
                phase: 0.5,
                function: DeformFunction::Cos,
                edge_glow: 1.1,
                edge_hue_shift: 1.3,
            },
            function_blend: 0.5,
            deform_mix: 0.5,
            shift: 0.0,
            edge_saturation: default_edge_saturation(),
        }
    }
}

impl FractalParams {
    /// Bailout actually used by the iteration.
    #[inline]
    pub fn effective_escape_threshold(&self) -> f32 {
        if self.escape_threshold.is_finite() {
            self.escape_threshold.max(MIN_ESCAPE_THRESHOLD)
        } else {
            MIN_ESCAPE_THRESHOLD
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_wraps() {
        assert_eq!(DeformFunction::from_selector(0.0), DeformFunction::Sin);
        assert_eq!(DeformFunction::from_selector(10.9), DeformFunction::CosSquare);
        assert_eq!(DeformFunction::from_selector(11.0), DeformFunction::Sin);
        assert_eq!(DeformFunction::from_selector(13.5), DeformFunction::Abs);
        assert_eq!(DeformFunction::from_selector(-1.0), DeformFunction::CosSquare);
        assert_eq!(DeformFunction::from_selector(f32::NAN), DeformFunction::Sin);
    }

    #[test]
    fn test_selector_roundtrip() {
        for f in DeformFunction::ALL {
            assert_eq!(DeformFunction::from_selector(f.selector()), f);
        }
    }

    #[test]
    fn test_escape_threshold_floor() {
        let params = FractalParams {
            escape_threshold: 0.5,
            ..Default::default()
        };
        assert_eq!(params.effective_escape_threshold(), MIN_ESCAPE_THRESHOLD);

        let params = FractalParams {
            escape_threshold: f32::NAN,
            ..Default::default()
        };
        assert_eq!(params.effective_escape_threshold(), MIN_ESCAPE_THRESHOLD);
    }
}
