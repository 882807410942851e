//! Escape-time iteration for the deformable fractal family.
//!
//! Each step deforms `z` through two nonlinear states, blends them, squares the
//! result and adds a constant. Everything here is a pure function of its
//! inputs, so evaluation can run on any number of threads without locking.

use num_complex::Complex32;

use crate::schema::{DeformFunction, DeformState, FractalMode, FractalParams};

/// Result of iterating a single sample point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Escape {
    /// Iteration at which the orbit escaped, or the cap if it never did.
    pub iterations: u32,
    /// Continuous refinement of `iterations`; equals the cap for interior points.
    pub smooth: f32,
}

/// Apply one of the nonlinear maps to `z`.
#[inline]
pub fn apply_function(z: Complex32, function: DeformFunction) -> Complex32 {
    match function {
        DeformFunction::Sin => z.sin(),
        DeformFunction::Cos => z.cos(),
        DeformFunction::Abs => Complex32::new(z.re.abs(), z.im.abs()),
        DeformFunction::Atan => Complex32::new(z.re.atan(), z.im.atan()),
        DeformFunction::Sinh => z.sinh(),
        DeformFunction::Cosh => z.cosh(),
        DeformFunction::SqrtAbs => Complex32::new(z.re.abs().sqrt(), z.im.abs().sqrt()),
        DeformFunction::Asin => Complex32::new(
            z.re.clamp(-1.0, 1.0).asin(),
            z.im.clamp(-1.0, 1.0).asin(),
        ),
        DeformFunction::Tan => Complex32::new(z.re.tan(), z.im.tanh()),
        DeformFunction::SinAbs => Complex32::new(z.re.abs().sin(), z.im.abs().sin()),
        DeformFunction::CosSquare => {
            let (cr, ci) = (z.re.cos(), z.im.cos());
            Complex32::new(cr * cr, ci * ci)
        }
    }
}

/// Deform `z` through one state: `rotate(z, angle) + 0.5 * f(z * freq + shift + phase)`.
#[inline]
pub fn deform(z: Complex32, state: &DeformState, shift: f32) -> Complex32 {
    let rotated = z * Complex32::from_polar(1.0, state.angle);
    let scaled = z * state.frequency + Complex32::new(shift + state.phase, 0.0);
    rotated + apply_function(scaled, state.function) * 0.5
}

impl FractalParams {
    /// Iterate `point` until escape or the iteration cap.
    pub fn escape(&self, point: Complex32) -> Escape {
        let (mut z, c) = match self.mode {
            FractalMode::Julia => {
                let (re, im) = self.julia_constant;
                (point, Complex32::new(re, im))
            }
            FractalMode::Mandelbrot => (Complex32::new(0.0, 0.0), point),
        };

        let threshold = self.effective_escape_threshold();
        let mix = self.deform_mix;
        let cap = self.max_iterations;

        for i in 0..cap {
            let a = deform(z, &self.deform_a, self.shift);
            let b = deform(z, &self.deform_b, self.shift);
            let blended = a * (1.0 - mix) + b * mix;

            z = blended * blended + c;

            if z.norm_sqr() > threshold {
                let smooth = i as f32 + 1.0 - z.norm().log2().log2();
                // Overflowing orbits give a non-finite estimate: treat as interior.
                let smooth = if smooth.is_finite() {
                    smooth.max(0.0)
                } else {
                    cap as f32
                };
                return Escape {
                    iterations: i,
                    smooth,
                };
            }
        }

        Escape {
            iterations: cap,
            smooth: cap as f32,
        }
    }

    /// Integer escape iteration for `point`.
    #[inline]
    pub fn calculate_iterations(&self, point: Complex32) -> u32 {
        self.escape(point).iterations
    }

    /// Smoothed escape value for `point`, never negative or NaN.
    #[inline]
    pub fn calculate_smooth(&self, point: Complex32) -> f32 {
        self.escape(point).smooth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Genome;

    fn zero_constant_params(mode: FractalMode) -> FractalParams {
        let mut genome = Genome::default();
        genome.julia_real.set(0.0);
        genome.julia_imag.set(0.0);
        genome.apply_to_fractal(&FractalParams {
            mode,
            max_iterations: 300,
            ..Default::default()
        })
    }

    #[test]
    fn test_origin_never_escapes_mandelbrot() {
        let params = zero_constant_params(FractalMode::Mandelbrot);
        let origin = Complex32::new(0.0, 0.0);

        assert_eq!(params.calculate_iterations(origin), 300);
        assert_eq!(params.calculate_smooth(origin), 300.0);
    }

    #[test]
    fn test_origin_never_escapes_julia() {
        let params = zero_constant_params(FractalMode::Julia);
        let escape = params.escape(Complex32::new(0.0, 0.0));
        assert_eq!(escape.iterations, 300);
        assert_eq!(escape.smooth, 300.0);
    }

    #[test]
    fn test_far_point_escapes_immediately() {
        let params = Genome::default().apply_to_fractal(&FractalParams::default());
        let escape = params.escape(Complex32::new(3.0, 0.0));
        assert_eq!(escape.iterations, 0);
        assert!(escape.smooth >= 0.0);
        assert!(escape.smooth.is_finite());
    }

    #[test]
    fn test_smooth_never_nan() {
        let params = FractalParams {
            max_iterations: 50,
            ..Default::default()
        };
        for f in DeformFunction::ALL {
            let params = FractalParams {
                deform_a: DeformState {
                    function: f,
                    ..params.deform_a
                },
                ..params.clone()
            };
            for k in 0..20 {
                let point = Complex32::new(-2.0 + k as f32 * 0.2, 1.5 - k as f32 * 0.15);
                let escape = params.escape(point);
                assert!(escape.smooth.is_finite());
                assert!(escape.smooth >= 0.0);
                assert!(escape.iterations <= 50);
            }
        }
    }

    #[test]
    fn test_deform_identity_state() {
        // Zero rotation plus an Abs map of a real, positive input.
        let state = DeformState {
            angle: 0.0,
            frequency: 1.0,
            phase: 0.0,
            function: DeformFunction::Abs,
            ..Default::default()
        };
        let z = Complex32::new(0.5, 0.0);
        let d = deform(z, &state, 0.0);
        assert!((d.re - 0.75).abs() < 1e-6);
        assert!(d.im.abs() < 1e-6);
    }

    #[test]
    fn test_cos_square_non_negative() {
        let z = Complex32::new(1.3, -2.1);
        let w = apply_function(z, DeformFunction::CosSquare);
        assert!(w.re >= 0.0 && w.im >= 0.0);
    }

    #[test]
    fn test_params_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FractalParams>();
    }
}
