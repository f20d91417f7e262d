use log::{debug, warn};

use crate::config::AamConfig;
use crate::shape::Shape;
use crate::similarity_transform::SimilarityTransform;

/// Outcome of a fixed-point loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Number of update steps performed.
    pub iterations: usize,
    /// Whether the tolerance was met before the iteration cap.
    pub converged: bool,
    /// Displacement norm of the last step.
    pub final_delta: f64,
}

/// Procrustes mean of a set of shapes together with the shapes aligned onto it.
#[derive(Debug, Clone)]
pub struct MeanShape {
    pub shape: Shape,
    /// Input shapes mapped onto `shape` by their best similarity transform.
    pub aligned: Vec<Shape>,
    pub convergence: Convergence,
}

/// Iterative generalised Procrustes alignment.
pub struct ShapeAligner {
    target_size: f64,
    fill_ratio: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl ShapeAligner {
    pub fn new(config: &AamConfig) -> Self {
        Self {
            target_size: config.target_shape_size,
            fill_ratio: config.shape_fill_ratio,
            max_iterations: config.shape_max_iterations,
            tolerance: config.shape_tolerance,
        }
    }

    /// Computes the canonical mean shape of `shapes`.
    ///
    /// The first estimate is the plain average rescaled into the canonical
    /// frame. Each round aligns every shape onto the current estimate,
    /// averages the aligned shapes and rescales; the loop stops once the
    /// estimate moves less than the tolerance. Hitting the iteration cap is
    /// logged and the last estimate is returned.
    ///
    /// Returns `None` for an empty input.
    pub fn compute_mean_shape(&self, shapes: &[&Shape]) -> Option<MeanShape> {
        let mut mean = Shape::mean(shapes.iter().copied())?
            .scale_to_canonical(self.target_size, self.fill_ratio);

        let mut convergence = Convergence {
            iterations: 0,
            converged: false,
            final_delta: f64::INFINITY,
        };

        for iter in 0..self.max_iterations {
            let aligned = self.align_all(shapes, &mean);
            let new_mean = Shape::mean(aligned.iter())?
                .scale_to_canonical(self.target_size, self.fill_ratio);
            let delta = new_mean.distance(&mean);
            debug!("mean shape iter {iter}: diff = {delta:.6}");

            mean = new_mean;
            convergence.iterations = iter + 1;
            convergence.final_delta = delta;
            if delta < self.tolerance {
                convergence.converged = true;
                break;
            }
        }

        if !convergence.converged {
            warn!(
                "mean shape did not converge after {} iterations (last diff {:.6})",
                convergence.iterations, convergence.final_delta
            );
        }

        let aligned = self.align_all(shapes, &mean);
        Some(MeanShape {
            shape: mean,
            aligned,
            convergence,
        })
    }

    fn align_all(&self, shapes: &[&Shape], target: &Shape) -> Vec<Shape> {
        shapes
            .iter()
            .map(|s| SimilarityTransform::estimate(s, target).apply_shape(s))
            .collect()
    }
}
