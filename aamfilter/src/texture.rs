use log::{debug, warn};
use nalgebra::DVector;

use crate::config::AamConfig;
use crate::shape_aligner::Convergence;

/// Scales below this magnitude are treated as zero and left unapplied.
const MIN_SCALE: f64 = 1e-12;

/// Photometric parameters removed from one texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photometry {
    /// Multiplicative gain, the projection of the texture onto the reference.
    pub alpha: f64,
    /// Per-channel additive offset.
    pub beta: [f64; 3],
}

impl Photometry {
    /// Maps a normalised texture back into image intensities.
    pub fn denormalize(&self, normalized: &DVector<f64>) -> DVector<f64> {
        let mut out = normalized * self.alpha;
        for (i, v) in out.iter_mut().enumerate() {
            *v += self.beta[i % 3];
        }
        out
    }
}

/// Per-channel mean of an interleaved RGB texture.
fn channel_means(v: &DVector<f64>) -> [f64; 3] {
    let texels = v.len() / 3;
    if texels == 0 {
        return [0.0; 3];
    }
    let mut sums = [0.0; 3];
    for (i, x) in v.iter().enumerate() {
        sums[i % 3] += x;
    }
    sums.map(|s| s / texels as f64)
}

/// Removes gain and per-channel offset from `v` relative to `reference`.
///
/// With `alpha = <reference, v>` and `beta` the per-channel mean of `v`, the
/// result is `(v - beta) / alpha`. A vanishing `alpha` is replaced by 1.
///
/// # Examples
/// ```
/// # use aamfilter::texture::normalize_texture;
/// # use nalgebra::DVector;
/// // zero-mean per channel, unit norm
/// let r = DVector::from_vec(vec![0.5, -0.5, 0.0, -0.5, 0.5, 0.0]);
/// let v = r.map(|x| 2.0 * x + 0.25);
/// let (n, p) = normalize_texture(&v, &r);
/// assert!((p.alpha - 2.0).abs() < 1e-12);
/// assert!((p.beta[0] - 0.25).abs() < 1e-12);
/// assert!((n - r).norm() < 1e-12);
/// ```
pub fn normalize_texture(v: &DVector<f64>, reference: &DVector<f64>) -> (DVector<f64>, Photometry) {
    let mut alpha = reference.dot(v);
    if !alpha.is_finite() || alpha.abs() <= MIN_SCALE {
        alpha = 1.0;
    }
    let beta = channel_means(v);
    let mut normalized = v.clone();
    for (i, x) in normalized.iter_mut().enumerate() {
        *x = (*x - beta[i % 3]) / alpha;
    }
    (normalized, Photometry { alpha, beta })
}

/// Result of the mean-texture fixed point.
#[derive(Debug, Clone)]
pub struct MeanTexture {
    pub mean: DVector<f64>,
    /// Every input texture normalised against `mean`, with `mean` subtracted.
    pub centered: Vec<DVector<f64>>,
    /// Photometric parameters of every input texture against `mean`.
    pub photometry: Vec<Photometry>,
    pub convergence: Convergence,
    /// Displacement norm of every iteration, in order.
    pub deltas: Vec<f64>,
}

/// Iterative photometric normalisation of a set of textures.
pub struct TextureNormalizer {
    max_iterations: usize,
    tolerance: f64,
    damping: f64,
}

impl TextureNormalizer {
    pub fn new(config: &AamConfig) -> Self {
        Self {
            max_iterations: config.texture_max_iterations,
            tolerance: config.texture_tolerance,
            damping: config.texture_damping,
        }
    }

    /// Finds the mean texture every input normalises onto.
    ///
    /// The reference starts as the raw average. Each round normalises every
    /// texture against it and averages the results; once the average moves
    /// less than the tolerance the loop stops, otherwise the reference
    /// becomes `damping * new + (1 - damping) * old`.
    ///
    /// Returns `None` for an empty input.
    pub fn compute_mean_texture(&self, textures: &[DVector<f64>]) -> Option<MeanTexture> {
        let mut reference = average(textures.iter())?;
        let mut deltas = Vec::new();
        let mut convergence = Convergence {
            iterations: 0,
            converged: false,
            final_delta: f64::INFINITY,
        };

        for iter in 0..self.max_iterations {
            let normalized = textures.iter().map(|t| normalize_texture(t, &reference).0);
            let new_mean = average(normalized)?;
            let delta = (&new_mean - &reference).norm();
            debug!("mean texture iter {iter}: diff = {delta:.3e}");
            deltas.push(delta);
            convergence.iterations = iter + 1;
            convergence.final_delta = delta;

            if delta < self.tolerance {
                reference = new_mean;
                convergence.converged = true;
                break;
            }
            reference = new_mean * self.damping + reference * (1.0 - self.damping);
        }

        if !convergence.converged {
            warn!(
                "mean texture did not converge after {} iterations (last diff {:.3e})",
                convergence.iterations, convergence.final_delta
            );
        }

        let (centered, photometry): (Vec<_>, Vec<_>) = textures
            .iter()
            .map(|t| {
                let (n, p) = normalize_texture(t, &reference);
                (n - &reference, p)
            })
            .unzip();

        Some(MeanTexture {
            mean: reference,
            centered,
            photometry,
            convergence,
            deltas,
        })
    }
}

fn average<I>(vectors: I) -> Option<DVector<f64>>
where
    I: Iterator,
    I::Item: std::borrow::Borrow<DVector<f64>>,
{
    use std::borrow::Borrow;

    let mut count = 0usize;
    let mut sum: Option<DVector<f64>> = None;
    for v in vectors {
        let v = v.borrow();
        match sum.as_mut() {
            Some(s) => *s += v,
            None => sum = Some(v.clone()),
        }
        count += 1;
    }
    sum.map(|s| s / count as f64)
}
