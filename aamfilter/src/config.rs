use serde::{Deserialize, Serialize};

use crate::error::{AamError, Result};

/// How a sample's fit against the appearance model is turned into a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// L2 norm of the texture-space reconstruction residual.
    TextureError,
    /// RMSE between the sample's pixels and the reconstruction warped back
    /// into the sample's image frame.
    FittingError,
}

/// Which model the samples are scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Rebuild the model without the sample under test.
    LeaveOneOut,
    /// One shared model fitted on the low-rank part of the data.
    RobustPca,
}

/// Settings of the inexact augmented Lagrangian robust PCA solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcaConfig {
    /// Weight of the sparse term; `1 / sqrt(max(rows, cols))` when unset.
    pub lambda: Option<f64>,
    /// Stop when `||D - A - E||_F / ||D||_F` drops below this value.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Growth factor of the penalty parameter.
    pub rho: f64,
}

impl Default for RpcaConfig {
    fn default() -> Self {
        Self {
            lambda: None,
            tolerance: 1e-7,
            max_iterations: 1000,
            rho: 1.5,
        }
    }
}

/// Every tunable constant of the modelling and outlier-detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AamConfig {
    /// Side of the square canonical frame the mean shape is scaled into.
    pub target_shape_size: f64,
    /// Fraction of `target_shape_size` covered by the longer side of the mean shape.
    pub shape_fill_ratio: f64,
    pub shape_max_iterations: usize,
    pub shape_tolerance: f64,
    pub texture_max_iterations: usize,
    pub texture_tolerance: f64,
    /// Weight of the freshly averaged texture when blending the reference.
    pub texture_damping: f64,
    /// Fraction of the variance kept by both PCA models.
    pub variance_retained: f64,
    /// Outlier threshold multiplier used by the iterative detector.
    pub iterative_sigma: f64,
    /// Outlier threshold multiplier used by the one-shot inspection pass.
    pub inspection_sigma: f64,
    /// Score spreads at or below this value flag no sample.
    pub min_score_spread: f64,
    pub metric: Metric,
    pub strategy: Strategy,
    pub rpca: RpcaConfig,
    /// Render per-sample diagnostic images.
    pub collect_diagnostics: bool,
}

impl Default for AamConfig {
    fn default() -> Self {
        Self {
            target_shape_size: 250.0,
            shape_fill_ratio: 0.95,
            shape_max_iterations: 100,
            shape_tolerance: 1e-3,
            texture_max_iterations: 100,
            texture_tolerance: 1e-6,
            texture_damping: 0.75,
            variance_retained: 0.98,
            iterative_sigma: 2.0,
            inspection_sigma: 3.0,
            min_score_spread: 1e-9,
            metric: Metric::TextureError,
            strategy: Strategy::LeaveOneOut,
            rpca: RpcaConfig::default(),
            collect_diagnostics: true,
        }
    }
}

impl AamConfig {
    /// Side length in pixels of the canonical texture canvas.
    pub fn canvas_size(&self) -> usize {
        self.target_shape_size.ceil() as usize
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(AamError::InvalidConfig(msg.to_string()))
            }
        }

        check(
            self.target_shape_size.is_finite() && self.target_shape_size >= 1.0,
            "target_shape_size must be at least 1",
        )?;
        check(
            self.shape_fill_ratio > 0.0 && self.shape_fill_ratio <= 1.0,
            "shape_fill_ratio must lie in (0, 1]",
        )?;
        check(self.shape_tolerance > 0.0, "shape_tolerance must be positive")?;
        check(self.texture_tolerance > 0.0, "texture_tolerance must be positive")?;
        check(
            self.texture_damping > 0.0 && self.texture_damping <= 1.0,
            "texture_damping must lie in (0, 1]",
        )?;
        check(
            self.variance_retained > 0.0 && self.variance_retained <= 1.0,
            "variance_retained must lie in (0, 1]",
        )?;
        check(
            self.iterative_sigma >= 0.0 && self.inspection_sigma >= 0.0,
            "sigma multipliers must be non-negative",
        )?;
        check(self.min_score_spread >= 0.0, "min_score_spread must be non-negative")?;
        check(
            self.rpca.tolerance > 0.0 && self.rpca.rho > 1.0,
            "rpca tolerance must be positive and rho greater than 1",
        )?;
        check(
            self.rpca.lambda.map_or(true, |l| l > 0.0),
            "rpca lambda must be positive",
        )?;
        Ok(())
    }
}
