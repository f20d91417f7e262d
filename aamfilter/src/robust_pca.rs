use log::debug;
use nalgebra::{DMatrix, SVD};

use crate::config::RpcaConfig;
use crate::error::{AamError, Result};

/// Low-rank plus sparse split of a data matrix, `D = low_rank + sparse`.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub low_rank: DMatrix<f64>,
    pub sparse: DMatrix<f64>,
    pub iterations: usize,
}

/// Robust principal component analysis by the inexact augmented Lagrange
/// multiplier method.
pub struct RobustPca {
    lambda: Option<f64>,
    tolerance: f64,
    max_iterations: usize,
    rho: f64,
}

impl RobustPca {
    pub fn new(config: &RpcaConfig) -> Self {
        Self {
            lambda: config.lambda,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            rho: config.rho,
        }
    }

    /// Splits `d` into a low-rank and a sparse part.
    ///
    /// Alternates soft thresholding of the sparse part with singular value
    /// thresholding of the low-rank part, until the relative residual
    /// `||D - A - E||_F / ||D||_F` drops below the tolerance. A zero matrix
    /// splits into two zero matrices without iterating.
    ///
    /// Fails with [`AamError::RobustRecoveryFailed`] when the iteration
    /// budget runs out first.
    pub fn decompose(&self, d: &DMatrix<f64>) -> Result<Decomposition> {
        let (m, n) = d.shape();
        let zeros = DMatrix::zeros(m, n);
        let d_norm = d.norm();
        if m == 0 || n == 0 || d_norm == 0.0 {
            return Ok(Decomposition {
                low_rank: zeros.clone(),
                sparse: zeros,
                iterations: 0,
            });
        }

        let lambda = self.lambda.unwrap_or(1.0 / (m.max(n) as f64).sqrt());
        let norm_two = spectral_norm(d);
        let norm_inf = d.amax() / lambda;
        let mut y = d / norm_two.max(norm_inf);
        let mut mu = 1.25 / norm_two;
        let mu_bar = mu * 1e7;

        let mut a = zeros.clone();
        let mut e = zeros;
        let mut residual = f64::INFINITY;

        for iter in 0..self.max_iterations {
            let inv_mu = 1.0 / mu;

            let temp = d - &a + &y * inv_mu;
            e = soft_threshold(&temp, lambda * inv_mu);

            a = singular_value_threshold(d - &e + &y * inv_mu, inv_mu);

            let z = d - &a - &e;
            y += &z * mu;
            mu = (mu * self.rho).min(mu_bar);

            residual = z.norm() / d_norm;
            debug!("rpca iter {iter}: residual = {residual:.3e}");
            if residual < self.tolerance {
                return Ok(Decomposition {
                    low_rank: a,
                    sparse: e,
                    iterations: iter + 1,
                });
            }
        }

        Err(AamError::RobustRecoveryFailed {
            iterations: self.max_iterations,
            residual,
        })
    }
}

/// Largest singular value.
fn spectral_norm(m: &DMatrix<f64>) -> f64 {
    m.singular_values().max()
}

/// Entrywise shrinkage towards zero by `tau`.
fn soft_threshold(m: &DMatrix<f64>, tau: f64) -> DMatrix<f64> {
    m.map(|v| v.signum() * (v.abs() - tau).max(0.0))
}

/// Rebuilds `m` from its singular values exceeding `tau`, each shrunk by
/// `tau`.
fn singular_value_threshold(m: DMatrix<f64>, tau: f64) -> DMatrix<f64> {
    let (rows, cols) = m.shape();
    let svd = SVD::new(m, true, true);
    let mut out = DMatrix::zeros(rows, cols);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return out;
    };
    for (k, &s) in svd.singular_values.iter().enumerate() {
        if s > tau {
            out += (u.column(k) * v_t.row(k)) * (s - tau);
        }
    }
    out
}
