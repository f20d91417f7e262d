use nalgebra::{DMatrix, DVector, SVD};

/// Total variances at or below this value count as "no variation at all".
const ZERO_VARIANCE: f64 = 1e-20;

/// Slack allowed when comparing the cumulative variance ratio with the target.
const RATIO_SLACK: f64 = 1e-12;

/// Linear subspace model: a mean vector plus an orthonormal basis of the
/// leading principal directions.
#[derive(Debug, Clone)]
pub struct PcaModel {
    mean: DVector<f64>,
    /// One principal direction per row.
    basis: DMatrix<f64>,
    variances: DVector<f64>,
}

impl PcaModel {
    /// Fits a model on `data`, one sample per row.
    ///
    /// Keeps the smallest number of leading components whose cumulative share
    /// of the total variance reaches `retained`. Data without any variance
    /// yields a single component, so every reconstruction is the mean.
    ///
    /// Returns `None` when `data` has no rows or no columns.
    pub fn build(data: &DMatrix<f64>, retained: f64) -> Option<PcaModel> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return None;
        }
        let n = data.nrows();

        let col_means = compute_column_means(data);
        let mut centered = data.clone();
        center_data(&mut centered, &col_means);

        let svd = SVD::new(centered, false, true);
        let v_t = svd.v_t?;

        // order components by decreasing singular value
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .partial_cmp(&svd.singular_values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let denom = n.saturating_sub(1).max(1) as f64;
        let variances: Vec<f64> = order
            .iter()
            .map(|&k| svd.singular_values[k].powi(2) / denom)
            .collect();
        let total: f64 = variances.iter().sum();

        let keep = if total <= ZERO_VARIANCE {
            1
        } else {
            let mut cumulative = 0.0;
            let mut keep = variances.len();
            for (k, v) in variances.iter().enumerate() {
                cumulative += v;
                if cumulative / total >= retained - RATIO_SLACK {
                    keep = k + 1;
                    break;
                }
            }
            keep
        };

        // without variance the single component is a zero row, so every
        // projection is 0 and every reconstruction is the mean
        let mut basis = DMatrix::zeros(keep, data.ncols());
        if total > ZERO_VARIANCE {
            for (row, &k) in order.iter().take(keep).enumerate() {
                basis.row_mut(row).copy_from(&v_t.row(k));
            }
        }

        Some(PcaModel {
            mean: DVector::from_vec(col_means),
            basis,
            variances: DVector::from_iterator(keep, variances.into_iter().take(keep)),
        })
    }

    /// Fits a model on the given sample vectors.
    pub fn from_samples(samples: &[&DVector<f64>], retained: f64) -> Option<PcaModel> {
        let dim = samples.first()?.len();
        let data = DMatrix::from_fn(samples.len(), dim, |i, j| samples[i][j]);
        Self::build(&data, retained)
    }

    pub fn num_components(&self) -> usize {
        self.basis.nrows()
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Principal directions, one per row, by decreasing variance.
    pub fn basis(&self) -> &DMatrix<f64> {
        &self.basis
    }

    pub fn variances(&self) -> &DVector<f64> {
        &self.variances
    }

    /// Coefficients of `v` in the model basis.
    pub fn project(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.basis * (v - &self.mean)
    }

    /// The vector described by `coefficients`.
    pub fn reconstruct(&self, coefficients: &DVector<f64>) -> DVector<f64> {
        self.basis.tr_mul(coefficients) + &self.mean
    }

    /// Projects `v` into the model and back.
    pub fn approximate(&self, v: &DVector<f64>) -> DVector<f64> {
        self.reconstruct(&self.project(v))
    }
}

/// Computes column-wise means of a DMatrix.
fn compute_column_means(matrix: &DMatrix<f64>) -> Vec<f64> {
    let mut means = Vec::with_capacity(matrix.ncols());
    for col in 0..matrix.ncols() {
        let sum: f64 = matrix.column(col).iter().sum();
        means.push(sum / matrix.nrows() as f64);
    }
    means
}

/// Subtracts the given column means from each value in `matrix`,
/// effectively centering each column around 0.
fn center_data(matrix: &mut DMatrix<f64>, col_means: &[f64]) {
    for (col, mean) in col_means.iter().enumerate() {
        for v in matrix.column_mut(col).iter_mut() {
            *v -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_data(rows: usize, cols: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        // decaying column scales give a clear variance spectrum
        DMatrix::from_fn(rows, cols, |_, j| rng.gen_range(-1.0..1.0) * 0.5f64.powi(j as i32))
    }

    #[test]
    fn full_rank_model_reconstructs_exactly() {
        let data = random_data(12, 4, 1);
        let model = PcaModel::build(&data, 1.0).unwrap();
        assert_eq!(model.num_components(), 4);

        let mut rng = StdRng::seed_from_u64(2);
        let v = DVector::from_fn(4, |_, _| rng.gen_range(-2.0..2.0));
        assert!((model.approximate(&v) - &v).norm() < 1e-10);
    }

    #[test]
    fn basis_is_orthonormal_and_sorted() {
        let model = PcaModel::build(&random_data(20, 6, 5), 1.0).unwrap();
        let gram = model.basis() * model.basis().transpose();
        assert!((gram - DMatrix::identity(model.num_components(), model.num_components())).norm() < 1e-9);
        for w in model.variances().as_slice().windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn more_retained_variance_never_hurts() {
        let data = random_data(15, 8, 9);
        let mut rng = StdRng::seed_from_u64(10);
        let v = DVector::from_fn(8, |j, _| rng.gen_range(-1.0..1.0) * 0.5f64.powi(j as i32));

        let mut last_err = f64::INFINITY;
        let mut last_k = 0;
        for retained in [0.3, 0.5, 0.7, 0.9, 0.98, 1.0] {
            let model = PcaModel::build(&data, retained).unwrap();
            let err = (model.approximate(&v) - &v).norm();
            assert!(model.num_components() >= last_k);
            assert!(err <= last_err + 1e-12);
            last_err = err;
            last_k = model.num_components();
        }
    }

    #[test]
    fn identical_rows_collapse_to_the_mean() {
        let row = [0.25, 0.5, 0.75];
        let data = DMatrix::from_fn(5, 3, |_, j| row[j]);
        let model = PcaModel::build(&data, 0.98).unwrap();
        assert_eq!(model.num_components(), 1);
        let v = DVector::from_row_slice(&row);
        assert!((model.approximate(&v) - &v).norm() < 1e-12);
        assert!(model.variances()[0].abs() < 1e-20);

        // any other vector is explained by the mean alone
        let other = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(model.project(&other).norm() < 1e-12);
        assert!((model.approximate(&other) - model.mean()).norm() < 1e-12);
    }

    #[test]
    fn single_row_model_is_the_row_itself() {
        let data = DMatrix::from_row_slice(1, 4, &[0.1, -0.2, 0.3, 0.4]);
        let model = PcaModel::build(&data, 0.98).unwrap();
        assert_eq!(model.num_components(), 1);
        let held_out = DVector::from_row_slice(&[1.0, 1.0, 1.0, 1.0]);
        let approx = model.approximate(&held_out);
        assert!((approx - DVector::from_row_slice(&[0.1, -0.2, 0.3, 0.4])).norm() < 1e-12);
    }

    #[test]
    fn project_and_reconstruct_are_linear_in_the_basis() {
        let data = random_data(10, 5, 3);
        let model = PcaModel::build(&data, 0.9).unwrap();
        let c = DVector::from_fn(model.num_components(), |i, _| i as f64 + 1.0);
        let v = model.reconstruct(&c);
        assert!((model.project(&v) - c).norm() < 1e-9);
    }

    #[test]
    fn empty_data_has_no_model() {
        assert!(PcaModel::build(&DMatrix::zeros(0, 3), 0.98).is_none());
        assert!(PcaModel::from_samples(&[], 0.98).is_none());
    }
}
