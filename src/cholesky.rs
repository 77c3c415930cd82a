use faer::{Col, Mat, MatRef};

use crate::{
    covariance::Covariance,
    error::{McmcError, Result},
};

/// Lower triangular `L` with `L * L^T` equal to the covariance it was built from.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    lower: Mat<f64>,
}

impl CholeskyFactor {
    /// Cholesky-Banachiewicz factorization, row by row.
    ///
    /// Only the lower triangle of `covariance` is read. Fails as soon as a
    /// pivot is not strictly positive.
    pub fn new(covariance: &Covariance) -> Result<Self> {
        let cov = covariance.as_mat();
        let dim = cov.nrows();
        let mut lower: Mat<f64> = Mat::zeros(dim, dim);

        for i in 0..dim {
            for j in 0..i {
                let sum: f64 = (0..j).map(|k| lower[(i, k)] * lower[(j, k)]).sum();
                lower[(i, j)] = (cov[(i, j)] - sum) / lower[(j, j)];
            }
            let sum: f64 = (0..i).map(|k| lower[(i, k)] * lower[(i, k)]).sum();
            let pivot = cov[(i, i)] - sum;
            // Also catches NaN entries.
            if !(pivot > 0.) {
                return Err(McmcError::NotPositiveDefinite { row: i, pivot });
            }
            lower[(i, i)] = pivot.sqrt();
        }

        Ok(Self { lower })
    }

    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    pub fn as_mat(&self) -> MatRef<'_, f64> {
        self.lower.as_ref()
    }

    /// `L * v`.
    pub fn mul_vec(&self, v: &[f64], out: &mut [f64]) {
        let dim = self.dim();
        assert!(v.len() == dim);
        assert!(out.len() == dim);

        let v = Col::from_fn(dim, |i| v[i]);
        let prod = &self.lower * &v;
        out.iter_mut()
            .enumerate()
            .for_each(|(i, out)| *out = prod[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn factors_known_matrix() {
        let cov = Covariance::from_rows(&[
            vec![4., 12., -16.],
            vec![12., 37., -43.],
            vec![-16., -43., 98.],
        ])
        .unwrap();
        let factor = CholeskyFactor::new(&cov).unwrap();
        let l = factor.as_mat();
        let expected = [[2., 0., 0.], [6., 1., 0.], [-8., 5., 3.]];
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(l[(i, j)], expected[i][j], epsilon = 1e-12);
            }
        }

        let mut out = [0.; 3];
        factor.mul_vec(&[1., 1., 1.], &mut out);
        assert_abs_diff_eq!(out[0], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 7., epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 0., epsilon = 1e-12);
    }

    #[test]
    fn rejects_negative_diagonal() {
        let cov = Covariance::from_rows(&[vec![-1., 0.], vec![0., 1.]]).unwrap();
        let err = CholeskyFactor::new(&cov).unwrap_err();
        assert!(matches!(err, McmcError::NotPositiveDefinite { row: 0, .. }));
    }

    #[test]
    fn rejects_singular_matrix() {
        let cov = Covariance::from_rows(&[vec![1., 1.], vec![1., 1.]]).unwrap();
        match CholeskyFactor::new(&cov) {
            Err(McmcError::NotPositiveDefinite { row, pivot }) => {
                assert_eq!(row, 1);
                assert_eq!(pivot, 0.);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    fn spd_matrix() -> impl Strategy<Value = Vec<Vec<f64>>> {
        (1usize..6).prop_flat_map(|n| {
            proptest::collection::vec(-2f64..2., n * n).prop_map(move |a| {
                (0..n)
                    .map(|i| {
                        (0..n)
                            .map(|j| {
                                let dot: f64 = (0..n).map(|k| a[i * n + k] * a[j * n + k]).sum();
                                if i == j {
                                    dot + 0.5
                                } else {
                                    dot
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
        })
    }

    proptest! {
        #[test]
        fn reconstructs_covariance(rows in spd_matrix()) {
            let cov = Covariance::from_rows(&rows).unwrap();
            let factor = CholeskyFactor::new(&cov).unwrap();
            let l = factor.as_mat();
            let product = l * l.transpose();
            let n = rows.len();
            for i in 0..n {
                for j in 0..n {
                    prop_assert!((product[(i, j)] - rows[i][j]).abs() < 1e-9);
                    if j > i {
                        prop_assert_eq!(l[(i, j)], 0.);
                    }
                }
            }
        }
    }
}
