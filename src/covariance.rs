use std::{fmt, str::FromStr};

use faer::{Mat, MatRef};
use serde::{Deserialize, Serialize};

use crate::error::{McmcError, Result};

/// How small variances are raised to the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceAdjustmentMethod {
    /// Scale the whole row and column, keeping the correlations.
    #[default]
    Covariance,
    /// Only raise the variance, leaving the covariances alone.
    Correlation,
    /// Use the covariance as given.
    None,
}

impl FromStr for CovarianceAdjustmentMethod {
    type Err = McmcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "covariance" => Ok(Self::Covariance),
            "correlation" => Ok(Self::Correlation),
            "none" => Ok(Self::None),
            _ => Err(McmcError::UnsupportedOption {
                name: "covariance_adjustment_method",
                value: s.to_string(),
                expected: "covariance, correlation, none",
            }),
        }
    }
}

impl fmt::Display for CovarianceAdjustmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Covariance => "covariance",
            Self::Correlation => "correlation",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Settings for turning an estimated covariance into a proposal covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceAdjustment {
    pub method: CovarianceAdjustmentMethod,
    /// Largest absolute correlation allowed between two parameters.
    pub max_correlation: f64,
    /// Smallest non-zero variance, relative to the width of the bounds.
    pub relative_floor: f64,
}

impl Default for CovarianceAdjustment {
    fn default() -> Self {
        Self {
            method: CovarianceAdjustmentMethod::Covariance,
            max_correlation: 0.8,
            relative_floor: 1e-4,
        }
    }
}

/// A dense symmetric covariance over all free parameters.
///
/// Values are never modified in place; adjustment and re-estimation
/// return a new matrix.
#[derive(Debug, Clone)]
pub struct Covariance {
    matrix: Mat<f64>,
}

impl Covariance {
    /// Wrap a square, symmetric matrix.
    pub fn new(matrix: Mat<f64>) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(McmcError::DimensionMismatch {
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        check_symmetric(matrix.as_ref())?;
        Ok(Self { matrix })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let dim = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != dim) {
            return Err(McmcError::DimensionMismatch {
                expected: dim,
                found: row.len(),
            });
        }
        Self::new(Mat::from_fn(dim, dim, |i, j| rows[i][j]))
    }

    pub fn from_diagonal(variances: &[f64]) -> Self {
        let dim = variances.len();
        Self {
            matrix: Mat::from_fn(dim, dim, |i, j| if i == j { variances[i] } else { 0. }),
        }
    }

    /// Sample covariance of equally long draws, using the unbiased `n - 1` divisor.
    ///
    /// Returns `None` with fewer than two draws.
    pub fn empirical<'a>(draws: impl IntoIterator<Item = &'a [f64]>) -> Option<Self> {
        let draws: Vec<&[f64]> = draws.into_iter().collect();
        if draws.len() < 2 {
            return None;
        }
        let dim = draws[0].len();
        assert!(draws.iter().all(|draw| draw.len() == dim));
        let count = draws.len() as f64;

        let mean: Vec<f64> = (0..dim)
            .map(|i| draws.iter().map(|draw| draw[i]).sum::<f64>() / count)
            .collect();

        let mut matrix: Mat<f64> = Mat::zeros(dim, dim);
        for i in 0..dim {
            for j in 0..=i {
                let sxy: f64 = draws
                    .iter()
                    .map(|draw| (draw[i] - mean[i]) * (draw[j] - mean[j]))
                    .sum();
                let cov = sxy / (count - 1.);
                matrix[(i, j)] = cov;
                matrix[(j, i)] = cov;
            }
        }
        Some(Self { matrix })
    }

    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.matrix[(row, col)]
    }

    pub fn variance(&self, index: usize) -> f64 {
        self.matrix[(index, index)]
    }

    pub fn correlation(&self, row: usize, col: usize) -> f64 {
        self.get(row, col) / (self.variance(row) * self.variance(col)).sqrt()
    }

    pub fn as_mat(&self) -> MatRef<'_, f64> {
        self.matrix.as_ref()
    }

    /// Take the rows and columns of inactive parameters from `previous`.
    ///
    /// Parameters that never move have no empirical variance.
    pub fn with_inactive_from(&self, previous: &Covariance, active: &[bool]) -> Covariance {
        let dim = self.dim();
        assert!(previous.dim() == dim);
        assert!(active.len() == dim);
        Covariance {
            matrix: Mat::from_fn(dim, dim, |i, j| {
                if active[i] && active[j] {
                    self.matrix[(i, j)]
                } else {
                    previous.matrix[(i, j)]
                }
            }),
        }
    }

    /// Clip correlations and raise small variances.
    ///
    /// `bound_ranges` holds `upper - lower` for every parameter.
    pub fn adjust(&self, adjustment: &CovarianceAdjustment, bound_ranges: &[f64]) -> Covariance {
        assert!(bound_ranges.len() == self.dim());
        if adjustment.method == CovarianceAdjustmentMethod::None {
            return self.clone();
        }

        let dim = self.dim();
        let mut matrix = self.matrix.clone();

        for i in 0..dim {
            for j in (i + 1)..dim {
                let limit = adjustment.max_correlation * (matrix[(i, i)] * matrix[(j, j)]).sqrt();
                let value = matrix[(i, j)];
                if value.abs() > limit {
                    let clipped = limit.copysign(value);
                    matrix[(i, j)] = clipped;
                    matrix[(j, i)] = clipped;
                }
            }
        }

        for (i, &range) in bound_ranges.iter().enumerate() {
            let variance = matrix[(i, i)];
            let floor = adjustment.relative_floor * range;
            if variance == 0. || variance >= floor {
                continue;
            }
            match adjustment.method {
                CovarianceAdjustmentMethod::Covariance => {
                    let scale = (floor / variance).sqrt();
                    for j in 0..dim {
                        if j != i {
                            matrix[(i, j)] *= scale;
                            matrix[(j, i)] *= scale;
                        }
                    }
                    matrix[(i, i)] = floor;
                }
                CovarianceAdjustmentMethod::Correlation => {
                    matrix[(i, i)] = floor;
                }
                CovarianceAdjustmentMethod::None => unreachable!(),
            }
        }

        Covariance { matrix }
    }
}

/// Relative difference tolerated between mirrored entries.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

fn check_symmetric(matrix: MatRef<'_, f64>) -> Result<()> {
    for row in 0..matrix.nrows() {
        for col in (row + 1)..matrix.ncols() {
            let upper = matrix[(row, col)];
            let lower = matrix[(col, row)];
            if (upper - lower).abs() > SYMMETRY_TOLERANCE * upper.abs().max(lower.abs()) {
                return Err(McmcError::NotSymmetric {
                    row,
                    col,
                    upper,
                    lower,
                });
            }
        }
    }
    Ok(())
}
