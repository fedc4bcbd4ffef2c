//! Linear regression: ŷ = θ₀ + θ·x.

use crate::data::Dataset;

use super::linalg::{affine, design_row, solve};
use super::{Model, ModelError};

const RIDGE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegression;

impl Model for LinearRegression {
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn n_params(&self, n_features: usize) -> usize {
        n_features + 1
    }

    fn predict(&self, theta: &[f64], features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|x| affine(theta, x)).collect()
    }

    fn prediction_gradients(&self, _theta: &[f64], features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        features.iter().map(|x| design_row(x)).collect()
    }

    /// Least squares through the normal equations.
    fn fit(&self, data: &Dataset) -> Result<Vec<f64>, ModelError> {
        if data.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let d = self.n_params(data.n_features());
        let mut xtx = vec![vec![0.0; d]; d];
        let mut xty = vec![0.0; d];
        for (x, &y) in data.features().iter().zip(data.labels()) {
            let row = design_row(x);
            for j in 0..d {
                xty[j] += row[j] * y;
                for k in 0..d {
                    xtx[j][k] += row[j] * row[k];
                }
            }
        }
        for (j, row) in xtx.iter_mut().enumerate() {
            row[j] += RIDGE;
        }
        solve(xtx, xty)
    }
}
