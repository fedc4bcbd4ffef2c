//! Logistic regression: p = σ(θ₀ + θ·x).

use crate::data::Dataset;

use super::linalg::{affine, design_row, solve};
use super::{Model, ModelError};

const NEWTON_MAX_ITER: usize = 50;
const NEWTON_TOL: f64 = 1e-8;
/// L2 penalty keeping the fit finite on separable data.
const RIDGE: f64 = 1e-4;

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticRegression;

impl Model for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn n_params(&self, n_features: usize) -> usize {
        n_features + 1
    }

    fn predict(&self, theta: &[f64], features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|x| sigmoid(affine(theta, x))).collect()
    }

    fn prediction_gradients(&self, theta: &[f64], features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        features
            .iter()
            .map(|x| {
                let p = sigmoid(affine(theta, x));
                let s = p * (1.0 - p);
                design_row(x).into_iter().map(|v| s * v).collect()
            })
            .collect()
    }

    /// Newton–Raphson (IRLS) on the ridge-penalized log loss.
    fn fit(&self, data: &Dataset) -> Result<Vec<f64>, ModelError> {
        if data.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let d = self.n_params(data.n_features());
        let n = data.n_rows() as f64;
        let mut theta = vec![0.0; d];

        for iteration in 0..NEWTON_MAX_ITER {
            let mut grad = vec![0.0; d];
            let mut hess = vec![vec![0.0; d]; d];
            for (x, &y) in data.features().iter().zip(data.labels()) {
                let row = design_row(x);
                let p = sigmoid(affine(&theta, x));
                let w = p * (1.0 - p);
                for j in 0..d {
                    grad[j] += (p - y) * row[j] / n;
                    for k in 0..d {
                        hess[j][k] += w * row[j] * row[k] / n;
                    }
                }
            }
            for j in 1..d {
                grad[j] += RIDGE * theta[j];
                hess[j][j] += RIDGE;
            }
            hess[0][0] += 1e-10;

            let step = solve(hess, grad)?;
            let mut max_step = 0.0_f64;
            for (t, s) in theta.iter_mut().zip(&step) {
                *t -= s;
                max_step = max_step.max(s.abs());
            }
            if theta.iter().any(|t| !t.is_finite()) {
                return Err(ModelError::NonFinite);
            }
            if max_step < NEWTON_TOL {
                tracing::trace!(iteration, "logistic fit converged");
                break;
            }
        }
        Ok(theta)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let model = LogisticRegression;
        let theta = [0.3, -0.7, 1.1];
        let x = vec![vec![0.5, 2.0]];
        let jac = model.prediction_gradients(&theta, &x);
        for j in 0..3 {
            let mut up = theta;
            let mut down = theta;
            up[j] += 1e-6;
            down[j] -= 1e-6;
            let fd = (model.predict(&up, &x)[0] - model.predict(&down, &x)[0]) / 2e-6;
            assert!((jac[0][j] - fd).abs() < 1e-8);
        }
    }

    #[test]
    fn fit_recovers_direction() {
        // y = 1 when x > 0, with a few flipped labels so the data is not separable.
        let xs: Vec<f64> = (0..200).map(|i| (i as f64 - 99.5) / 50.0).collect();
        let labels: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let clean = x > 0.0;
                if i % 10 == 0 { f64::from(u8::from(!clean)) } else { f64::from(u8::from(clean)) }
            })
            .collect();
        let data = Dataset::new(
            vec!["x".into()],
            xs.iter().map(|&x| vec![x]).collect(),
            labels,
            BTreeMap::new(),
        )
        .unwrap();
        let theta = LogisticRegression.fit(&data).unwrap();
        assert!(theta[1] > 1.0);
        assert!(theta[0].abs() < 0.5);
    }
}
