//! Primary objectives minimized by the optimizer.

use serde::{Deserialize, Serialize};

/// Probabilities are clamped this far from 0 and 1 before taking logs.
const PROB_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    BinaryLogLoss,
    MeanSquaredError,
}

impl Objective {
    pub fn value(self, predictions: &[f64], labels: &[f64]) -> f64 {
        let n = predictions.len() as f64;
        match self {
            Objective::BinaryLogLoss => {
                -predictions
                    .iter()
                    .zip(labels)
                    .map(|(&p, &y)| {
                        let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                        y * p.ln() + (1.0 - y) * (1.0 - p).ln()
                    })
                    .sum::<f64>()
                    / n
            }
            Objective::MeanSquaredError => {
                predictions
                    .iter()
                    .zip(labels)
                    .map(|(p, y)| (p - y).powi(2))
                    .sum::<f64>()
                    / n
            }
        }
    }

    /// ∂value/∂predictionᵢ for every row.
    pub fn gradient_wrt_predictions(self, predictions: &[f64], labels: &[f64]) -> Vec<f64> {
        let n = predictions.len() as f64;
        predictions
            .iter()
            .zip(labels)
            .map(|(&p, &y)| match self {
                Objective::BinaryLogLoss => {
                    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                    (p - y) / (p * (1.0 - p)) / n
                }
                Objective::MeanSquaredError => 2.0 * (p - y) / n,
            })
            .collect()
    }

    /// ∂value/∂θ by the chain rule through the prediction Jacobian.
    pub fn gradient(
        self,
        predictions: &[f64],
        jacobian: &[Vec<f64>],
        labels: &[f64],
        n_params: usize,
    ) -> Vec<f64> {
        let dp = self.gradient_wrt_predictions(predictions, labels);
        let mut grad = vec![0.0; n_params];
        for (d, row) in dp.iter().zip(jacobian) {
            for (g, j) in grad.iter_mut().zip(row) {
                *g += d * j;
            }
        }
        grad
    }
}
