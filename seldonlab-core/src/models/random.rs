//! Baseline that predicts 0.5 for every row, whatever θ.

use crate::data::Dataset;

use super::{Model, ModelError};

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomClassifier;

impl Model for RandomClassifier {
    fn name(&self) -> &'static str {
        "random_classifier"
    }

    fn n_params(&self, _n_features: usize) -> usize {
        0
    }

    fn predict(&self, _theta: &[f64], features: &[Vec<f64>]) -> Vec<f64> {
        vec![0.5; features.len()]
    }

    fn prediction_gradients(&self, _theta: &[f64], features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        vec![Vec::new(); features.len()]
    }

    fn fit(&self, _data: &Dataset) -> Result<Vec<f64>, ModelError> {
        Ok(Vec::new())
    }
}
