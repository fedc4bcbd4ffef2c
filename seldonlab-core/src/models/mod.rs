//! Base models and primary objectives.
//!
//! Every model is a parametric map θ ↦ predictions with a closed-form Jacobian,
//! so the optimizer can push gradients through constraint bounds.

pub mod linalg;
pub mod linear;
pub mod logistic;
pub mod objectives;
pub mod random;

use serde::{Deserialize, Serialize};

use crate::data::Dataset;

pub use linear::LinearRegression;
pub use logistic::{sigmoid, LogisticRegression};
pub use objectives::Objective;
pub use random::RandomClassifier;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("cannot fit a model on zero rows")]
    EmptyData,

    #[error("singular system while fitting")]
    Singular,

    #[error("fit produced non-finite parameters")]
    NonFinite,
}

/// A parametric model with analytic prediction gradients.
pub trait Model: Send + Sync {
    /// Stable identifier (e.g. "logistic_regression").
    fn name(&self) -> &'static str;

    /// Length of θ for data with `n_features` feature columns.
    fn n_params(&self, n_features: usize) -> usize;

    fn predict(&self, theta: &[f64], features: &[Vec<f64>]) -> Vec<f64>;

    /// Jacobian rows: `out[i][j] = ∂prediction_i / ∂θ_j`.
    fn prediction_gradients(&self, theta: &[f64], features: &[Vec<f64>]) -> Vec<Vec<f64>>;

    /// Unconstrained fit, used for initial solutions and baselines.
    fn fit(&self, data: &Dataset) -> Result<Vec<f64>, ModelError>;
}

/// Serializable model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    LinearRegression,
    RandomClassifier,
}

impl ModelKind {
    pub fn build(self) -> Box<dyn Model> {
        match self {
            ModelKind::LogisticRegression => Box::new(LogisticRegression),
            ModelKind::LinearRegression => Box::new(LinearRegression),
            ModelKind::RandomClassifier => Box::new(RandomClassifier),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::RandomClassifier => "random_classifier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            ModelKind::LogisticRegression,
            ModelKind::LinearRegression,
            ModelKind::RandomClassifier,
        ]
        .into_iter()
        .find(|k| k.name() == name)
    }

    /// Objective a model of this kind is naturally trained on.
    pub fn default_objective(self) -> Objective {
        match self {
            ModelKind::LinearRegression => Objective::MeanSquaredError,
            _ => Objective::BinaryLogLoss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_build_matching_models() {
        for kind in [
            ModelKind::LogisticRegression,
            ModelKind::LinearRegression,
            ModelKind::RandomClassifier,
        ] {
            assert_eq!(kind.build().name(), kind.name());
            assert_eq!(ModelKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn random_classifier_is_constant() {
        let m = ModelKind::RandomClassifier.build();
        assert_eq!(m.n_params(4), 0);
        assert_eq!(m.predict(&[], &[vec![1.0], vec![-3.0]]), vec![0.5, 0.5]);
    }
}
