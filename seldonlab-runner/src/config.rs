//! Experiment configuration: which models to run, on how much data, how often.
//!
//! Loaded from TOML; every field has a default so a config file only needs
//! to name what it changes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use seldonlab_core::models::ModelKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("data_fracs must not be empty")]
    NoFractions,

    #[error("data fraction {0} is outside (0, 1]")]
    InvalidFraction(f64),

    #[error("n_trials must be at least 1")]
    ZeroTrials,

    #[error("n_workers must be at least 1")]
    ZeroWorkers,

    #[error("no models selected")]
    NoModels,

    #[error("model {0} listed twice")]
    DuplicateModel(ModelId),
}

/// A model the harness trains: the constrained engine or an unconstrained baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    Seldonian,
    LogisticRegression,
    LinearRegression,
    RandomClassifier,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::Seldonian,
        ModelId::LogisticRegression,
        ModelId::LinearRegression,
        ModelId::RandomClassifier,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelId::Seldonian => "seldonian",
            ModelId::LogisticRegression => "logistic_regression",
            ModelId::LinearRegression => "linear_regression",
            ModelId::RandomClassifier => "random_classifier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Base model for a baseline; `None` for the constrained engine, whose
    /// base model comes from the specification.
    pub fn baseline_kind(self) -> Option<ModelKind> {
        match self {
            ModelId::Seldonian => None,
            ModelId::LogisticRegression => Some(ModelKind::LogisticRegression),
            ModelId::LinearRegression => Some(ModelKind::LinearRegression),
            ModelId::RandomClassifier => Some(ModelKind::RandomClassifier),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a trial's training set is drawn from the full dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataGenMethod {
    /// `round(frac · n)` rows with replacement.
    #[default]
    Resample,
    /// First `round(frac · n)` rows after a seeded shuffle.
    Subsample,
}

/// Score of a trained model on the evaluation dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMetric {
    /// Probabilistic accuracy: mean of `p` on positives and `1 − p` on negatives.
    #[default]
    Accuracy,
    LogLoss,
    Mse,
}

impl PerformanceMetric {
    pub fn name(self) -> &'static str {
        match self {
            PerformanceMetric::Accuracy => "accuracy",
            PerformanceMetric::LogLoss => "log_loss",
            PerformanceMetric::Mse => "mse",
        }
    }

    pub fn higher_is_better(self) -> bool {
        matches!(self, PerformanceMetric::Accuracy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub data_fracs: Vec<f64>,
    pub n_trials: usize,
    pub models: Vec<ModelId>,
    pub n_workers: usize,
    pub datagen: DataGenMethod,
    /// Master seed; every unit's seed derives from it.
    pub seed: u64,
    pub results_dir: PathBuf,
    pub performance_metric: PerformanceMetric,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_fracs: logspace(-3.0, 0.0, 15),
            n_trials: 50,
            models: vec![
                ModelId::Seldonian,
                ModelId::LogisticRegression,
                ModelId::RandomClassifier,
            ],
            n_workers: 8,
            datagen: DataGenMethod::Resample,
            seed: 42,
            results_dir: PathBuf::from("results"),
            performance_metric: PerformanceMetric::Accuracy,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_fracs.is_empty() {
            return Err(ConfigError::NoFractions);
        }
        if let Some(&bad) = self.data_fracs.iter().find(|f| !(**f > 0.0 && **f <= 1.0)) {
            return Err(ConfigError::InvalidFraction(bad));
        }
        if self.n_trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        if self.n_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        for (i, model) in self.models.iter().enumerate() {
            if self.models[..i].contains(model) {
                return Err(ConfigError::DuplicateModel(*model));
            }
        }
        Ok(())
    }

    /// Total number of (model, fraction, trial) units.
    pub fn n_units(&self) -> usize {
        self.models.len() * self.data_fracs.len() * self.n_trials
    }
}

/// `n` points evenly spaced in log10 between `10^start` and `10^stop`.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(start)],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        10f64.powf(stop)
                    } else {
                        10f64.powf(start + step * i as f64)
                    }
                })
                .collect()
        }
    }
}
