//! Synthetic two-group classification data for demos and tests.
//!
//! Each row belongs to exactly one of two groups. Features are standard normal;
//! the clean label is `1[w · x > 0]` and is then flipped with a per-group
//! probability, so the two groups can be made to differ in attainable accuracy.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dataset::{Dataset, DatasetError};

/// Parameters of the synthetic generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub n_rows: usize,
    pub n_features: usize,
    /// Probability that a row belongs to the first group.
    pub group_a_fraction: f64,
    pub group_a_name: String,
    pub group_b_name: String,
    pub label_noise_a: f64,
    pub label_noise_b: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_rows: 5_000,
            n_features: 2,
            group_a_fraction: 0.5,
            group_a_name: "group_a".into(),
            group_b_name: "group_b".into(),
            label_noise_a: 0.10,
            label_noise_b: 0.05,
        }
    }
}

/// Standard normal draw (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen() is in [0, 1); 1 - u keeps the log argument away from zero.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Generate a two-group dataset.
pub fn generate<R: Rng + ?Sized>(
    config: &SyntheticConfig,
    rng: &mut R,
) -> Result<Dataset, DatasetError> {
    let weights: Vec<f64> = (0..config.n_features)
        .map(|j| if j == 0 { 1.0 } else { 0.5 / j as f64 })
        .collect();

    let mut features = Vec::with_capacity(config.n_rows);
    let mut labels = Vec::with_capacity(config.n_rows);
    let mut in_a = Vec::with_capacity(config.n_rows);

    for _ in 0..config.n_rows {
        let x: Vec<f64> = (0..config.n_features).map(|_| standard_normal(rng)).collect();
        let is_a = rng.gen::<f64>() < config.group_a_fraction;
        let score: f64 = x.iter().zip(&weights).map(|(a, b)| a * b).sum();
        let clean = score > 0.0;
        let noise = if is_a {
            config.label_noise_a
        } else {
            config.label_noise_b
        };
        let flipped = rng.gen::<f64>() < noise;
        labels.push(if clean != flipped { 1.0 } else { 0.0 });
        features.push(x);
        in_a.push(is_a);
    }

    let in_b = in_a.iter().map(|a| !a).collect();
    let mut sensitive = BTreeMap::new();
    sensitive.insert(config.group_a_name.clone(), in_a);
    sensitive.insert(config.group_b_name.clone(), in_b);

    let feature_names = (0..config.n_features).map(|j| format!("x{j}")).collect();
    Dataset::new(feature_names, features, labels, sensitive)
}
