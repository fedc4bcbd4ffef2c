//! In-memory tabular dataset: feature rows, labels, and sensitive-group indicators.
//!
//! A `Dataset` is immutable once constructed. Every operation that changes the
//! row set (`select`, `resample`, `shuffled_prefix`) returns a new dataset.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DatasetError {
    #[error("row {row} has {got} features, expected {expected}")]
    FeatureWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("{got} labels for {expected} rows")]
    LabelCount { expected: usize, got: usize },

    #[error("sensitive column '{column}' has {got} entries for {expected} rows")]
    SensitiveLength {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("non-finite value in row {row}")]
    NonFinite { row: usize },

    #[error("column name '{0}' is used more than once")]
    DuplicateColumn(String),
}

/// Tabular dataset with named features, a label column, and boolean sensitive columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetParts")]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Vec<f64>,
    sensitive: BTreeMap<String, Vec<bool>>,
}

/// Unvalidated serialized form; deserialization goes through `Dataset::new`.
#[derive(Deserialize)]
struct DatasetParts {
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Vec<f64>,
    sensitive: BTreeMap<String, Vec<bool>>,
}

impl TryFrom<DatasetParts> for Dataset {
    type Error = DatasetError;

    fn try_from(parts: DatasetParts) -> Result<Self, Self::Error> {
        Dataset::new(parts.feature_names, parts.features, parts.labels, parts.sensitive)
    }
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        labels: Vec<f64>,
        sensitive: BTreeMap<String, Vec<bool>>,
    ) -> Result<Self, DatasetError> {
        let n = features.len();
        if labels.len() != n {
            return Err(DatasetError::LabelCount {
                expected: n,
                got: labels.len(),
            });
        }
        for (row, values) in features.iter().enumerate() {
            if values.len() != feature_names.len() {
                return Err(DatasetError::FeatureWidth {
                    row,
                    expected: feature_names.len(),
                    got: values.len(),
                });
            }
            if values.iter().any(|v| !v.is_finite()) || !labels[row].is_finite() {
                return Err(DatasetError::NonFinite { row });
            }
        }
        for (column, flags) in &sensitive {
            if flags.len() != n {
                return Err(DatasetError::SensitiveLength {
                    column: column.clone(),
                    expected: n,
                    got: flags.len(),
                });
            }
            if feature_names.contains(column) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for name in &feature_names {
            if !seen.insert(name) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self {
            feature_names,
            features,
            labels,
            sensitive,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// Names of the sensitive indicator columns, sorted.
    pub fn sensitive_names(&self) -> Vec<String> {
        self.sensitive.keys().cloned().collect()
    }

    pub fn sensitive(&self, column: &str) -> Option<&[bool]> {
        self.sensitive.get(column).map(Vec::as_slice)
    }

    /// New dataset holding the given rows, in the given order. Indices may repeat.
    ///
    /// # Panics
    /// If any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            sensitive: self
                .sensitive
                .iter()
                .map(|(k, flags)| (k.clone(), indices.iter().map(|&i| flags[i]).collect()))
                .collect(),
        }
    }

    /// `n` rows drawn uniformly with replacement.
    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Dataset {
        if self.is_empty() {
            return self.select(&[]);
        }
        let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..self.n_rows())).collect();
        self.select(&indices)
    }

    /// The first `n` rows after a seeded shuffle (sampling without replacement).
    pub fn shuffled_prefix<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Dataset {
        let mut indices: Vec<usize> = (0..self.n_rows()).collect();
        indices.shuffle(rng);
        indices.truncate(n);
        self.select(&indices)
    }

    /// BLAKE3 hex digest of the dataset contents.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for name in &self.feature_names {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        for (row, label) in self.features.iter().zip(&self.labels) {
            for v in row {
                hasher.update(&v.to_le_bytes());
            }
            hasher.update(&label.to_le_bytes());
        }
        for (name, flags) in &self.sensitive {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            for &f in flags {
                hasher.update(&[u8::from(f)]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}
