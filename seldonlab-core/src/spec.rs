//! The Specification: everything a constrained training run needs.
//!
//! A `Specification` bundles the dataset, the model and objective, the compiled
//! constraints, the candidate/safety split fraction, and the optimizer settings.
//! It is immutable once built and validated; the harness derives per-trial
//! copies with `with_dataset`.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::models::{ModelKind, Objective};
use crate::parse_tree::ParseTree;

/// Current schema version for persisted specifications.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("frac_data_in_safety must be in (0, 1), got {0}")]
    InvalidSafetyFraction(f64),

    #[error("a specification needs at least one constraint")]
    NoConstraints,

    #[error("lambda_init has {got} entries; expected 1 or {constraints}")]
    LambdaInitLength { got: usize, constraints: usize },

    #[error("lambda_init entries must be finite and non-negative, got {0}")]
    InvalidLambda(f64),

    #[error("{name} must be positive, got {value}")]
    NonPositiveRate { name: &'static str, value: f64 },

    #[error("{name} must be in [0, 1), got {value}")]
    InvalidBeta { name: &'static str, value: f64 },

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("constraint {index} has delta {delta}; expected a value in (0, 1)")]
    InvalidDelta { index: usize, delta: f64 },

    #[error("constraint '{constraint}' references subgroup '{column}', which the dataset lacks")]
    MissingGroupColumn { constraint: String, column: String },

    #[error("gradient_tolerance must be positive, got {0}")]
    InvalidTolerance(f64),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed specification JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version {found} (max supported: {supported})")]
    SchemaVersion { found: u32, supported: u32 },
}

/// Gradient step rule for θ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

/// Which iterate of the search becomes the candidate solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Lowest-objective iterate whose predicted constraint bounds all hold;
    /// the final iterate when none does.
    #[default]
    BestFeasible,
    LastIterate,
}

/// Starting point of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSolution {
    /// Unconstrained fit of the model on the candidate split.
    #[default]
    Fit,
    Zeros,
}

/// Settings of the Lagrangian gradient search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub optimizer: OptimizerKind,
    pub alpha_theta: f64,
    pub alpha_lamb: f64,
    pub beta_velocity: f64,
    pub beta_rmsprop: f64,
    pub num_iters: usize,
    pub use_batches: bool,
    pub batch_size: usize,
    pub n_epochs: usize,
    /// One value per constraint, or a single value broadcast to all.
    pub lambda_init: Vec<f64>,
    /// Stop once the Lagrangian gradient's Euclidean norm falls below this.
    pub gradient_tolerance: Option<f64>,
    pub candidate_policy: CandidatePolicy,
    /// Width multiplier on the predicted safety-test bound.
    pub bound_inflation: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            alpha_theta: 0.01,
            alpha_lamb: 0.01,
            beta_velocity: 0.9,
            beta_rmsprop: 0.95,
            num_iters: 1500,
            use_batches: false,
            batch_size: 100,
            n_epochs: 10,
            lambda_init: vec![0.5],
            gradient_tolerance: None,
            candidate_policy: CandidatePolicy::BestFeasible,
            bound_inflation: 2.0,
        }
    }
}

/// Everything besides data and constraints, with the usual defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecOptions {
    pub model: ModelKind,
    /// Defaults to the model's natural objective.
    pub objective: Option<Objective>,
    pub frac_data_in_safety: f64,
    pub optimization: OptimizationConfig,
    pub initial_solution: InitialSolution,
    pub split_seed: u64,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            model: ModelKind::LogisticRegression,
            objective: None,
            frac_data_in_safety: 0.5,
            optimization: OptimizationConfig::default(),
            initial_solution: InitialSolution::Fit,
            split_seed: 0,
        }
    }
}

/// Candidate/safety partition of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub candidate: Dataset,
    pub safety: Dataset,
    pub candidate_indices: Vec<usize>,
    pub safety_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    dataset: Dataset,
    model: ModelKind,
    objective: Objective,
    parse_trees: Vec<ParseTree>,
    frac_data_in_safety: f64,
    optimization: OptimizationConfig,
    initial_solution: InitialSolution,
    split_seed: u64,
}

#[derive(Serialize, Deserialize)]
struct SpecFile {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    specification: Specification,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything that identifies a specification, with the dataset reduced to its digest.
#[derive(Serialize)]
struct FingerprintView<'a> {
    dataset: String,
    model: ModelKind,
    objective: Objective,
    parse_trees: &'a [ParseTree],
    frac_data_in_safety: f64,
    optimization: &'a OptimizationConfig,
    initial_solution: InitialSolution,
    split_seed: u64,
}

impl Specification {
    pub fn new(
        dataset: Dataset,
        parse_trees: Vec<ParseTree>,
        options: SpecOptions,
    ) -> Result<Self, SpecError> {
        let spec = Self {
            dataset,
            model: options.model,
            objective: options
                .objective
                .unwrap_or_else(|| options.model.default_objective()),
            parse_trees,
            frac_data_in_safety: options.frac_data_in_safety,
            optimization: options.optimization,
            initial_solution: options.initial_solution,
            split_seed: options.split_seed,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), SpecError> {
        let f = self.frac_data_in_safety;
        if !(f > 0.0 && f < 1.0) {
            return Err(SpecError::InvalidSafetyFraction(f));
        }
        if self.parse_trees.is_empty() {
            return Err(SpecError::NoConstraints);
        }

        let columns = self.dataset.sensitive_names();
        for (index, tree) in self.parse_trees.iter().enumerate() {
            let delta = tree.delta();
            if !(delta > 0.0 && delta < 1.0) {
                return Err(SpecError::InvalidDelta { index, delta });
            }
            for measure in tree.measures() {
                if let Some(missing) = measure.groups.iter().find(|g| !columns.contains(g)) {
                    return Err(SpecError::MissingGroupColumn {
                        constraint: tree.source().to_string(),
                        column: missing.clone(),
                    });
                }
            }
        }

        let opt = &self.optimization;
        let n_lambda = opt.lambda_init.len();
        if n_lambda != 1 && n_lambda != self.parse_trees.len() {
            return Err(SpecError::LambdaInitLength {
                got: n_lambda,
                constraints: self.parse_trees.len(),
            });
        }
        if let Some(&bad) = opt.lambda_init.iter().find(|l| !(l.is_finite() && **l >= 0.0)) {
            return Err(SpecError::InvalidLambda(bad));
        }
        for (name, value) in [
            ("alpha_theta", opt.alpha_theta),
            ("alpha_lamb", opt.alpha_lamb),
            ("bound_inflation", opt.bound_inflation),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SpecError::NonPositiveRate { name, value });
            }
        }
        for (name, value) in [
            ("beta_velocity", opt.beta_velocity),
            ("beta_rmsprop", opt.beta_rmsprop),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(SpecError::InvalidBeta { name, value });
            }
        }
        if opt.use_batches {
            if opt.batch_size == 0 {
                return Err(SpecError::ZeroCount("batch_size"));
            }
            if opt.n_epochs == 0 {
                return Err(SpecError::ZeroCount("n_epochs"));
            }
        } else if opt.num_iters == 0 {
            return Err(SpecError::ZeroCount("num_iters"));
        }
        if let Some(tol) = opt.gradient_tolerance {
            if !(tol > 0.0) {
                return Err(SpecError::InvalidTolerance(tol));
            }
        }
        Ok(())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn parse_trees(&self) -> &[ParseTree] {
        &self.parse_trees
    }

    pub fn frac_data_in_safety(&self) -> f64 {
        self.frac_data_in_safety
    }

    pub fn optimization(&self) -> &OptimizationConfig {
        &self.optimization
    }

    pub fn initial_solution(&self) -> InitialSolution {
        self.initial_solution
    }

    pub fn split_seed(&self) -> u64 {
        self.split_seed
    }

    /// Same settings on a different dataset and split seed.
    pub fn with_dataset(&self, dataset: Dataset, split_seed: u64) -> Result<Self, SpecError> {
        let spec = Self {
            dataset,
            split_seed,
            ..self.clone()
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Initial Lagrange multipliers, one per constraint.
    pub fn multipliers_init(&self) -> Vec<f64> {
        let init = &self.optimization.lambda_init;
        if init.len() == 1 {
            vec![init[0]; self.parse_trees.len()]
        } else {
            init.clone()
        }
    }

    /// Rows the safety test will see for a dataset of `n_rows`.
    pub fn safety_size(&self, n_rows: usize) -> usize {
        (n_rows as f64 * self.frac_data_in_safety).round() as usize
    }

    /// Deterministic disjoint candidate/safety partition of the dataset.
    pub fn split(&self, seed: u64) -> DataSplit {
        let n = self.dataset.n_rows();
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let n_safety = self.safety_size(n).min(n);
        let candidate_indices = indices.split_off(n_safety);
        let safety_indices = indices;
        DataSplit {
            candidate: self.dataset.select(&candidate_indices),
            safety: self.dataset.select(&safety_indices),
            candidate_indices,
            safety_indices,
        }
    }

    /// BLAKE3 hex digest identifying this specification.
    pub fn fingerprint(&self) -> String {
        let view = FingerprintView {
            dataset: self.dataset.fingerprint(),
            model: self.model,
            objective: self.objective,
            parse_trees: &self.parse_trees,
            frac_data_in_safety: self.frac_data_in_safety,
            optimization: &self.optimization,
            initial_solution: self.initial_solution,
            split_seed: self.split_seed,
        };
        let json = serde_json::to_vec(&view).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    pub fn to_json(&self) -> Result<String, SpecError> {
        let file = SpecFile {
            schema_version: SCHEMA_VERSION,
            specification: self.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Parse and re-validate a specification, rejecting unknown schema versions.
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let file: SpecFile = serde_json::from_str(json)?;
        if file.schema_version > SCHEMA_VERSION {
            return Err(SpecError::SchemaVersion {
                found: file.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        file.specification.validate()?;
        Ok(file.specification)
    }

    pub fn save(&self, path: &Path) -> Result<(), SpecError> {
        fs::write(path, self.to_json()?).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let json = fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::data::synthetic::{generate, SyntheticConfig};
    use crate::parse_tree::make_parse_trees;

    fn dataset(n: usize) -> Dataset {
        let config = SyntheticConfig {
            n_rows: n,
            ..SyntheticConfig::default()
        };
        generate(&config, &mut StdRng::seed_from_u64(11)).unwrap()
    }

    fn trees() -> Vec<ParseTree> {
        let cols = vec!["group_a".to_string(), "group_b".to_string()];
        make_parse_trees(&["(ACC | [group_a]) >= 0.5"], &[0.05], &cols).unwrap()
    }

    fn spec_with(options: SpecOptions) -> Result<Specification, SpecError> {
        Specification::new(dataset(100), trees(), options)
    }

    #[test]
    fn split_is_deterministic_disjoint_and_exhaustive() {
        let spec = spec_with(SpecOptions::default()).unwrap();
        let a = spec.split(7);
        let b = spec.split(7);
        assert_eq!(a, b);
        assert_eq!(a.safety.n_rows(), 50);
        assert_eq!(a.candidate.n_rows(), 50);

        let c: BTreeSet<usize> = a.candidate_indices.iter().copied().collect();
        let s: BTreeSet<usize> = a.safety_indices.iter().copied().collect();
        assert!(c.is_disjoint(&s));
        assert_eq!(c.union(&s).count(), 100);
        assert_ne!(spec.split(8).safety_indices, a.safety_indices);
    }

    #[test]
    fn split_size_rounds() {
        let options = SpecOptions {
            frac_data_in_safety: 0.25,
            ..SpecOptions::default()
        };
        let spec = Specification::new(dataset(10), trees(), options).unwrap();
        // round(10 * 0.25) = round(2.5) = 3
        assert_eq!(spec.split(0).safety.n_rows(), 3);
    }

    #[test]
    fn rejects_bad_configuration() {
        let bad_frac = SpecOptions {
            frac_data_in_safety: 1.0,
            ..SpecOptions::default()
        };
        assert!(matches!(spec_with(bad_frac), Err(SpecError::InvalidSafetyFraction(_))));

        let mut bad_lambda = SpecOptions::default();
        bad_lambda.optimization.lambda_init = vec![0.5, 0.5];
        assert!(matches!(
            spec_with(bad_lambda),
            Err(SpecError::LambdaInitLength { got: 2, constraints: 1 })
        ));

        let mut bad_rate = SpecOptions::default();
        bad_rate.optimization.alpha_theta = 0.0;
        assert!(matches!(spec_with(bad_rate), Err(SpecError::NonPositiveRate { name: "alpha_theta", .. })));

        let mut bad_beta = SpecOptions::default();
        bad_beta.optimization.beta_rmsprop = 1.0;
        assert!(matches!(spec_with(bad_beta), Err(SpecError::InvalidBeta { .. })));

        let mut no_iters = SpecOptions::default();
        no_iters.optimization.num_iters = 0;
        assert!(matches!(spec_with(no_iters), Err(SpecError::ZeroCount("num_iters"))));

        assert!(matches!(
            Specification::new(dataset(10), Vec::new(), SpecOptions::default()),
            Err(SpecError::NoConstraints)
        ));
    }

    #[test]
    fn rejects_constraints_on_missing_columns() {
        let cols = vec!["elsewhere".to_string()];
        let trees = make_parse_trees(&["(ACC | [elsewhere]) >= 0.5"], &[0.05], &cols).unwrap();
        let err = Specification::new(dataset(10), trees, SpecOptions::default()).unwrap_err();
        assert!(matches!(err, SpecError::MissingGroupColumn { ref column, .. } if column == "elsewhere"));
    }

    #[test]
    fn multipliers_broadcast() {
        let cols = vec!["group_a".to_string(), "group_b".to_string()];
        let trees = make_parse_trees(&["ACC >= 0.5", "(PR | [group_b]) <= 0.9"], &[0.05], &cols).unwrap();
        let spec = Specification::new(dataset(20), trees, SpecOptions::default()).unwrap();
        assert_eq!(spec.multipliers_init(), vec![0.5, 0.5]);
    }

    #[test]
    fn json_round_trip_keeps_fingerprint() {
        let spec = spec_with(SpecOptions::default()).unwrap();
        let back = Specification::from_json(&spec.to_json().unwrap()).unwrap();
        assert_eq!(back.fingerprint(), spec.fingerprint());

        let other = spec.with_dataset(dataset(100), 99).unwrap();
        assert_ne!(other.fingerprint(), spec.fingerprint());
    }

    #[test]
    fn rejects_future_schema_versions() {
        let spec = spec_with(SpecOptions::default()).unwrap();
        let json = spec.to_json().unwrap().replacen(
            &format!("\"schema_version\": {SCHEMA_VERSION}"),
            "\"schema_version\": 99",
            1,
        );
        assert!(matches!(
            Specification::from_json(&json),
            Err(SpecError::SchemaVersion { found: 99, .. })
        ));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        let spec = spec_with(SpecOptions::default()).unwrap();
        spec.save(&path).unwrap();
        assert_eq!(Specification::load(&path).unwrap(), spec);
    }
}
