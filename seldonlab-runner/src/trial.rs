//! One experiment trial: draw a training set, train one model, score it.
//!
//! A trial never returns an error. Engine failures are recorded as
//! [`TrialStatus::Failed`] so the rest of the experiment keeps going.
//! That includes a model fit that fails, such as a singular system in the
//! initial solution or in a baseline: `NoSolutionFound` is reserved for a
//! safety test that ran and rejected its candidate.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use seldonlab_core::data::Dataset;
use seldonlab_core::models::Model;
use seldonlab_core::rng::SeedTree;
use seldonlab_core::{run_seldonian, Outcome, Specification};

use crate::config::{DataGenMethod, ModelId, PerformanceMetric};

/// Current schema version for persisted trial results.
///
/// Version 2 records the specification fingerprint and master seed.
pub const SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
    1
}

/// Identity of a trial: which model, how much data, which repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialKey {
    pub model: ModelId,
    pub data_frac: f64,
    pub trial: u64,
}

impl TrialKey {
    /// Stable, filesystem-safe identifier. Fractions are keyed by their exact bits.
    pub fn id(&self) -> String {
        format!(
            "{}-{:016x}-{:04}",
            self.model.name(),
            self.data_frac.to_bits(),
            self.trial
        )
    }
}

impl fmt::Display for TrialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frac={} trial={}", self.model, self.data_frac, self.trial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialStatus {
    Accepted,
    NoSolutionFound,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub key: TrialKey,
    /// Fingerprint of the specification the trial trained under.
    #[serde(default)]
    pub spec_fingerprint: String,
    /// Master seed of the experiment.
    #[serde(default)]
    pub seed: u64,
    pub status: TrialStatus,
    /// Metric on the evaluation dataset; `None` without a solution.
    pub performance: Option<f64>,
    /// Ground-truth pass/fail per constraint; empty without a solution.
    pub constraints_passed: Vec<bool>,
    pub n_samples: usize,
    pub wall_seconds: f64,
    pub theta: Option<Vec<f64>>,
    pub completed_at: DateTime<Utc>,
}

impl TrialResult {
    pub fn has_solution(&self) -> bool {
        self.theta.is_some()
    }

    /// A returned solution that breaks some constraint on the evaluation data.
    pub fn violated(&self) -> bool {
        self.has_solution() && self.constraints_passed.iter().any(|passed| !passed)
    }

    /// Whether this result came from the run identified by `spec_fingerprint` and `seed`.
    pub fn belongs_to(&self, spec_fingerprint: &str, seed: u64) -> bool {
        self.spec_fingerprint == spec_fingerprint && self.seed == seed
    }
}

/// A scheduled trial with its derived seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkUnit {
    pub key: TrialKey,
    pub seed: u64,
}

impl WorkUnit {
    /// Seed derived from the master seed and `(data_frac, trial)` only, so every
    /// model sees the same training set for a given unit.
    pub fn new(key: TrialKey, seeds: &SeedTree) -> Self {
        Self {
            key,
            seed: seeds.cell_seed(key.data_frac, key.trial),
        }
    }
}

/// Everything a worker shares read-only.
#[derive(Debug, Clone)]
pub struct TrialContext {
    pub spec: Arc<Specification>,
    /// `spec.fingerprint()`, computed once per experiment.
    pub spec_fingerprint: String,
    pub master_seed: u64,
    pub evaluation: Arc<Dataset>,
    pub datagen: DataGenMethod,
    pub metric: PerformanceMetric,
}

/// Training set size for `frac` of `n` rows.
pub fn sample_size(frac: f64, n: usize) -> usize {
    (frac * n as f64).round() as usize
}

/// `n` rows of `full`, with replacement for `Resample` and without for `Subsample`.
pub fn draw_training_set(
    datagen: DataGenMethod,
    full: &Dataset,
    n: usize,
    rng: &mut StdRng,
) -> Dataset {
    match datagen {
        DataGenMethod::Resample => full.resample(rng, n),
        DataGenMethod::Subsample => full.shuffled_prefix(rng, n),
    }
}

/// Run one unit to completion.
pub fn run_unit(unit: &WorkUnit, ctx: &TrialContext) -> TrialResult {
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(unit.seed);

    let full = ctx.spec.dataset();
    let n = sample_size(unit.key.data_frac, full.n_rows());
    let data = draw_training_set(ctx.datagen, full, n, &mut rng);
    let split_seed: u64 = rng.gen();

    let trained = match unit.key.model.baseline_kind() {
        None => train_constrained(ctx, data, split_seed),
        Some(kind) => {
            let model = kind.build();
            match model.fit(&data) {
                Ok(theta) => Trained::Solution { model, theta },
                Err(e) => Trained::Failed(format!("baseline fit: {e}")),
            }
        }
    };

    let (status, performance, constraints_passed, theta) = match trained {
        Trained::Solution { model, theta } => {
            let (performance, passed) = score(ctx, model.as_ref(), &theta);
            (TrialStatus::Accepted, Some(performance), passed, Some(theta))
        }
        Trained::NoSolution => (TrialStatus::NoSolutionFound, None, Vec::new(), None),
        Trained::Failed(reason) => {
            tracing::warn!(unit = %unit.key, %reason, "trial failed");
            (TrialStatus::Failed { reason }, None, Vec::new(), None)
        }
    };

    TrialResult {
        schema_version: SCHEMA_VERSION,
        key: unit.key,
        spec_fingerprint: ctx.spec_fingerprint.clone(),
        seed: ctx.master_seed,
        status,
        performance,
        constraints_passed,
        n_samples: n,
        wall_seconds: started.elapsed().as_secs_f64(),
        theta,
        completed_at: Utc::now(),
    }
}

enum Trained {
    Solution { model: Box<dyn Model>, theta: Vec<f64> },
    NoSolution,
    Failed(String),
}

fn train_constrained(ctx: &TrialContext, data: Dataset, split_seed: u64) -> Trained {
    let spec = match ctx.spec.with_dataset(data, split_seed) {
        Ok(spec) => spec,
        Err(e) => return Trained::Failed(format!("specification: {e}")),
    };
    match run_seldonian(&spec) {
        Ok(result) => match result.outcome {
            Outcome::Accepted { theta } => Trained::Solution {
                model: spec.model().build(),
                theta,
            },
            Outcome::NoSolutionFound => Trained::NoSolution,
        },
        Err(e) => Trained::Failed(e.to_string()),
    }
}

/// Performance and per-constraint ground truth on the evaluation dataset.
///
/// A constraint passes when its margin point estimate satisfies the
/// comparison; an estimate that cannot be computed counts as a failure.
fn score(ctx: &TrialContext, model: &dyn Model, theta: &[f64]) -> (f64, Vec<bool>) {
    let eval = ctx.evaluation.as_ref();
    let predictions = model.predict(theta, eval.features());
    let performance = ctx.metric.evaluate(&predictions, eval.labels());
    let passed = ctx
        .spec
        .parse_trees()
        .iter()
        .map(|tree| {
            let margin = tree.margin_estimate(eval, &predictions);
            if tree.comparison().is_strict() {
                margin > 0.0
            } else {
                margin >= 0.0
            }
        })
        .collect();
    (performance, passed)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use seldonlab_core::data::{generate, SyntheticConfig};
    use seldonlab_core::models::{LogisticRegression, ModelKind};
    use seldonlab_core::parse_tree::FairnessTemplate;
    use seldonlab_core::spec::OptimizationConfig;
    use seldonlab_core::{make_parse_trees, SpecOptions};

    pub(crate) fn context(n_rows: usize, num_iters: usize) -> TrialContext {
        let config = SyntheticConfig {
            n_rows,
            ..SyntheticConfig::default()
        };
        let data = generate(&config, &mut StdRng::seed_from_u64(11)).unwrap();
        let evaluation = generate(&config, &mut StdRng::seed_from_u64(12)).unwrap();
        let constraint =
            FairnessTemplate::OverallAccuracyEquality.render("group_a", "group_b", 0.2);
        let trees = make_parse_trees(
            &[constraint],
            &[0.05],
            &["group_a".to_string(), "group_b".to_string()],
        )
        .unwrap();
        let options = SpecOptions {
            optimization: OptimizationConfig {
                num_iters,
                ..OptimizationConfig::default()
            },
            ..SpecOptions::default()
        };
        let spec = Specification::new(data, trees, options).unwrap();
        TrialContext {
            spec_fingerprint: spec.fingerprint(),
            master_seed: 42,
            spec: Arc::new(spec),
            evaluation: Arc::new(evaluation),
            datagen: DataGenMethod::Resample,
            metric: PerformanceMetric::Accuracy,
        }
    }

    fn unit(model: ModelId, data_frac: f64, trial: u64) -> WorkUnit {
        WorkUnit::new(
            TrialKey {
                model,
                data_frac,
                trial,
            },
            &SeedTree::new(42),
        )
    }

    #[test]
    fn key_ids_are_distinct_and_stable() {
        let a = unit(ModelId::Seldonian, 0.1, 0).key;
        let b = unit(ModelId::Seldonian, 0.1, 1).key;
        let c = unit(ModelId::RandomClassifier, 0.1, 0).key;
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id(), unit(ModelId::Seldonian, 0.1, 0).key.id());
        assert!(a.id().starts_with("seldonian-"));
    }

    #[test]
    fn models_share_the_unit_seed() {
        assert_eq!(
            unit(ModelId::Seldonian, 0.5, 3).seed,
            unit(ModelId::LogisticRegression, 0.5, 3).seed
        );
        assert_ne!(
            unit(ModelId::Seldonian, 0.5, 3).seed,
            unit(ModelId::Seldonian, 0.5, 4).seed
        );
    }

    #[test]
    fn baseline_trial_scores_on_evaluation_data() {
        let ctx = context(1_000, 10);
        let result = run_unit(&unit(ModelId::LogisticRegression, 1.0, 0), &ctx);
        assert_eq!(result.status, TrialStatus::Accepted);
        assert_eq!(result.n_samples, 1_000);
        assert_eq!(result.theta.as_ref().map(Vec::len), Some(3));
        assert_eq!(result.constraints_passed.len(), 1);
        let accuracy = result.performance.unwrap();
        assert!(accuracy > 0.6 && accuracy <= 1.0, "accuracy {accuracy}");
    }

    #[test]
    fn random_classifier_is_uninformed() {
        let ctx = context(500, 10);
        let result = run_unit(&unit(ModelId::RandomClassifier, 0.5, 0), &ctx);
        assert_eq!(result.performance, Some(0.5));
        assert_eq!(result.constraints_passed, vec![true]);
        assert!(!result.violated());
    }

    #[test]
    fn tiny_fraction_gives_no_solution() {
        let ctx = context(1_000, 10);
        let result = run_unit(&unit(ModelId::Seldonian, 0.002, 0), &ctx);
        assert_eq!(result.n_samples, 2);
        assert_eq!(result.status, TrialStatus::NoSolutionFound);
        assert!(result.performance.is_none());
        assert!(!result.violated());
    }

    #[test]
    fn trial_is_deterministic_apart_from_timing() {
        let ctx = context(600, 20);
        let u = unit(ModelId::Seldonian, 1.0, 2);
        let a = run_unit(&u, &ctx);
        let b = run_unit(&u, &ctx);
        assert_eq!(a.status, b.status);
        assert_eq!(a.theta, b.theta);
        assert_eq!(a.performance, b.performance);
    }

    #[test]
    fn subsample_draws_distinct_rows_deterministically() {
        let mut ctx = context(1_000, 5);
        ctx.datagen = DataGenMethod::Subsample;
        let u = unit(ModelId::LogisticRegression, 0.3, 1);

        let drawn = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            draw_training_set(ctx.datagen, ctx.spec.dataset(), 300, &mut rng)
        };
        let subset = drawn(u.seed);
        assert_eq!(subset.n_rows(), 300);
        assert_eq!(subset, drawn(u.seed));
        assert_ne!(subset, drawn(u.seed + 1));

        let mut rows: Vec<Vec<u64>> = subset
            .features()
            .iter()
            .map(|row| row.iter().map(|v| v.to_bits()).collect())
            .collect();
        rows.sort();
        rows.dedup();
        assert_eq!(rows.len(), 300, "subsampling repeated a row");

        let result = run_unit(&u, &ctx);
        assert_eq!(result.n_samples, 300);
        let expected = LogisticRegression.fit(&subset).unwrap();
        assert_eq!(result.theta, Some(expected));
        assert_eq!(run_unit(&u, &ctx).theta, result.theta);
    }

    #[test]
    fn results_carry_their_run_identity() {
        let ctx = context(300, 5);
        let result = run_unit(&unit(ModelId::RandomClassifier, 1.0, 0), &ctx);
        assert_eq!(result.spec_fingerprint, ctx.spec.fingerprint());
        assert!(result.belongs_to(&ctx.spec.fingerprint(), 42));
        assert!(!result.belongs_to(&ctx.spec.fingerprint(), 43));
        assert!(!result.belongs_to("other", 42));
    }

    /// Two identical, large feature columns: the normal equations are exactly singular.
    fn collinear_context() -> TrialContext {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = 1e6 * f64::from(i + 1);
                vec![x, x]
            })
            .collect();
        let labels = (0..40).map(|i| f64::from(i % 3)).collect();
        let data = Dataset::new(
            vec!["x".into(), "x_copy".into()],
            features,
            labels,
            BTreeMap::new(),
        )
        .unwrap();
        let trees = make_parse_trees(&["MSE <= 10"], &[0.05], &[]).unwrap();
        let options = SpecOptions {
            model: ModelKind::LinearRegression,
            ..SpecOptions::default()
        };
        let spec = Specification::new(data.clone(), trees, options).unwrap();
        TrialContext {
            spec_fingerprint: spec.fingerprint(),
            master_seed: 42,
            spec: Arc::new(spec),
            evaluation: Arc::new(data),
            datagen: DataGenMethod::Subsample,
            metric: PerformanceMetric::Mse,
        }
    }

    #[test]
    fn singular_fits_fail_rather_than_report_no_solution() {
        let ctx = collinear_context();
        for model in [ModelId::Seldonian, ModelId::LinearRegression] {
            let result = run_unit(&unit(model, 1.0, 0), &ctx);
            match &result.status {
                TrialStatus::Failed { reason } => {
                    assert!(reason.contains("singular"), "{model}: {reason}")
                }
                other => panic!("{model}: expected a failed trial, got {other:?}"),
            }
            assert!(result.performance.is_none());
            assert!(!result.violated());
        }
    }

    #[test]
    fn result_json_roundtrip() {
        let ctx = context(300, 5);
        let result = run_unit(&unit(ModelId::LogisticRegression, 1.0, 0), &ctx);
        let json = serde_json::to_string(&result).unwrap();
        let back: TrialResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
