//! Experiment harness: plan every (model, fraction, trial) unit, run the
//! missing ones on a worker pool, persist each result, then aggregate.
//!
//! Workers only compute. Finished results travel over a channel to the
//! calling thread, which is the sole writer to the result store. A restart
//! re-plans, skips every unit already in the store, and produces the same
//! report.
//!
//! A results directory belongs to one (specification, master seed) pair.
//! Stored results from any other pair are refused, and the report only
//! covers the units the current config plans.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use seldonlab_core::data::Dataset;
use seldonlab_core::rng::SeedTree;
use seldonlab_core::Specification;

use crate::aggregate::{aggregate, ExperimentReport};
use crate::config::{ConfigError, ExperimentConfig};
use crate::store::{ResultStore, StoreError};
use crate::trial::{run_unit, TrialContext, TrialKey, TrialResult, TrialStatus, WorkUnit};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("evaluation dataset has {found} features, training data has {expected}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error(
        "{} holds result {key} from another run (spec {found_spec}, seed {found_seed}); \
         use a fresh results directory",
        dir.display()
    )]
    ForeignResult {
        dir: PathBuf,
        key: String,
        found_spec: String,
        found_seed: u64,
    },
}

/// Progress snapshot passed to the callback after every stored result.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessProgress {
    pub completed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub last: TrialKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRun {
    /// Units trained in this invocation.
    pub executed: usize,
    /// Units already in the store.
    pub skipped: usize,
    /// Executed units that ended in `Failed`.
    pub failed: usize,
    pub report: ExperimentReport,
}

/// Every unit of the experiment, in a fixed order.
pub fn plan_units(config: &ExperimentConfig) -> Vec<WorkUnit> {
    let seeds = SeedTree::new(config.seed);
    let mut units = Vec::with_capacity(config.n_units());
    for &model in &config.models {
        for &data_frac in &config.data_fracs {
            for trial in 0..config.n_trials as u64 {
                units.push(WorkUnit::new(
                    TrialKey {
                        model,
                        data_frac,
                        trial,
                    },
                    &seeds,
                ));
            }
        }
    }
    units
}

/// Run the experiment described by `config`.
///
/// `spec` supplies the full dataset, constraints, and engine settings;
/// `evaluation` is the held-out dataset used for performance and
/// ground-truth constraint checks.
pub fn run_experiment(
    spec: Arc<Specification>,
    config: &ExperimentConfig,
    evaluation: Arc<Dataset>,
    progress_cb: Option<&dyn Fn(&HarnessProgress)>,
) -> Result<ExperimentRun, HarnessError> {
    config.validate()?;
    let expected = spec.dataset().n_features();
    if evaluation.n_features() != expected {
        return Err(HarnessError::FeatureMismatch {
            expected,
            found: evaluation.n_features(),
        });
    }

    let store = ResultStore::open(&config.results_dir)?;
    let spec_fingerprint = spec.fingerprint();
    let mut stored: HashMap<String, TrialResult> = HashMap::new();
    for result in store.load_all()? {
        if !result.belongs_to(&spec_fingerprint, config.seed) {
            return Err(HarnessError::ForeignResult {
                dir: config.results_dir.clone(),
                key: result.key.id(),
                found_spec: result.spec_fingerprint,
                found_seed: result.seed,
            });
        }
        stored.insert(result.key.id(), result);
    }

    let plan = plan_units(config);
    let planned: Vec<TrialKey> = plan.iter().map(|unit| unit.key).collect();
    let (pending, done): (Vec<WorkUnit>, Vec<WorkUnit>) = plan
        .into_iter()
        .partition(|unit| !stored.contains_key(&unit.key.id()));
    let skipped = done.len();

    tracing::info!(
        units = config.n_units(),
        pending = pending.len(),
        skipped,
        workers = config.n_workers,
        dir = %config.results_dir.display(),
        "starting experiment"
    );

    let ctx = TrialContext {
        spec,
        spec_fingerprint,
        master_seed: config.seed,
        evaluation,
        datagen: config.datagen,
        metric: config.performance_metric,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.n_workers)
        .build()?;

    let start = Instant::now();
    let abort = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<TrialResult>();

    let (executed, failed) = std::thread::scope(|s| -> Result<(usize, usize), HarnessError> {
        let (ctx, pending, abort) = (&ctx, &pending, &abort);
        s.spawn(move || {
            pool.install(|| {
                pending.par_iter().for_each_with(tx, |tx, unit| {
                    if abort.load(Ordering::Relaxed) {
                        return;
                    }
                    // The receiver only hangs up after an abort.
                    let _ = tx.send(run_unit(unit, ctx));
                });
            });
        });

        let mut executed = 0;
        let mut failed = 0;
        for result in rx {
            if let Err(e) = store.put(&result) {
                abort.store(true, Ordering::Relaxed);
                return Err(e.into());
            }
            executed += 1;
            if matches!(result.status, TrialStatus::Failed { .. }) {
                failed += 1;
            }
            tracing::debug!(unit = %result.key, status = ?result.status, "trial stored");

            if let Some(cb) = progress_cb {
                cb(&HarnessProgress {
                    completed: executed,
                    pending: pending.len() - executed,
                    skipped,
                    failed,
                    elapsed_secs: start.elapsed().as_secs_f64(),
                    last: result.key,
                });
            }
        }
        Ok((executed, failed))
    })?;

    let mut results = Vec::with_capacity(planned.len());
    for key in &planned {
        if let Some(result) = store.get(key)? {
            results.push(result);
        }
    }
    let report = aggregate(&results, config.performance_metric);
    tracing::info!(
        executed,
        skipped,
        failed,
        elapsed_secs = start.elapsed().as_secs_f64(),
        "experiment finished"
    );

    Ok(ExperimentRun {
        executed,
        skipped,
        failed,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelId;

    #[test]
    fn plan_covers_every_combination_once() {
        let config = ExperimentConfig {
            data_fracs: vec![0.1, 0.5, 1.0],
            n_trials: 4,
            models: vec![ModelId::Seldonian, ModelId::RandomClassifier],
            ..ExperimentConfig::default()
        };
        let units = plan_units(&config);
        assert_eq!(units.len(), 24);

        let mut ids: Vec<String> = units.iter().map(|u| u.key.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 24);
    }

    #[test]
    fn plan_is_deterministic() {
        let config = ExperimentConfig {
            data_fracs: vec![0.5],
            n_trials: 3,
            ..ExperimentConfig::default()
        };
        assert_eq!(plan_units(&config), plan_units(&config));
    }

    #[test]
    fn invalid_config_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::trial::tests::context(200, 5);
        let config = ExperimentConfig {
            n_trials: 0,
            results_dir: dir.path().join("results"),
            ..ExperimentConfig::default()
        };
        let err = run_experiment(ctx.spec, &config, ctx.evaluation, None).unwrap_err();
        assert!(matches!(err, HarnessError::Config(ConfigError::ZeroTrials)));
        assert!(!dir.path().join("results").exists());
    }
}
