//! Integration tests for the experiment harness on synthetic fairness data.
//!
//! Covers resumption (a rerun executes nothing and reports the same),
//! extending or narrowing a finished experiment, refusing results from a
//! different run, failure isolation, progress reporting, and the expected
//! shape of the learning curve.

use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use seldonlab_core::data::{generate, Dataset, SyntheticConfig};
use seldonlab_core::models::ModelKind;
use seldonlab_core::parse_tree::FairnessTemplate;
use seldonlab_core::spec::{InitialSolution, OptimizationConfig, OptimizerKind};
use seldonlab_core::{make_parse_trees, SpecOptions, Specification};
use seldonlab_runner::export::{load_report, save_report};
use seldonlab_runner::{
    run_experiment, ExperimentConfig, HarnessError, HarnessProgress, ModelId, PerformanceMetric,
    ResultStore, TrialStatus,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn groups() -> Vec<String> {
    vec!["group_a".to_string(), "group_b".to_string()]
}

fn synthetic(n_rows: usize, seed: u64) -> Dataset {
    let config = SyntheticConfig {
        n_rows,
        ..SyntheticConfig::default()
    };
    generate(&config, &mut StdRng::seed_from_u64(seed)).unwrap()
}

fn fairness_spec(n_rows: usize, num_iters: usize) -> Arc<Specification> {
    let constraint = FairnessTemplate::OverallAccuracyEquality.render("group_a", "group_b", 0.2);
    let trees = make_parse_trees(&[constraint], &[0.05], &groups()).unwrap();
    let options = SpecOptions {
        optimization: OptimizationConfig {
            num_iters,
            ..OptimizationConfig::default()
        },
        ..SpecOptions::default()
    };
    Arc::new(Specification::new(synthetic(n_rows, 1), trees, options).unwrap())
}

fn small_config(dir: &Path, n_trials: usize) -> ExperimentConfig {
    ExperimentConfig {
        data_fracs: vec![0.001, 0.5, 1.0],
        n_trials,
        models: vec![
            ModelId::Seldonian,
            ModelId::LogisticRegression,
            ModelId::RandomClassifier,
        ],
        n_workers: 2,
        results_dir: dir.join("results"),
        ..ExperimentConfig::default()
    }
}

// ── Resumption ───────────────────────────────────────────────────────

#[test]
fn rerun_executes_nothing_and_reports_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let spec = fairness_spec(1_000, 20);
    let evaluation = Arc::new(synthetic(1_000, 2));
    let config = small_config(dir.path(), 2);

    let first = run_experiment(spec.clone(), &config, evaluation.clone(), None).unwrap();
    assert_eq!(first.executed, 18);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.report.total_trials(), 18);
    assert_eq!(first.report.rows.len(), 9);

    let second = run_experiment(spec, &config, evaluation, None).unwrap();
    assert_eq!(second.executed, 0);
    assert_eq!(second.skipped, 18);
    assert_eq!(second.report, first.report);
}

#[test]
fn more_trials_only_runs_the_new_ones() {
    let dir = tempfile::tempdir().unwrap();
    let spec = fairness_spec(600, 10);
    let evaluation = Arc::new(synthetic(600, 2));

    let one = run_experiment(spec.clone(), &small_config(dir.path(), 1), evaluation.clone(), None)
        .unwrap();
    assert_eq!(one.executed, 9);

    let two = run_experiment(spec, &small_config(dir.path(), 2), evaluation, None).unwrap();
    assert_eq!(two.executed, 9);
    assert_eq!(two.skipped, 9);
    assert_eq!(two.report.total_trials(), 18);
}

#[test]
fn stored_results_survive_and_report_exports() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path(), 1);
    let run = run_experiment(fairness_spec(500, 10), &config, Arc::new(synthetic(500, 2)), None)
        .unwrap();

    let store = ResultStore::open(&config.results_dir).unwrap();
    assert_eq!(store.len().unwrap(), 9);

    let report_dir = dir.path().join("report");
    save_report(&run.report, &report_dir).unwrap();
    assert_eq!(load_report(&report_dir).unwrap(), run.report);
}

#[test]
fn narrower_rerun_reports_only_its_own_units() {
    let dir = tempfile::tempdir().unwrap();
    let spec = fairness_spec(500, 5);
    let evaluation = Arc::new(synthetic(500, 2));
    let wide = ExperimentConfig {
        data_fracs: vec![1.0],
        n_trials: 4,
        models: vec![ModelId::Seldonian, ModelId::RandomClassifier],
        n_workers: 2,
        results_dir: dir.path().join("results"),
        ..ExperimentConfig::default()
    };
    let first = run_experiment(spec.clone(), &wide, evaluation.clone(), None).unwrap();
    assert_eq!(first.report.total_trials(), 8);

    let narrow = ExperimentConfig {
        n_trials: 1,
        models: vec![ModelId::Seldonian],
        ..wide.clone()
    };
    let second = run_experiment(spec, &narrow, evaluation, None).unwrap();
    assert_eq!(second.executed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.report.total_trials(), 1);
    assert_eq!(second.report.rows.len(), 1);
    assert!(second.report.row(ModelId::RandomClassifier, 1.0).is_none());
}

#[test]
fn results_from_another_seed_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let spec = fairness_spec(400, 5);
    let evaluation = Arc::new(synthetic(400, 2));
    let config = small_config(dir.path(), 1);
    run_experiment(spec.clone(), &config, evaluation.clone(), None).unwrap();

    let reseeded = ExperimentConfig {
        seed: config.seed + 1,
        data_fracs: vec![0.25],
        ..config.clone()
    };
    let err = run_experiment(spec, &reseeded, evaluation, None).unwrap_err();
    assert!(matches!(
        err,
        HarnessError::ForeignResult { found_seed, .. } if found_seed == config.seed
    ));

    let store = ResultStore::open(&config.results_dir).unwrap();
    assert_eq!(store.len().unwrap(), 9);
}

#[test]
fn results_from_another_specification_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let evaluation = Arc::new(synthetic(400, 2));
    let config = small_config(dir.path(), 1);
    let original = fairness_spec(400, 5);
    run_experiment(original.clone(), &config, evaluation.clone(), None).unwrap();

    let changed = fairness_spec(400, 6);
    assert_ne!(changed.fingerprint(), original.fingerprint());
    let err = run_experiment(changed, &config, evaluation, None).unwrap_err();
    match err {
        HarnessError::ForeignResult { found_spec, .. } => {
            assert_eq!(found_spec, original.fingerprint())
        }
        other => panic!("expected a foreign result, got {other:?}"),
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────

#[test]
fn tiny_fraction_gives_nsf_not_violations() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_experiment(
        fairness_spec(1_000, 10),
        &small_config(dir.path(), 3),
        Arc::new(synthetic(1_000, 2)),
        None,
    )
    .unwrap();

    let row = run.report.row(ModelId::Seldonian, 0.001).unwrap();
    assert_eq!(row.n_no_solution, 3);
    assert_eq!(row.solution_rate, 0.0);
    assert_eq!(row.failure_rate, 0.0);
    assert!(row.performance.is_none());
    assert_eq!(row.mean_n_samples, 1.0);
}

#[test]
fn diverging_trials_fail_without_stopping_the_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let trees = make_parse_trees(&["MSE <= 10"], &[0.05], &[]).unwrap();
    let options = SpecOptions {
        model: ModelKind::LinearRegression,
        initial_solution: InitialSolution::Zeros,
        optimization: OptimizationConfig {
            optimizer: OptimizerKind::Sgd,
            alpha_theta: 1e200,
            num_iters: 50,
            ..OptimizationConfig::default()
        },
        ..SpecOptions::default()
    };
    let spec = Arc::new(Specification::new(synthetic(300, 1), trees, options).unwrap());
    let config = ExperimentConfig {
        data_fracs: vec![1.0],
        n_trials: 3,
        models: vec![ModelId::Seldonian, ModelId::LinearRegression],
        n_workers: 3,
        results_dir: dir.path().join("results"),
        performance_metric: PerformanceMetric::Mse,
        ..ExperimentConfig::default()
    };

    let run = run_experiment(spec, &config, Arc::new(synthetic(300, 2)), None).unwrap();
    assert_eq!(run.executed, 6);
    assert_eq!(run.failed, 3);

    let engine = run.report.row(ModelId::Seldonian, 1.0).unwrap();
    assert_eq!(engine.n_failed, 3);
    assert_eq!(engine.solution_rate, 0.0);

    let baseline = run.report.row(ModelId::LinearRegression, 1.0).unwrap();
    assert_eq!(baseline.n_accepted, 3);
    assert!(baseline.performance.unwrap().mean < 0.25);

    let store = ResultStore::open(&config.results_dir).unwrap();
    let failures: Vec<_> = store
        .load_all()
        .unwrap()
        .into_iter()
        .filter(|r| matches!(r.status, TrialStatus::Failed { .. }))
        .collect();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|r| r.theta.is_none()));
}

// ── Progress ─────────────────────────────────────────────────────────

#[test]
fn progress_reports_every_stored_result() {
    let dir = tempfile::tempdir().unwrap();
    let seen = RefCell::new(Vec::new());
    let cb = |p: &HarnessProgress| seen.borrow_mut().push(p.completed);

    let run = run_experiment(
        fairness_spec(400, 5),
        &small_config(dir.path(), 1),
        Arc::new(synthetic(400, 2)),
        Some(&cb as &dyn Fn(&HarnessProgress)),
    )
    .unwrap();

    assert_eq!(seen.into_inner(), (1..=run.executed).collect::<Vec<_>>());
}

// ── Learning curve ───────────────────────────────────────────────────

#[test]
fn baseline_accuracy_does_not_degrade_with_more_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = ExperimentConfig {
        data_fracs: vec![0.01, 1.0],
        n_trials: 5,
        models: vec![ModelId::LogisticRegression],
        n_workers: 2,
        results_dir: dir.path().join("results"),
        ..ExperimentConfig::default()
    };
    let run = run_experiment(
        fairness_spec(2_000, 5),
        &config,
        Arc::new(synthetic(2_000, 2)),
        None,
    )
    .unwrap();

    let small = run.report.row(ModelId::LogisticRegression, 0.01).unwrap();
    let full = run.report.row(ModelId::LogisticRegression, 1.0).unwrap();
    let (small, full) = (small.performance.unwrap(), full.performance.unwrap());
    assert!(
        full.mean >= small.mean - 0.01,
        "accuracy fell from {} to {}",
        small.mean,
        full.mean
    );
}
