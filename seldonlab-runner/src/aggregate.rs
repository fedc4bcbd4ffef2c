//! Aggregation of trial results per `(model, data_frac)`.
//!
//! The report is a pure function of the set of results: rows are ordered by
//! model then fraction, and metric values are sorted before summarizing, so
//! the order in which trials completed never shows up in the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ModelId, PerformanceMetric};
use crate::metrics::Summary;
use crate::trial::{TrialResult, TrialStatus};

/// Current schema version for persisted reports.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub model: ModelId,
    pub data_frac: f64,
    pub n_trials: usize,
    pub n_accepted: usize,
    pub n_no_solution: usize,
    pub n_failed: usize,
    /// Performance over trials that returned a solution.
    pub performance: Option<Summary>,
    /// Fraction of trials that returned a solution.
    pub solution_rate: f64,
    /// Fraction of trials whose solution violates a constraint on the evaluation data.
    pub failure_rate: f64,
    pub mean_n_samples: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metric: PerformanceMetric,
    pub rows: Vec<ReportRow>,
}

impl ExperimentReport {
    pub fn row(&self, model: ModelId, data_frac: f64) -> Option<&ReportRow> {
        self.rows
            .iter()
            .find(|r| r.model == model && r.data_frac.to_bits() == data_frac.to_bits())
    }

    /// Rows for one model, in increasing data fraction.
    pub fn curve(&self, model: ModelId) -> Vec<&ReportRow> {
        self.rows.iter().filter(|r| r.model == model).collect()
    }

    pub fn total_trials(&self) -> usize {
        self.rows.iter().map(|r| r.n_trials).sum()
    }
}

pub fn aggregate(results: &[TrialResult], metric: PerformanceMetric) -> ExperimentReport {
    let mut groups: BTreeMap<(ModelId, u64), Vec<&TrialResult>> = BTreeMap::new();
    for result in results {
        groups
            .entry((result.key.model, result.key.data_frac.to_bits()))
            .or_default()
            .push(result);
    }

    let rows = groups
        .into_iter()
        .map(|((model, frac_bits), trials)| summarize(model, f64::from_bits(frac_bits), &trials))
        .collect();

    ExperimentReport {
        schema_version: REPORT_SCHEMA_VERSION,
        metric,
        rows,
    }
}

fn summarize(model: ModelId, data_frac: f64, trials: &[&TrialResult]) -> ReportRow {
    let n_trials = trials.len();
    let count = |pred: fn(&TrialStatus) -> bool| trials.iter().filter(|t| pred(&t.status)).count();
    let n_accepted = count(|s| matches!(s, TrialStatus::Accepted));
    let n_no_solution = count(|s| matches!(s, TrialStatus::NoSolutionFound));
    let n_failed = count(|s| matches!(s, TrialStatus::Failed { .. }));

    let performances: Vec<f64> = trials.iter().filter_map(|t| t.performance).collect();
    let n_solutions = trials.iter().filter(|t| t.has_solution()).count();
    let n_violations = trials.iter().filter(|t| t.violated()).count();
    let per_trial = |k: usize| {
        if n_trials == 0 {
            0.0
        } else {
            k as f64 / n_trials as f64
        }
    };
    // Integer sum keeps the mean independent of trial order.
    let total_samples: usize = trials.iter().map(|t| t.n_samples).sum();

    ReportRow {
        model,
        data_frac,
        n_trials,
        n_accepted,
        n_no_solution,
        n_failed,
        performance: Summary::from_values(&performances),
        solution_rate: per_trial(n_solutions),
        failure_rate: per_trial(n_violations),
        mean_n_samples: per_trial(total_samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::result;

    fn sample() -> Vec<TrialResult> {
        let mut nsf = result(ModelId::Seldonian, 0.1, 1);
        nsf.status = TrialStatus::NoSolutionFound;
        nsf.performance = None;
        nsf.theta = None;
        nsf.constraints_passed.clear();

        let mut failed = result(ModelId::Seldonian, 0.1, 2);
        failed.status = TrialStatus::Failed {
            reason: "diverged".into(),
        };
        failed.performance = None;
        failed.theta = None;
        failed.constraints_passed.clear();

        let mut violating = result(ModelId::LogisticRegression, 0.1, 0);
        violating.constraints_passed = vec![false];
        violating.performance = Some(0.9);

        vec![
            result(ModelId::Seldonian, 0.1, 0),
            nsf,
            failed,
            violating,
            result(ModelId::LogisticRegression, 0.1, 1),
            result(ModelId::Seldonian, 1.0, 0),
        ]
    }

    #[test]
    fn counts_and_rates() {
        let report = aggregate(&sample(), PerformanceMetric::Accuracy);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.total_trials(), 6);

        let s = report.row(ModelId::Seldonian, 0.1).unwrap();
        assert_eq!((s.n_trials, s.n_accepted, s.n_no_solution, s.n_failed), (3, 1, 1, 1));
        assert!((s.solution_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.failure_rate, 0.0);
        assert_eq!(s.performance.unwrap().mean, 0.8);
        assert_eq!(s.mean_n_samples, 100.0);

        let lr = report.row(ModelId::LogisticRegression, 0.1).unwrap();
        assert_eq!(lr.failure_rate, 0.5);
        assert!((lr.performance.unwrap().mean - 0.85).abs() < 1e-12);
    }

    #[test]
    fn rows_are_ordered_by_model_then_fraction() {
        let report = aggregate(&sample(), PerformanceMetric::Accuracy);
        let keys: Vec<_> = report.rows.iter().map(|r| (r.model, r.data_frac)).collect();
        assert_eq!(
            keys,
            vec![
                (ModelId::Seldonian, 0.1),
                (ModelId::Seldonian, 1.0),
                (ModelId::LogisticRegression, 0.1),
            ]
        );
        assert_eq!(report.curve(ModelId::Seldonian).len(), 2);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let forward = sample();
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(
            aggregate(&forward, PerformanceMetric::Accuracy),
            aggregate(&backward, PerformanceMetric::Accuracy)
        );
    }

    #[test]
    fn all_nsf_has_no_performance() {
        let mut r = result(ModelId::Seldonian, 0.5, 0);
        r.status = TrialStatus::NoSolutionFound;
        r.performance = None;
        r.theta = None;
        let report = aggregate(&[r], PerformanceMetric::Accuracy);
        assert_eq!(report.rows[0].performance, None);
        assert_eq!(report.rows[0].solution_rate, 0.0);
    }
}
