//! The safety test: actual high-confidence bounds on held-out data.

use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::models::Model;
use crate::parse_tree::{BoundSide, ParseTree, Predictions};
use crate::stats::BoundMode;

/// Per-constraint result of a safety test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Upper confidence bound of each constraint's g.
    pub upper_bounds: Vec<f64>,
    /// Point estimate of each constraint's g.
    pub estimates: Vec<f64>,
    pub passed: Vec<bool>,
    pub n_safety: usize,
}

impl SafetyReport {
    pub fn passed_all(&self) -> bool {
        self.passed.iter().all(|&p| p)
    }
}

/// Test `theta` against every constraint on the safety split.
pub fn safety_test(
    trees: &[ParseTree],
    model: &dyn Model,
    theta: &[f64],
    safety: &Dataset,
) -> SafetyReport {
    let predictions = model.predict(theta, safety.features());
    let preds = Predictions::new(&predictions);

    let mut report = SafetyReport {
        upper_bounds: Vec::with_capacity(trees.len()),
        estimates: Vec::with_capacity(trees.len()),
        passed: Vec::with_capacity(trees.len()),
        n_safety: safety.n_rows(),
    };
    for tree in trees {
        let evaluation = tree.evaluate(safety, &preds, BoundSide::Lower, BoundMode::Safety);
        report.upper_bounds.push(evaluation.g_upper().value);
        report.estimates.push(evaluation.g_estimate());
        report.passed.push(tree.is_satisfied(&evaluation));
    }
    report
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::LogisticRegression;

    fn one_feature(xs: &[f64], ys: &[f64]) -> Dataset {
        Dataset::new(
            vec!["x".into()],
            xs.iter().map(|&x| vec![x]).collect(),
            ys.to_vec(),
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn confident_model_passes_loose_accuracy_bound() {
        let xs: Vec<f64> = (0..400).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| if x > 0.0 { 1.0 } else { 0.0 }).collect();
        let data = one_feature(&xs, &ys);
        let tree = ParseTree::compile("ACC >= 0.9", 0.05, &[]).unwrap();
        let report = safety_test(&[tree], &LogisticRegression, &[0.0, 10.0], &data);
        assert!(report.passed_all());
        assert!(report.upper_bounds[0] < 0.0);
        assert_eq!(report.n_safety, 400);
    }

    #[test]
    fn tiny_safety_split_always_fails() {
        let data = one_feature(&[1.0], &[1.0]);
        let tree = ParseTree::compile("ACC >= 0.1", 0.05, &[]).unwrap();
        let report = safety_test(&[tree], &LogisticRegression, &[0.0, 10.0], &data);
        assert!(!report.passed_all());
        assert_eq!(report.upper_bounds[0], f64::INFINITY);
    }
}
