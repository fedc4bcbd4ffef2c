//! Performance metrics and summary statistics — pure functions.
//!
//! Predictions and labels in, scalar out. No dependencies on the harness or
//! the result store.

use serde::{Deserialize, Serialize};

use seldonlab_core::models::Objective;

use crate::config::PerformanceMetric;

impl PerformanceMetric {
    /// Score `predictions` against `labels`. NaN on an empty evaluation set.
    pub fn evaluate(self, predictions: &[f64], labels: &[f64]) -> f64 {
        if predictions.is_empty() {
            return f64::NAN;
        }
        match self {
            PerformanceMetric::Accuracy => probabilistic_accuracy(predictions, labels),
            PerformanceMetric::LogLoss => Objective::BinaryLogLoss.value(predictions, labels),
            PerformanceMetric::Mse => Objective::MeanSquaredError.value(predictions, labels),
        }
    }
}

/// Mean of `p` on rows labelled 1 and `1 − p` elsewhere.
pub fn probabilistic_accuracy(predictions: &[f64], labels: &[f64]) -> f64 {
    let total: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(&p, &y)| if y == 1.0 { p } else { 1.0 - p })
        .sum();
    total / predictions.len() as f64
}

// ─── Summary statistics ─────────────────────────────────────────────

/// Spread of a metric over trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    /// Sample standard deviation; zero for a single value.
    pub std: f64,
    /// Percentiles use linear interpolation between order statistics.
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
}

/// `p`-th percentile (0..=100) of an ascending, non-empty slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let (a, b) = (sorted[lo], sorted[hi]);
    (a + (b - a) * (rank - lo as f64)).clamp(a, b)
}

impl Summary {
    /// Summarize `values`, ignoring non-finite entries. `None` if nothing is left.
    ///
    /// Values are sorted first so the result does not depend on input order.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            0.0
        } else {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        Some(Self {
            mean,
            std,
            p25: percentile_sorted(&sorted, 25.0),
            median: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
        })
    }
}
