//! Bound evaluation of a compiled constraint.
//!
//! Evaluation runs in three passes:
//! 1. Top-down: decide which ends (lower/upper) each unique measure leaf needs
//!    for the requested end of the margin.
//! 2. Leaves: one Student-t bound per unique leaf, with the tree's δ split
//!    equally over the unique leaves, and each needed side spending the full
//!    leaf δ (one-sided) or half of it (two-sided).
//! 3. Bottom-up: interval arithmetic from the leaves to the margin.

use std::collections::BTreeMap;

use crate::data::Dataset;
use crate::stats::{ttest_bound, BoundMode, Dual, DualInterval, Interval, MeanBound, Sides};

use super::node::{BinaryOp, Expr, Measure, UnaryOp};
use super::ParseTree;

/// Model outputs on the rows of a dataset.
///
/// `jacobian[i]` holds ∂values[i]/∂θ; without it, bounds carry no gradient.
#[derive(Debug, Clone, Copy)]
pub struct Predictions<'a> {
    pub values: &'a [f64],
    pub jacobian: Option<&'a [Vec<f64>]>,
}

impl<'a> Predictions<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self {
            values,
            jacobian: None,
        }
    }

    pub fn with_jacobian(values: &'a [f64], jacobian: &'a [Vec<f64>]) -> Self {
        Self {
            values,
            jacobian: Some(jacobian),
        }
    }
}

/// Which end(s) of the margin interval to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    Lower,
    Upper,
    Both,
}

impl BoundSide {
    fn sides(self) -> Sides {
        match self {
            BoundSide::Lower => Sides::LOWER,
            BoundSide::Upper => Sides::UPPER,
            BoundSide::Both => Sides::BOTH,
        }
    }
}

/// Point estimate and confidence interval of a constraint's margin.
///
/// The margin is positive when the constraint holds; `g = −margin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub estimate: f64,
    pub bound: DualInterval,
}

impl Evaluation {
    pub fn interval(&self) -> Interval {
        self.bound.to_interval()
    }

    /// Point estimate of g.
    pub fn g_estimate(&self) -> f64 {
        -self.estimate
    }

    /// Upper confidence bound of g, with gradient.
    pub fn g_upper(&self) -> Dual {
        -self.bound.lower.clone()
    }
}

impl ParseTree {
    /// Evaluate the margin's point estimate and requested bound(s) on `data`.
    pub fn evaluate(
        &self,
        data: &Dataset,
        predictions: &Predictions<'_>,
        side: BoundSide,
        mode: BoundMode,
    ) -> Evaluation {
        let leaves = self.margin().measures();
        let mut needs: BTreeMap<&Measure, Sides> = leaves.iter().map(|m| (*m, Sides::NONE)).collect();
        propagate(self.margin(), side.sides(), &mut needs);

        let leaf_delta = self.delta() / leaves.len().max(1) as f64;
        let bounds: BTreeMap<&Measure, MeanBound> = needs
            .into_iter()
            .map(|(measure, sides)| {
                let (values, grads) = leaf_rows(measure, data, predictions);
                let bound = ttest_bound(
                    &values,
                    grads.as_deref(),
                    leaf_delta,
                    sides,
                    mode,
                    self.min_samples(),
                );
                (measure, bound)
            })
            .collect();

        let (estimate, bound) = combine(self.margin(), &bounds);
        Evaluation {
            estimate,
            bound: sanitize(bound),
        }
    }

    /// Margin point estimate only; no bounds, no gradients.
    pub fn margin_estimate(&self, data: &Dataset, predictions: &[f64]) -> f64 {
        let predictions = Predictions::new(predictions);
        let points: BTreeMap<&Measure, f64> = self
            .margin()
            .measures()
            .into_iter()
            .map(|m| {
                let (values, _) = leaf_rows(m, data, &predictions);
                (m, mean(&values))
            })
            .collect();
        point(self.margin(), &points)
    }

    /// Whether the margin's lower bound clears zero (strictly for `>`/`<`).
    pub fn is_satisfied(&self, evaluation: &Evaluation) -> bool {
        let lower = evaluation.bound.lower.value;
        if self.comparison().is_strict() {
            lower > 0.0
        } else {
            lower >= 0.0
        }
    }
}

/// Record which ends each leaf needs for `sides` of `expr`.
fn propagate<'a>(expr: &'a Expr, sides: Sides, needs: &mut BTreeMap<&'a Measure, Sides>) {
    if !sides.any() {
        return;
    }
    match expr {
        Expr::Constant(_) => {}
        Expr::Measure(m) => {
            let entry = needs.entry(m).or_default();
            *entry = entry.union(sides);
        }
        Expr::Unary { op, arg } => match op {
            UnaryOp::Neg => propagate(arg, sides.swapped(), needs),
            UnaryOp::Abs => propagate(arg, Sides::BOTH, needs),
        },
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::Add | BinaryOp::Min | BinaryOp::Max => {
                propagate(lhs, sides, needs);
                propagate(rhs, sides, needs);
            }
            BinaryOp::Sub => {
                propagate(lhs, sides, needs);
                propagate(rhs, sides.swapped(), needs);
            }
            BinaryOp::Mul | BinaryOp::Div => {
                propagate(lhs, Sides::BOTH, needs);
                propagate(rhs, Sides::BOTH, needs);
            }
        },
    }
}

/// Per-row estimates (and their θ-gradients) for the rows a leaf covers.
fn leaf_rows(
    measure: &Measure,
    data: &Dataset,
    predictions: &Predictions<'_>,
) -> (Vec<f64>, Option<Vec<Vec<f64>>>) {
    let groups: Vec<Option<&[bool]>> = measure.groups.iter().map(|g| data.sensitive(g)).collect();
    let filter = measure.kind.label_filter();

    let mut values = Vec::new();
    let mut grads = predictions.jacobian.map(|_| Vec::new());
    for (i, &y) in data.labels().iter().enumerate() {
        let in_groups = groups.iter().all(|g| g.map_or(false, |flags| flags[i]));
        if !in_groups || !filter.accepts(y) {
            continue;
        }
        let (z, dz) = measure.kind.row_estimate(predictions.values[i], y);
        values.push(z);
        if let (Some(out), Some(jacobian)) = (grads.as_mut(), predictions.jacobian) {
            out.push(jacobian[i].iter().map(|d| dz * d).collect());
        }
    }
    (values, grads)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn nan_aware(a: f64, b: f64, f: impl Fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        f(a, b)
    }
}

fn point(expr: &Expr, leaves: &BTreeMap<&Measure, f64>) -> f64 {
    match expr {
        Expr::Constant(v) => *v,
        Expr::Measure(m) => leaves.get(m).copied().unwrap_or(f64::NAN),
        Expr::Unary { op, arg } => {
            let v = point(arg, leaves);
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Abs => v.abs(),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (a, b) = (point(lhs, leaves), point(rhs, leaves));
            match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Min => nan_aware(a, b, f64::min),
                BinaryOp::Max => nan_aware(a, b, f64::max),
            }
        }
    }
}

fn combine(expr: &Expr, leaves: &BTreeMap<&Measure, MeanBound>) -> (f64, DualInterval) {
    match expr {
        Expr::Constant(v) => (*v, DualInterval::exact(*v)),
        Expr::Measure(m) => match leaves.get(m) {
            Some(b) => (b.point, b.bound.clone()),
            None => (f64::NAN, DualInterval::unbounded()),
        },
        Expr::Unary { op, arg } => {
            let (v, iv) = combine(arg, leaves);
            match op {
                UnaryOp::Neg => (-v, iv.neg()),
                UnaryOp::Abs => (v.abs(), iv.abs()),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (a, ia) = combine(lhs, leaves);
            let (b, ib) = combine(rhs, leaves);
            match op {
                BinaryOp::Add => (a + b, ia.add(ib)),
                BinaryOp::Sub => (a - b, ia.sub(ib)),
                BinaryOp::Mul => (a * b, ia.mul(ib)),
                BinaryOp::Div => (a / b, ia.div(ib)),
                BinaryOp::Min => (nan_aware(a, b, f64::min), ia.min(ib)),
                BinaryOp::Max => (nan_aware(a, b, f64::max), ia.max(ib)),
            }
        }
    }
}

/// NaN ends (from ∞ − ∞ and the like) become the uninformative end.
fn sanitize(mut bound: DualInterval) -> DualInterval {
    if bound.lower.value.is_nan() {
        bound.lower = Dual::constant(f64::NEG_INFINITY);
    }
    if bound.upper.value.is_nan() {
        bound.upper = Dual::constant(f64::INFINITY);
    }
    bound
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::stats::student_t_quantile;

    fn data(labels: Vec<f64>, a: Vec<bool>) -> Dataset {
        let n = labels.len();
        let mut sensitive = BTreeMap::new();
        let b = a.iter().map(|x| !x).collect();
        sensitive.insert("a".to_string(), a);
        sensitive.insert("b".to_string(), b);
        Dataset::new(vec!["x".into()], vec![vec![0.0]; n], labels, sensitive).unwrap()
    }

    fn cols() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn single_leaf_uses_full_delta_one_sided() {
        let d = data(vec![1.0; 6], vec![true; 6]);
        let preds = [0.9, 0.8, 0.7, 0.95, 0.85, 0.6];
        let tree = ParseTree::compile("PR >= 0.5", 0.05, &cols()).unwrap();
        let eval = tree.evaluate(&d, &Predictions::new(&preds), BoundSide::Lower, BoundMode::Safety);

        let mean = preds.iter().sum::<f64>() / 6.0;
        let var = preds.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / 5.0;
        let t = student_t_quantile(0.95, 5.0);
        let expected = mean - var.sqrt() * t / 6.0_f64.sqrt() - 0.5;
        assert!((eval.bound.lower.value - expected).abs() < 1e-12);
        assert_eq!(eval.bound.upper.value, f64::INFINITY);
        assert!((eval.estimate - (mean - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn le_constraint_flips_margin() {
        let d = data(vec![0.0; 4], vec![true; 4]);
        let preds = [0.1, 0.2, 0.1, 0.2];
        let tree = ParseTree::compile("FPR <= 0.5", 0.1, &cols()).unwrap();
        let eval = tree.evaluate(&d, &Predictions::new(&preds), BoundSide::Both, BoundMode::Safety);
        assert!((eval.estimate - 0.35).abs() < 1e-12);
        let iv = eval.interval();
        assert!(iv.lower < 0.35 && 0.35 < iv.upper);
    }

    #[test]
    fn empty_group_gives_unbounded_and_unsatisfied() {
        let d = data(vec![1.0, 0.0, 1.0], vec![true; 3]);
        let preds = [0.9, 0.1, 0.8];
        let tree = ParseTree::compile("(ACC | [b]) >= 0.5", 0.05, &cols()).unwrap();
        let eval = tree.evaluate(&d, &Predictions::new(&preds), BoundSide::Lower, BoundMode::Safety);
        assert!(eval.estimate.is_nan());
        assert_eq!(eval.bound.lower.value, f64::NEG_INFINITY);
        assert!(!tree.is_satisfied(&eval));
        assert_eq!(eval.g_upper().value, f64::INFINITY);
    }

    #[test]
    fn ratio_constraint_brackets_estimate() {
        let labels: Vec<f64> = (0..200).map(|i| f64::from(i % 2)).collect();
        let groups: Vec<bool> = (0..200).map(|i| i % 4 < 2).collect();
        let preds: Vec<f64> = (0..200)
            .map(|i| if i % 2 == 1 { 0.8 + 0.001 * (i % 7) as f64 } else { 0.25 })
            .collect();
        let d = data(labels, groups);
        let tree = ParseTree::compile(
            "min((ACC | [a])/(ACC | [b]),(ACC | [b])/(ACC | [a])) >= 0.8",
            0.05,
            &cols(),
        )
        .unwrap();
        let eval = tree.evaluate(&d, &Predictions::new(&preds), BoundSide::Both, BoundMode::Safety);
        let iv = eval.interval();
        assert!(iv.lower <= eval.estimate && eval.estimate <= iv.upper);
        assert!((tree.margin_estimate(&d, &preds) - eval.estimate).abs() < 1e-12);
    }

    #[test]
    fn gradient_flows_to_theta() {
        // p_i = θ for every row; PR's lower bound then moves one-for-one with θ.
        let d = data(vec![1.0; 5], vec![true; 5]);
        let preds = [0.3, 0.4, 0.5, 0.6, 0.7];
        let jac = vec![vec![1.0]; 5];
        let tree = ParseTree::compile("PR >= 0.1", 0.05, &cols()).unwrap();
        let eval = tree.evaluate(
            &d,
            &Predictions::with_jacobian(&preds, &jac),
            BoundSide::Lower,
            BoundMode::Safety,
        );
        assert!((eval.bound.lower.grad[0] - 1.0).abs() < 1e-12);
        assert!((eval.g_upper().grad[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn strict_comparison_needs_positive_lower_bound() {
        let d = data(vec![1.0; 4], vec![true; 4]);
        let preds = [0.5; 4];
        let ge = ParseTree::compile("PR >= 0.5", 0.05, &cols()).unwrap();
        let gt = ParseTree::compile("PR > 0.5", 0.05, &cols()).unwrap();
        let e_ge = ge.evaluate(&d, &Predictions::new(&preds), BoundSide::Lower, BoundMode::Safety);
        let e_gt = gt.evaluate(&d, &Predictions::new(&preds), BoundSide::Lower, BoundMode::Safety);
        assert!(ge.is_satisfied(&e_ge));
        assert!(!gt.is_satisfied(&e_gt));
    }
}
