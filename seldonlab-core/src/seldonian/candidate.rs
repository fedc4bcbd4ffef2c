//! Candidate selection: gradient descent–ascent on the Lagrangian
//!
//! `L(θ, λ) = f(θ) + Σᵢ λᵢ · UCBᵢ(θ)`
//!
//! where `UCBᵢ` is the predicted safety-test upper bound of constraint i's
//! `g` on the candidate split. θ descends along ∇θL; each λᵢ ascends by
//! `α_λ · UCBᵢ` and is clipped at zero. The safety split is never touched here.

use crate::data::Dataset;
use crate::models::Model;
use crate::parse_tree::{BoundSide, Predictions};
use crate::spec::{CandidatePolicy, Specification};
use crate::stats::{BoundMode, Dual};

use super::optimizer::Stepper;
use super::state::EngineState;
use super::EngineError;

const LOG_EVERY: usize = 100;

/// The solution handed to the safety test.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSolution {
    pub theta: Vec<f64>,
    /// Primary objective on the full candidate split.
    pub objective: f64,
    /// Predicted upper bound of each constraint's g on the full candidate split.
    pub predicted_upper: Vec<f64>,
    /// Whether every predicted bound holds.
    pub feasible: bool,
    pub iterations: usize,
    pub multipliers: Vec<f64>,
}

/// Objective, constraint bounds, and their gradients at one θ.
struct Snapshot {
    objective: f64,
    objective_grad: Vec<f64>,
    upper: Vec<Dual>,
    feasible: bool,
}

fn snapshot(
    spec: &Specification,
    model: &dyn Model,
    data: &Dataset,
    theta: &[f64],
    safety_size: usize,
) -> Snapshot {
    let features = data.features();
    let predictions = model.predict(theta, features);
    let jacobian = model.prediction_gradients(theta, features);
    let labels = data.labels();

    let objective = spec.objective().value(&predictions, labels);
    let objective_grad = spec
        .objective()
        .gradient(&predictions, &jacobian, labels, theta.len());

    let mode = BoundMode::Candidate {
        safety_size,
        candidate_size: data.n_rows(),
        inflation: spec.optimization().bound_inflation,
    };
    let preds = Predictions::with_jacobian(&predictions, &jacobian);
    let mut feasible = true;
    let upper = spec
        .parse_trees()
        .iter()
        .map(|tree| {
            let evaluation = tree.evaluate(data, &preds, BoundSide::Lower, mode);
            feasible &= tree.is_satisfied(&evaluation);
            evaluation.g_upper()
        })
        .collect();

    Snapshot {
        objective,
        objective_grad,
        upper,
        feasible,
    }
}

fn diverged(snap: &Snapshot) -> bool {
    snap.objective.is_nan()
        || snap.objective_grad.iter().any(|g| !g.is_finite())
        || snap.upper.iter().any(|u| u.value.is_nan())
}

/// Contiguous mini-batches, or the whole split when batching is off.
fn batches(spec: &Specification, data: &Dataset) -> Vec<Dataset> {
    let opt = spec.optimization();
    if !opt.use_batches || opt.batch_size >= data.n_rows() {
        return vec![data.clone()];
    }
    let indices: Vec<usize> = (0..data.n_rows()).collect();
    indices
        .chunks(opt.batch_size)
        .map(|chunk| data.select(chunk))
        .collect()
}

/// Search for a candidate solution starting from `theta0`.
///
/// `safety_size` is the number of rows the safety test will use; predicted
/// bounds are computed for that sample size. Divergence is reported in
/// `Optimizing`; [`run_seldonian`](super::run_seldonian) replaces it with the
/// state its log was in.
pub fn find_candidate(
    spec: &Specification,
    model: &dyn Model,
    candidate: &Dataset,
    safety_size: usize,
    theta0: Vec<f64>,
) -> Result<CandidateSolution, EngineError> {
    let opt = spec.optimization();
    let mut multipliers = spec.multipliers_init();
    let n_constraints = spec.parse_trees().len();

    if candidate.is_empty() {
        tracing::warn!("candidate split is empty; skipping optimization");
        return Ok(CandidateSolution {
            theta: theta0,
            objective: f64::NAN,
            predicted_upper: vec![f64::INFINITY; n_constraints],
            feasible: false,
            iterations: 0,
            multipliers,
        });
    }

    let batches = batches(spec, candidate);
    let total_iters = if opt.use_batches {
        opt.n_epochs * batches.len()
    } else {
        opt.num_iters
    };

    let mut theta = theta0;
    let mut stepper = Stepper::from_config(opt, theta.len());
    let mut best: Option<(f64, Vec<f64>)> = None;
    let mut iterations = 0;

    for iteration in 0..total_iters {
        let batch = &batches[iteration % batches.len()];
        let p = snapshot(spec, model, batch, &theta, safety_size);
        if diverged(&p) {
            return Err(EngineError::NumericalDivergence {
                state: EngineState::Optimizing,
                iteration,
            });
        }
        iterations = iteration + 1;

        if p.feasible && best.as_ref().map_or(true, |(obj, _)| p.objective < *obj) {
            best = Some((p.objective, theta.clone()));
        }

        // Non-finite bounds (too few rows) contribute no gradient and leave λ alone.
        let mut grad = p.objective_grad.clone();
        for (lambda, ucb) in multipliers.iter_mut().zip(&p.upper) {
            if !ucb.value.is_finite() {
                continue;
            }
            for (g, d) in grad.iter_mut().zip(ucb.gradient(theta.len())) {
                *g += *lambda * d;
            }
            *lambda = (*lambda + opt.alpha_lamb * ucb.value).max(0.0);
        }

        if iteration % LOG_EVERY == 0 {
            tracing::debug!(
                iteration,
                objective = p.objective,
                feasible = p.feasible,
                ?multipliers,
                "candidate search"
            );
        }

        if let Some(tol) = opt.gradient_tolerance {
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm < tol {
                tracing::debug!(iteration, norm, "gradient below tolerance");
                break;
            }
        }

        stepper.step(&mut theta, &grad);
        if theta.iter().any(|t| !t.is_finite()) {
            return Err(EngineError::NumericalDivergence {
                state: EngineState::Optimizing,
                iteration,
            });
        }
    }

    let chosen = match (opt.candidate_policy, best) {
        (CandidatePolicy::BestFeasible, Some((_, best_theta))) => best_theta,
        _ => theta,
    };

    let last = snapshot(spec, model, candidate, &chosen, safety_size);
    if diverged(&last) {
        return Err(EngineError::NumericalDivergence {
            state: EngineState::Optimizing,
            iteration: iterations,
        });
    }
    Ok(CandidateSolution {
        theta: chosen,
        objective: last.objective,
        predicted_upper: last.upper.iter().map(|u| u.value).collect(),
        feasible: last.feasible,
        iterations,
        multipliers,
    })
}
