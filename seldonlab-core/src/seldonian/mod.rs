//! Seldonian training: candidate selection followed by a safety test.
//!
//! `run_seldonian` drives the state machine in [`state`]: split the data,
//! pick an initial θ, search for a candidate on the candidate split, then test
//! it on the held-out safety split. The result either carries an accepted θ or
//! reports No Solution Found; it never returns a θ that failed the test.

pub mod candidate;
pub mod optimizer;
pub mod safety;
pub mod state;

use serde::{Deserialize, Serialize};

use crate::models::ModelError;
use crate::spec::{InitialSolution, Specification};

pub use candidate::{find_candidate, CandidateSolution};
pub use optimizer::{AdamState, Stepper};
pub use safety::{safety_test, SafetyReport};
pub use state::{EngineState, StateLog};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("numerical divergence in state {state:?} at iteration {iteration}")]
    NumericalDivergence { state: EngineState, iteration: usize },

    #[error("initial fit failed: {0}")]
    InitialFit(#[from] ModelError),

    #[error("invalid engine transition {from:?} → {to:?}")]
    InvalidTransition { from: EngineState, to: EngineState },
}

/// Final verdict of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Accepted { theta: Vec<f64> },
    NoSolutionFound,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    pub fn theta(&self) -> Option<&[f64]> {
        match self {
            Outcome::Accepted { theta } => Some(theta),
            Outcome::NoSolutionFound => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeldonianResult {
    pub outcome: Outcome,
    pub candidate: CandidateSolution,
    pub safety: SafetyReport,
    pub states: Vec<EngineState>,
    pub spec_fingerprint: String,
}

/// A run that ended in [`EngineState::Failed`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct EngineFailure {
    pub error: EngineError,
    /// Every state visited, ending in `Failed`.
    pub states: Vec<EngineState>,
}

impl EngineFailure {
    fn record(mut log: StateLog, error: EngineError) -> Self {
        let error = match error {
            EngineError::NumericalDivergence { iteration, .. } => {
                EngineError::NumericalDivergence {
                    state: log.current(),
                    iteration,
                }
            }
            other => other,
        };
        // Only an invalid transition out of a terminal state can refuse this.
        if log.advance(EngineState::Failed).is_err() {
            tracing::warn!(state = ?log.current(), "failure after a terminal state");
        }
        tracing::warn!(%error, "engine failed");
        Self {
            error,
            states: log.into_visited(),
        }
    }
}

/// Train under the specification's constraints.
///
/// Every error moves the state log to `Failed` and is returned together with
/// the states visited.
pub fn run_seldonian(spec: &Specification) -> Result<SeldonianResult, EngineFailure> {
    let mut log = StateLog::new();
    match drive(spec, &mut log) {
        Ok((outcome, candidate, safety)) => Ok(SeldonianResult {
            outcome,
            candidate,
            safety,
            states: log.into_visited(),
            spec_fingerprint: spec.fingerprint(),
        }),
        Err(error) => Err(EngineFailure::record(log, error)),
    }
}

fn drive(
    spec: &Specification,
    log: &mut StateLog,
) -> Result<(Outcome, CandidateSolution, SafetyReport), EngineError> {
    let split = spec.split(spec.split_seed());
    let model = spec.model().build();
    let n_params = model.n_params(spec.dataset().n_features());
    tracing::debug!(
        candidate = split.candidate.n_rows(),
        safety = split.safety.n_rows(),
        "split data"
    );

    let theta0 = match spec.initial_solution() {
        InitialSolution::Zeros => vec![0.0; n_params],
        InitialSolution::Fit => match model.fit(&split.candidate) {
            Ok(theta) => theta,
            Err(ModelError::EmptyData) => vec![0.0; n_params],
            Err(e) => return Err(e.into()),
        },
    };

    log.advance(EngineState::Optimizing)?;
    let candidate = find_candidate(
        spec,
        model.as_ref(),
        &split.candidate,
        split.safety.n_rows(),
        theta0,
    )?;
    log.advance(EngineState::CandidateFound)?;
    tracing::debug!(
        iterations = candidate.iterations,
        objective = candidate.objective,
        feasible = candidate.feasible,
        "candidate found"
    );

    log.advance(EngineState::SafetyTesting)?;
    let safety = safety_test(
        spec.parse_trees(),
        model.as_ref(),
        &candidate.theta,
        &split.safety,
    );

    let outcome = if safety.passed_all() {
        log.advance(EngineState::Accepted)?;
        Outcome::Accepted {
            theta: candidate.theta.clone(),
        }
    } else {
        log.advance(EngineState::Rejected)?;
        Outcome::NoSolutionFound
    };
    tracing::info!(
        accepted = outcome.is_accepted(),
        upper_bounds = ?safety.upper_bounds,
        "safety test complete"
    );
    Ok((outcome, candidate, safety))
}
