//! Engine state machine and its audit trail.
//!
//! ```text
//! Init → Optimizing → CandidateFound → SafetyTesting → Accepted
//!                                                    → Rejected
//! ```
//! Any non-terminal state may end in `Failed` when the search diverges.

use serde::{Deserialize, Serialize};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Init,
    Optimizing,
    CandidateFound,
    SafetyTesting,
    Accepted,
    Rejected,
    Failed,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Accepted | EngineState::Rejected | EngineState::Failed
        )
    }

    fn can_transition(self, to: EngineState) -> bool {
        use EngineState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Init, Optimizing)
            | (Optimizing, CandidateFound)
            | (CandidateFound, SafetyTesting)
            | (SafetyTesting, Accepted)
            | (SafetyTesting, Rejected) => true,
            _ => false,
        }
    }
}

/// Current state plus every state visited so far, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLog {
    visited: Vec<EngineState>,
}

impl StateLog {
    pub fn new() -> Self {
        Self {
            visited: vec![EngineState::Init],
        }
    }

    pub fn current(&self) -> EngineState {
        self.visited
            .last()
            .copied()
            .unwrap_or(EngineState::Init)
    }

    pub fn advance(&mut self, to: EngineState) -> Result<(), EngineError> {
        let from = self.current();
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        tracing::trace!(?from, ?to, "engine transition");
        self.visited.push(to);
        Ok(())
    }

    pub fn visited(&self) -> &[EngineState] {
        &self.visited
    }

    pub fn into_visited(self) -> Vec<EngineState> {
        self.visited
    }
}

impl Default for StateLog {
    fn default() -> Self {
        Self::new()
    }
}
