//! Constraint parse trees.
//!
//! A constraint such as
//! `min((ACC | [a])/(ACC | [b]), (ACC | [b])/(ACC | [a])) >= 0.8`
//! compiles into a `ParseTree` whose *margin* (`lhs − rhs` for `>=`/`>`,
//! `rhs − lhs` for `<=`/`<`) is positive exactly when the constraint holds.
//! The constraint function used by the optimizer is `g = −margin`.

pub mod evaluate;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod templates;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use evaluate::{BoundSide, Evaluation, Predictions};
pub use node::{BinaryOp, Comparison, Expr, LabelFilter, Measure, MeasureKind, UnaryOp};
pub use templates::FairnessTemplate;

/// Leaves with fewer rows than this get the interval (−∞, +∞).
pub const DEFAULT_MIN_SAMPLES: usize = 2;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown measure '{name}' at offset {offset}")]
    UnknownMeasure { name: String, offset: usize },

    #[error("unknown subgroup '{name}' at offset {offset} (declared: {})", declared.join(", "))]
    UnknownGroup {
        name: String,
        offset: usize,
        declared: Vec<String>,
    },

    #[error("constraint compares constants only; it needs at least one measure")]
    NoMeasure,

    #[error("delta must be in (0, 1), got {0}")]
    InvalidDelta(f64),

    #[error("{deltas} deltas given for {constraints} constraints")]
    DeltaCount { constraints: usize, deltas: usize },
}

/// A compiled constraint with its confidence level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseTree {
    source: String,
    delta: f64,
    comparison: Comparison,
    lhs: Expr,
    rhs: Expr,
    margin: Expr,
    min_samples: usize,
}

impl ParseTree {
    /// Compile `source`, checking subgroup names against `columns`.
    pub fn compile(source: &str, delta: f64, columns: &[String]) -> Result<Self, ParseError> {
        if !(delta > 0.0 && delta < 1.0) {
            return Err(ParseError::InvalidDelta(delta));
        }
        let (lhs, comparison, rhs) = parser::parse_constraint(source, columns)?;
        let margin = match comparison {
            Comparison::Ge | Comparison::Gt => Expr::binary(BinaryOp::Sub, lhs.clone(), rhs.clone()),
            Comparison::Le | Comparison::Lt => Expr::binary(BinaryOp::Sub, rhs.clone(), lhs.clone()),
        };
        Ok(Self {
            source: source.to_string(),
            delta,
            comparison,
            lhs,
            rhs,
            margin,
            min_samples: DEFAULT_MIN_SAMPLES,
        })
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }

    pub fn margin(&self) -> &Expr {
        &self.margin
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Unique measure leaves.
    pub fn measures(&self) -> Vec<&Measure> {
        self.margin.measures()
    }
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.comparison.symbol(), self.rhs)
    }
}

/// Compile several constraints. A single δ is shared by all of them.
pub fn make_parse_trees<S: AsRef<str>>(
    constraints: &[S],
    deltas: &[f64],
    columns: &[String],
) -> Result<Vec<ParseTree>, ParseError> {
    if deltas.len() != 1 && deltas.len() != constraints.len() {
        return Err(ParseError::DeltaCount {
            constraints: constraints.len(),
            deltas: deltas.len(),
        });
    }
    constraints
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let delta = if deltas.len() == 1 { deltas[0] } else { deltas[i] };
            ParseTree::compile(c.as_ref(), delta, columns)
        })
        .collect()
}
