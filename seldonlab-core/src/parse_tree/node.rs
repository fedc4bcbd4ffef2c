//! Parse tree node types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of statistical measures a constraint can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MeasureKind {
    /// Accuracy: y·p + (1−y)(1−p).
    Acc,
    /// Error rate: 1 − accuracy.
    Er,
    /// Positive rate: p.
    Pr,
    /// Negative rate: 1 − p.
    Nr,
    /// True positive rate, over rows with y = 1.
    Tpr,
    /// False negative rate, over rows with y = 1.
    Fnr,
    /// False positive rate, over rows with y = 0.
    Fpr,
    /// True negative rate, over rows with y = 0.
    Tnr,
    /// Mean squared error (ŷ − y)².
    Mse,
    /// Mean error ŷ − y.
    Me,
}

/// Which labels a measure averages over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFilter {
    All,
    Positive,
    Negative,
}

impl MeasureKind {
    pub const ALL: [MeasureKind; 10] = [
        MeasureKind::Acc,
        MeasureKind::Er,
        MeasureKind::Pr,
        MeasureKind::Nr,
        MeasureKind::Tpr,
        MeasureKind::Fnr,
        MeasureKind::Fpr,
        MeasureKind::Tnr,
        MeasureKind::Mse,
        MeasureKind::Me,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MeasureKind::Acc => "ACC",
            MeasureKind::Er => "ER",
            MeasureKind::Pr => "PR",
            MeasureKind::Nr => "NR",
            MeasureKind::Tpr => "TPR",
            MeasureKind::Fnr => "FNR",
            MeasureKind::Fpr => "FPR",
            MeasureKind::Tnr => "TNR",
            MeasureKind::Mse => "MSE",
            MeasureKind::Me => "ME",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn label_filter(self) -> LabelFilter {
        match self {
            MeasureKind::Tpr | MeasureKind::Fnr => LabelFilter::Positive,
            MeasureKind::Fpr | MeasureKind::Tnr => LabelFilter::Negative,
            _ => LabelFilter::All,
        }
    }

    /// Per-row estimate z and its derivative dz/dp for prediction `p` and label `y`.
    pub fn row_estimate(self, p: f64, y: f64) -> (f64, f64) {
        match self {
            MeasureKind::Acc => (y * p + (1.0 - y) * (1.0 - p), 2.0 * y - 1.0),
            MeasureKind::Er => (1.0 - (y * p + (1.0 - y) * (1.0 - p)), 1.0 - 2.0 * y),
            MeasureKind::Pr | MeasureKind::Tpr | MeasureKind::Fpr => (p, 1.0),
            MeasureKind::Nr | MeasureKind::Fnr | MeasureKind::Tnr => (1.0 - p, -1.0),
            MeasureKind::Mse => ((p - y).powi(2), 2.0 * (p - y)),
            MeasureKind::Me => (p - y, 1.0),
        }
    }
}

impl LabelFilter {
    pub fn accepts(self, y: f64) -> bool {
        match self {
            LabelFilter::All => true,
            LabelFilter::Positive => y >= 0.5,
            LabelFilter::Negative => y < 0.5,
        }
    }
}

/// A measure leaf: a measure kind restricted to the intersection of subgroups.
///
/// Groups are kept sorted and deduplicated, so `ACC | [a, b]` and
/// `ACC | [b, a]` are the same leaf.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Measure {
    pub kind: MeasureKind,
    pub groups: Vec<String>,
}

impl Measure {
    pub fn new(kind: MeasureKind, mut groups: Vec<String>) -> Self {
        groups.sort();
        groups.dedup();
        Self { kind, groups }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(f64),
    Measure(Measure),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Unique measure leaves, in first-appearance order.
    pub fn measures(&self) -> Vec<&Measure> {
        let mut out: Vec<&Measure> = Vec::new();
        self.collect_measures(&mut out);
        out
    }

    fn collect_measures<'a>(&'a self, out: &mut Vec<&'a Measure>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Measure(m) => {
                if !out.contains(&m) {
                    out.push(m);
                }
            }
            Expr::Unary { arg, .. } => arg.collect_measures(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_measures(out);
                rhs.collect_measures(out);
            }
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            write!(f, "{}", self.kind.name())
        } else {
            write!(f, "({} | [{}])", self.kind.name(), self.groups.join(", "))
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(v) => write!(f, "{v}"),
            Expr::Measure(m) => write!(f, "{m}"),
            Expr::Unary { op: UnaryOp::Neg, arg } => write!(f, "-{arg}"),
            Expr::Unary { op: UnaryOp::Abs, arg } => write!(f, "abs({arg})"),
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::Add => write!(f, "({lhs} + {rhs})"),
                BinaryOp::Sub => write!(f, "({lhs} - {rhs})"),
                BinaryOp::Mul => write!(f, "({lhs} * {rhs})"),
                BinaryOp::Div => write!(f, "({lhs} / {rhs})"),
                BinaryOp::Min => write!(f, "min({lhs}, {rhs})"),
                BinaryOp::Max => write!(f, "max({lhs}, {rhs})"),
            },
        }
    }
}

/// Root comparison of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Ge,
    Gt,
    Le,
    Lt,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Lt => "<",
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, Comparison::Gt | Comparison::Lt)
    }
}
