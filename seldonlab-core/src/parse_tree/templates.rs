//! Ready-made fairness constraints between two subgroups.

use serde::{Deserialize, Serialize};

use super::node::MeasureKind;

/// Named two-group fairness constraints.
///
/// Both require the smaller of the two cross-group ratios of a measure to be at
/// least `1 − ε`, i.e. each group's rate is within a factor `1 − ε` of the other's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessTemplate {
    /// Ratio of accuracies.
    OverallAccuracyEquality,
    /// Ratio of false negative rates.
    EqualOpportunity,
}

impl FairnessTemplate {
    pub fn name(self) -> &'static str {
        match self {
            FairnessTemplate::OverallAccuracyEquality => "overall_accuracy_equality",
            FairnessTemplate::EqualOpportunity => "equal_opportunity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "overall_accuracy_equality" => Some(FairnessTemplate::OverallAccuracyEquality),
            "equal_opportunity" => Some(FairnessTemplate::EqualOpportunity),
            _ => None,
        }
    }

    pub fn measure(self) -> MeasureKind {
        match self {
            FairnessTemplate::OverallAccuracyEquality => MeasureKind::Acc,
            FairnessTemplate::EqualOpportunity => MeasureKind::Fnr,
        }
    }

    /// Constraint text for groups `a` and `b` with tolerance `epsilon`.
    pub fn render(self, a: &str, b: &str, epsilon: f64) -> String {
        let m = self.measure().name();
        format!(
            "min(({m} | [{a}])/({m} | [{b}]),({m} | [{b}])/({m} | [{a}])) >= {}",
            1.0 - epsilon
        )
    }
}
