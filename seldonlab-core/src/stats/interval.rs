//! Confidence intervals and interval arithmetic.
//!
//! `Interval` is the public (lower, upper) pair. `DualInterval` carries
//! gradients on both ends and implements the propagation rules used by the
//! parse tree:
//! - `+`, `min`, `max` combine like-directed ends
//! - `-` pairs the lower end of the left operand with the upper end of the right
//! - `*`, `/` take the extremes over the four end-point combinations
//! - `/` whose denominator interval contains zero is unbounded

use serde::{Deserialize, Serialize};

use super::dual::Dual;

/// A (lower, upper) confidence interval. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub const UNBOUNDED: Interval = Interval {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn point(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower == f64::NEG_INFINITY && self.upper == f64::INFINITY
    }
}

/// Interval whose end points carry gradients.
#[derive(Debug, Clone, PartialEq)]
pub struct DualInterval {
    pub lower: Dual,
    pub upper: Dual,
}

impl DualInterval {
    pub fn new(lower: Dual, upper: Dual) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(
            Dual::constant(f64::NEG_INFINITY),
            Dual::constant(f64::INFINITY),
        )
    }

    pub fn exact(value: f64) -> Self {
        Self::new(Dual::constant(value), Dual::constant(value))
    }

    pub fn to_interval(&self) -> Interval {
        Interval::new(self.lower.value, self.upper.value)
    }

    fn contains_zero(&self) -> bool {
        self.lower.value <= 0.0 && self.upper.value >= 0.0
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.lower + rhs.lower, self.upper + rhs.upper)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.lower - rhs.upper, self.upper - rhs.lower)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.upper, -self.lower)
    }

    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.lower.min(rhs.lower), self.upper.min(rhs.upper))
    }

    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.lower.max(rhs.lower), self.upper.max(rhs.upper))
    }

    pub fn abs(self) -> Self {
        if self.lower.value >= 0.0 {
            self
        } else if self.upper.value <= 0.0 {
            self.neg()
        } else {
            let upper = (-self.lower).max(self.upper);
            Self::new(Dual::constant(0.0), upper)
        }
    }

    pub fn mul(self, rhs: Self) -> Self {
        let candidates = [
            self.lower.clone() * rhs.lower.clone(),
            self.lower.clone() * rhs.upper.clone(),
            self.upper.clone() * rhs.lower.clone(),
            self.upper * rhs.upper,
        ];
        Self::from_extremes(candidates)
    }

    pub fn div(self, rhs: Self) -> Self {
        if rhs.contains_zero() {
            return Self::unbounded();
        }
        let candidates = [
            self.lower.clone() / rhs.lower.clone(),
            self.lower.clone() / rhs.upper.clone(),
            self.upper.clone() / rhs.lower.clone(),
            self.upper / rhs.upper,
        ];
        Self::from_extremes(candidates)
    }

    /// Smallest and largest candidate; any NaN (e.g. ∞·0) gives up on the bound.
    fn from_extremes(candidates: [Dual; 4]) -> Self {
        if candidates.iter().any(|c| c.value.is_nan()) {
            return Self::unbounded();
        }
        let [a, b, c, d] = candidates;
        let lo = a.clone().min(b.clone()).min(c.clone()).min(d.clone());
        let hi = a.max(b).max(c).max(d);
        Self::new(lo, hi)
    }
}
