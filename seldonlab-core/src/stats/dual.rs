//! Forward-mode dual numbers carrying a gradient with respect to model parameters.
//!
//! An empty gradient vector stands for "constant" (all-zero gradient), so
//! constants and gradient-free evaluations never allocate.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// A value together with its gradient with respect to the model parameters θ.
#[derive(Debug, Clone, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub grad: Vec<f64>,
}

impl Dual {
    /// A constant: zero gradient.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            grad: Vec::new(),
        }
    }

    pub fn new(value: f64, grad: Vec<f64>) -> Self {
        Self { value, grad }.sanitized()
    }

    pub fn is_constant(&self) -> bool {
        self.grad.is_empty()
    }

    /// Gradient padded with zeros to `n` parameters.
    pub fn gradient(&self, n: usize) -> Vec<f64> {
        if self.grad.is_empty() {
            vec![0.0; n]
        } else {
            self.grad.clone()
        }
    }

    pub fn abs(self) -> Self {
        if self.value < 0.0 {
            -self
        } else {
            self
        }
    }

    pub fn min(self, other: Self) -> Self {
        if other.value < self.value {
            other
        } else {
            self
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.value > self.value {
            other
        } else {
            self
        }
    }

    /// Infinite or NaN values carry no usable gradient.
    fn sanitized(mut self) -> Self {
        if !self.value.is_finite() {
            self.grad.clear();
        }
        self
    }
}

/// `ca * a + cb * b`, treating an empty slice as zeros.
fn combine(a: &[f64], ca: f64, b: &[f64], cb: f64) -> Vec<f64> {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Vec::new(),
        (false, true) => a.iter().map(|x| ca * x).collect(),
        (true, false) => b.iter().map(|x| cb * x).collect(),
        (false, false) => a.iter().zip(b).map(|(x, y)| ca * x + cb * y).collect(),
    }
}

impl Add for Dual {
    type Output = Dual;

    fn add(self, rhs: Dual) -> Dual {
        Dual::new(self.value + rhs.value, combine(&self.grad, 1.0, &rhs.grad, 1.0))
    }
}

impl Sub for Dual {
    type Output = Dual;

    fn sub(self, rhs: Dual) -> Dual {
        Dual::new(self.value - rhs.value, combine(&self.grad, 1.0, &rhs.grad, -1.0))
    }
}

impl Mul for Dual {
    type Output = Dual;

    fn mul(self, rhs: Dual) -> Dual {
        // (ab)' = a'b + ab'
        Dual::new(
            self.value * rhs.value,
            combine(&self.grad, rhs.value, &rhs.grad, self.value),
        )
    }
}

impl Div for Dual {
    type Output = Dual;

    fn div(self, rhs: Dual) -> Dual {
        // (a/b)' = a'/b - a b'/b²
        let b = rhs.value;
        Dual::new(
            self.value / b,
            combine(&self.grad, 1.0 / b, &rhs.grad, -self.value / (b * b)),
        )
    }
}

impl Neg for Dual {
    type Output = Dual;

    fn neg(self) -> Dual {
        Dual {
            value: -self.value,
            grad: self.grad.iter().map(|g| -g).collect(),
        }
    }
}
