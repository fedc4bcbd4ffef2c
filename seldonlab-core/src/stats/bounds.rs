//! Student-t confidence bounds on the mean of per-row estimates.
//!
//! Two modes:
//! - `Safety`: the actual one-sided bound on the rows at hand.
//! - `Candidate`: the bound the safety test is *predicted* to produce, used during
//!   candidate selection. The width uses the expected safety-split sample count and
//!   is inflated (default ×2) so the search aims for a comfortable margin.
//!
//! Fewer than `min_samples` rows (or fewer than two, which the t-test needs)
//! yields the uninformative interval (−∞, +∞) rather than an error.

use serde::{Deserialize, Serialize};

use super::dual::Dual;
use super::interval::DualInterval;
use super::special::student_t_quantile;

/// Which ends of an interval are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sides {
    pub lower: bool,
    pub upper: bool,
}

impl Sides {
    pub const NONE: Sides = Sides {
        lower: false,
        upper: false,
    };
    pub const LOWER: Sides = Sides {
        lower: true,
        upper: false,
    };
    pub const UPPER: Sides = Sides {
        lower: false,
        upper: true,
    };
    pub const BOTH: Sides = Sides {
        lower: true,
        upper: true,
    };

    pub fn union(self, other: Sides) -> Sides {
        Sides {
            lower: self.lower || other.lower,
            upper: self.upper || other.upper,
        }
    }

    pub fn swapped(self) -> Sides {
        Sides {
            lower: self.upper,
            upper: self.lower,
        }
    }

    pub fn any(self) -> bool {
        self.lower || self.upper
    }

    pub fn both(self) -> bool {
        self.lower && self.upper
    }

    /// Failure probability spent on each requested side.
    pub fn delta_per_side(self, delta: f64) -> f64 {
        if self.both() {
            delta / 2.0
        } else {
            delta
        }
    }
}

/// How the bound width is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundMode {
    Safety,
    Candidate {
        safety_size: usize,
        candidate_size: usize,
        inflation: f64,
    },
}

impl BoundMode {
    /// Sample count the bound width is computed for, given `n` rows at hand.
    pub fn effective_size(&self, n: usize) -> usize {
        match *self {
            BoundMode::Safety => n,
            BoundMode::Candidate {
                safety_size,
                candidate_size,
                ..
            } => {
                if candidate_size == 0 {
                    0
                } else {
                    (n as f64 * safety_size as f64 / candidate_size as f64).round() as usize
                }
            }
        }
    }

    fn inflation(&self) -> f64 {
        match *self {
            BoundMode::Safety => 1.0,
            BoundMode::Candidate { inflation, .. } => inflation,
        }
    }
}

/// Point estimate and confidence interval of one statistical measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanBound {
    pub point: f64,
    pub bound: DualInterval,
    pub n: usize,
}

/// Sample mean and (n−1)-normalized standard deviation, with gradients.
fn mean_std(values: &[f64], grads: Option<&[Vec<f64>]>) -> (Dual, Dual) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();

    let Some(grads) = grads else {
        return (Dual::constant(mean), Dual::constant(std));
    };
    let n_params = grads.first().map_or(0, Vec::len);
    let mut dmean = vec![0.0; n_params];
    let mut dstd = vec![0.0; n_params];
    for (z, g) in values.iter().zip(grads) {
        let centered = z - mean;
        for j in 0..n_params {
            dmean[j] += g[j] / n;
            dstd[j] += centered * g[j];
        }
    }
    if std > 0.0 {
        let scale = 1.0 / (std * (n - 1.0));
        dstd.iter_mut().for_each(|d| *d *= scale);
    } else {
        dstd.iter_mut().for_each(|d| *d = 0.0);
    }
    (Dual::new(mean, dmean), Dual::new(std, dstd))
}

/// One- or two-sided Student-t bound on the mean of `values`.
///
/// `grads[i]` is the gradient of `values[i]` with respect to θ, when available.
pub fn ttest_bound(
    values: &[f64],
    grads: Option<&[Vec<f64>]>,
    delta: f64,
    sides: Sides,
    mode: BoundMode,
    min_samples: usize,
) -> MeanBound {
    let n = values.len();
    let point = if n == 0 {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / n as f64
    };

    let required = min_samples.max(2);
    let n_eff = mode.effective_size(n);
    if !sides.any() || n < required || n_eff < required {
        return MeanBound {
            point,
            bound: DualInterval::unbounded(),
            n,
        };
    }

    let (mean, std) = mean_std(values, grads);
    let t = student_t_quantile(1.0 - sides.delta_per_side(delta), (n_eff - 1) as f64);
    let k = mode.inflation() * t / (n_eff as f64).sqrt();
    let width = std * Dual::constant(k);

    let lower = if sides.lower {
        mean.clone() - width.clone()
    } else {
        Dual::constant(f64::NEG_INFINITY)
    };
    let upper = if sides.upper {
        mean + width
    } else {
        Dual::constant(f64::INFINITY)
    };

    MeanBound {
        point,
        bound: DualInterval::new(lower, upper),
        n,
    }
}
