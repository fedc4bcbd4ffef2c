//! Gradient steppers for θ: Adam with bias-corrected moments, or plain SGD.

use crate::spec::{OptimizationConfig, OptimizerKind};

const ADAM_EPS: f64 = 1e-8;

/// Adam moment estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamState {
    alpha: f64,
    beta_velocity: f64,
    beta_rmsprop: f64,
    velocity: Vec<f64>,
    second_moment: Vec<f64>,
    t: i32,
}

impl AdamState {
    pub fn new(n_params: usize, alpha: f64, beta_velocity: f64, beta_rmsprop: f64) -> Self {
        Self {
            alpha,
            beta_velocity,
            beta_rmsprop,
            velocity: vec![0.0; n_params],
            second_moment: vec![0.0; n_params],
            t: 0,
        }
    }

    pub fn step(&mut self, theta: &mut [f64], grad: &[f64]) {
        self.t = self.t.saturating_add(1);
        let bias_v = 1.0 - self.beta_velocity.powi(self.t);
        let bias_s = 1.0 - self.beta_rmsprop.powi(self.t);
        for j in 0..theta.len() {
            let g = grad[j];
            self.velocity[j] = self.beta_velocity * self.velocity[j] + (1.0 - self.beta_velocity) * g;
            self.second_moment[j] =
                self.beta_rmsprop * self.second_moment[j] + (1.0 - self.beta_rmsprop) * g * g;
            let v_hat = self.velocity[j] / bias_v;
            let s_hat = self.second_moment[j] / bias_s;
            theta[j] -= self.alpha * v_hat / (s_hat.sqrt() + ADAM_EPS);
        }
    }
}

/// The configured step rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Stepper {
    Adam(AdamState),
    Sgd { alpha: f64 },
}

impl Stepper {
    pub fn from_config(config: &OptimizationConfig, n_params: usize) -> Self {
        match config.optimizer {
            OptimizerKind::Adam => Stepper::Adam(AdamState::new(
                n_params,
                config.alpha_theta,
                config.beta_velocity,
                config.beta_rmsprop,
            )),
            OptimizerKind::Sgd => Stepper::Sgd {
                alpha: config.alpha_theta,
            },
        }
    }

    pub fn step(&mut self, theta: &mut [f64], grad: &[f64]) {
        match self {
            Stepper::Adam(state) => state.step(theta, grad),
            Stepper::Sgd { alpha } => {
                for (t, g) in theta.iter_mut().zip(grad) {
                    *t -= *alpha * g;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_adam_step_has_size_alpha() {
        // With bias correction, the first step is α · g / |g| per coordinate.
        let mut adam = AdamState::new(2, 0.1, 0.9, 0.95);
        let mut theta = [1.0, 1.0];
        adam.step(&mut theta, &[4.0, -0.5]);
        assert!((theta[0] - 0.9).abs() < 1e-6);
        assert!((theta[1] - 1.1).abs() < 1e-6);
    }

    #[test]
    fn adam_minimizes_quadratic() {
        let mut stepper = Stepper::from_config(
            &OptimizationConfig {
                alpha_theta: 0.05,
                ..OptimizationConfig::default()
            },
            1,
        );
        let mut theta = [3.0];
        for _ in 0..2_000 {
            let grad = [2.0 * (theta[0] - 1.0)];
            stepper.step(&mut theta, &grad);
        }
        assert!((theta[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn sgd_step() {
        let mut s = Stepper::Sgd { alpha: 0.5 };
        let mut theta = [1.0, 2.0];
        s.step(&mut theta, &[1.0, -2.0]);
        assert_eq!(theta, [0.5, 3.0]);
    }
}
