use std::fmt;

use serde::Deserialize;

/// Per-iteration context passed to the trust-region policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepContext {
    pub iter: usize,
    pub cost0: f64,
    /// Cost after the tentative step; `None` if it was non-finite.
    pub cost_trial: Option<f64>,
    pub dx_norm: f64,
}

/// Policy deciding the damping of each step and whether to keep it.
pub trait TrustRegionPolicy: fmt::Debug + Send {
    /// Short name used in trace rows.
    fn name(&self) -> &'static str;

    /// Resets internal state before an optimization.
    fn initialize(&mut self);

    /// Damping added to the normal equations for the next step.
    fn damping(&self) -> f64;

    /// Accept or reject the tentative step; may update the damping.
    fn evaluate_step(&mut self, ctx: &StepContext) -> bool;

    /// Called when the linear system could not be solved at the current damping.
    fn on_solve_failure(&mut self) {}
}

/// Undamped Gauss-Newton: every finite step is taken.
#[derive(Clone, Copy, Debug, Default)]
pub struct GaussNewtonPolicy;

impl TrustRegionPolicy for GaussNewtonPolicy {
    fn name(&self) -> &'static str {
        "gn"
    }

    fn initialize(&mut self) {}

    fn damping(&self) -> f64 {
        0.0
    }

    fn evaluate_step(&mut self, ctx: &StepContext) -> bool {
        ctx.cost_trial.is_some()
    }
}

/// Levenberg-Marquardt damping: strict decrease required, lambda shrinks on
/// accepted steps and grows on rejected ones.
#[derive(Clone, Copy, Debug)]
pub struct LevenbergMarquardtPolicy {
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    lambda: f64,
}

impl LevenbergMarquardtPolicy {
    pub fn new(initial_lambda: f64, lambda_up: f64, lambda_down: f64) -> Self {
        let lambda_up = if lambda_up > 1.0 { lambda_up } else { 10.0 };
        let lambda_down = if (0.0..1.0).contains(&lambda_down) && lambda_down > 0.0 {
            lambda_down
        } else {
            0.5
        };
        let initial_lambda = initial_lambda.max(1e-12);
        Self {
            initial_lambda,
            lambda_up,
            lambda_down,
            lambda: initial_lambda,
        }
    }
}

impl Default for LevenbergMarquardtPolicy {
    fn default() -> Self {
        Self::new(1e-3, 10.0, 0.5)
    }
}

impl TrustRegionPolicy for LevenbergMarquardtPolicy {
    fn name(&self) -> &'static str {
        "lm"
    }

    fn initialize(&mut self) {
        self.lambda = self.initial_lambda;
    }

    fn damping(&self) -> f64 {
        self.lambda
    }

    fn evaluate_step(&mut self, ctx: &StepContext) -> bool {
        let accepted = ctx
            .cost_trial
            .map(|cost_trial| cost_trial < ctx.cost0)
            .unwrap_or(false);
        if accepted {
            self.lambda = (self.lambda * self.lambda_down).max(1e-12);
        } else {
            self.lambda *= self.lambda_up;
        }
        accepted
    }

    fn on_solve_failure(&mut self) {
        self.lambda *= self.lambda_up;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustRegionMethod {
    #[default]
    GaussNewton,
    LevenbergMarquardt,
}

/// Configuration of the policy the optimizer builds.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrustRegionOptions {
    pub method: TrustRegionMethod,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for TrustRegionOptions {
    fn default() -> Self {
        Self {
            method: TrustRegionMethod::GaussNewton,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.5,
        }
    }
}

impl TrustRegionOptions {
    pub fn build(&self) -> Box<dyn TrustRegionPolicy> {
        match self.method {
            TrustRegionMethod::GaussNewton => Box::new(GaussNewtonPolicy),
            TrustRegionMethod::LevenbergMarquardt => Box::new(LevenbergMarquardtPolicy::new(
                self.initial_lambda,
                self.lambda_up,
                self.lambda_down,
            )),
        }
    }
}
