use serde::Deserialize;

use crate::solvers::common::trace::SolverTraceRecord;
use crate::solvers::linear::{LinearSolverOptions, LinearSystemSolver, TruncatedSvdSolver};
use crate::solvers::trust_region::{TrustRegionOptions, TrustRegionPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    pub max_iterations: usize,
    /// stop once an accepted step changes the cost by at most this
    pub convergence_delta_j: f64,
    /// stop once ||dx|| is at most this
    pub convergence_delta_x: f64,
    /// log per-iteration rows at info level
    pub verbose: bool,
    /// keep per-iteration rows in the result
    pub collect_trace: bool,
    pub trust_region: TrustRegionOptions,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            convergence_delta_j: 1e-9,
            convergence_delta_x: 1e-9,
            verbose: false,
            collect_trace: false,
            trust_region: TrustRegionOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolutionReturnValue {
    /// Number of linearizations that led to a step attempt.
    pub iterations: usize,
    pub cost_start: f64, // 0.5 * ||r||^2
    pub cost_final: f64,
    pub converged: bool,
    pub failed_linear_solves: usize,
    pub trace: Option<Vec<SolverTraceRecord>>,
}

/// Iterative nonlinear least-squares solver over an `IncrementalProblem`.
#[derive(Debug)]
pub struct Optimizer {
    pub(super) options: OptimizerOptions,
    pub(super) linear_solver: Box<dyn LinearSystemSolver>,
    pub(super) trust_region: Box<dyn TrustRegionPolicy>,
}

impl Optimizer {
    /// Truncated-SVD linear solver and the configured trust-region policy.
    pub fn new(options: OptimizerOptions, linear_solver_options: LinearSolverOptions) -> Self {
        Self::with_components(
            options,
            Box::new(TruncatedSvdSolver::new(linear_solver_options)),
            options.trust_region.build(),
        )
    }

    /// Build an optimizer on explicitly provided components.
    pub fn with_components(
        options: OptimizerOptions,
        linear_solver: Box<dyn LinearSystemSolver>,
        trust_region: Box<dyn TrustRegionPolicy>,
    ) -> Self {
        Self {
            options,
            linear_solver,
            trust_region,
        }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn linear_solver(&self) -> &dyn LinearSystemSolver {
        self.linear_solver.as_ref()
    }

    pub fn trust_region_policy(&self) -> &dyn TrustRegionPolicy {
        self.trust_region.as_ref()
    }

    pub fn initialize_linear_solver(&mut self) {
        self.linear_solver.initialize();
    }

    pub fn initialize_trust_region_policy(&mut self) {
        self.trust_region.initialize();
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerOptions::default(), LinearSolverOptions::default())
    }
}
