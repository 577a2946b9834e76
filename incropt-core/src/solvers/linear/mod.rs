//! Linear system solvers used inside the optimizer loop.

mod truncated_svd;

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::problems::{IncrementalProblem, SystemLayout};

pub use truncated_svd::TruncatedSvdSolver;

/// Options of the linear system solver.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinearSolverOptions {
    /// Rank tolerance; `None` picks the SuiteSparseQR default.
    pub qr_tolerance: Option<f64>,
    /// Normalize Jacobian columns before the decomposition.
    pub column_normalization: bool,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        Self {
            qr_tolerance: None,
            column_normalization: true,
        }
    }
}

/// Pluggable solver for the linearized system `J dx = -r`.
///
/// Call order inside one optimization: `initialize`, `init_matrix_structure`,
/// then repeatedly `build_system`, `analyze_system`, `solve_system`.
pub trait LinearSystemSolver: fmt::Debug + Send {
    /// Drops the matrix structure and all cached factorizations.
    fn initialize(&mut self);

    /// Allocates the system for the given layout.
    fn init_matrix_structure(&mut self, layout: &SystemLayout);

    /// Evaluates Jacobian and residual at the problem's current values.
    fn build_system(&mut self, problem: &IncrementalProblem);

    /// Factorizes the last built system; `false` if that failed.
    fn analyze_system(&mut self) -> bool;

    /// Damped step for the last analyzed system, `None` if unavailable.
    fn solve_system(&self, damping: f64) -> Option<DVector<f64>>;

    /// Transpose of the last built Jacobian (columns x rows).
    fn jacobian_transpose(&self) -> &DMatrix<f64>;

    /// Residual stacked by the last `build_system`.
    fn residual(&self) -> &DVector<f64>;

    /// Numerical rank of the last analyzed system.
    fn rank(&self) -> usize;

    fn rank_deficiency(&self) -> usize;

    /// Tolerance used for the last rank decision.
    fn qr_tolerance(&self) -> f64;

    /// Bytes currently held by the solver.
    fn memory_usage(&self) -> usize;

    fn peak_memory_usage(&self) -> usize;

    /// Floating point operations spent since the last `initialize`.
    fn num_flops(&self) -> f64;
}
