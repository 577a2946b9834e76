//! Nonlinear optimizer and the pieces it is assembled from.

pub mod common;
pub mod linear;
pub mod optimizer;
pub mod trust_region;

pub use common::trace::SolverTraceRecord;
pub use linear::{LinearSolverOptions, LinearSystemSolver, TruncatedSvdSolver};
pub use optimizer::{Optimizer, OptimizerOptions, SolutionReturnValue};
pub use trust_region::{
    GaussNewtonPolicy, LevenbergMarquardtPolicy, StepContext, TrustRegionMethod,
    TrustRegionOptions, TrustRegionPolicy,
};
