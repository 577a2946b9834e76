//! incropt: incremental batch estimation on top of nonlinear least squares
//!
//! - `IncrementalEstimator`: tries batches, scores them by information gain
//!   on a marginalized group and commits or rolls them back
//! - `IncrementalProblem`: the pool of committed batches and their shared
//!   design variables
//! - `Optimizer`: Gauss-Newton / Levenberg-Marquardt over the pool
//! - `Marginalizer`: spectral analysis of the marginalized group
//!
//! Design variables update through a `Manifold`, so angles and other
//! non-Euclidean parameters work alongside plain vectors.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod estimator;
pub mod manifolds;
pub mod numerics;
pub mod problems;
pub mod solvers;

pub use algorithms::{
    Marginalizer, MarginalizerOptions, SpectralSnapshot, SubspaceAnalysis, SvdMarginalizer,
};
pub use config::{EstimatorConfig, EstimatorOptions};
pub use error::{EstimatorError, MarginalizationError, Result};
pub use estimator::{
    BatchResult, IncrementalEstimator, PendingDecision, RemovedBatch, SpectralState,
};
pub use manifolds::{AngleSpace, EuclideanSpace, Manifold};
pub use problems::{
    Batch, BatchId, DesignVariable, ErrorTerm, GroupId, IncrementalProblem, VariableId,
};
pub use solvers::{
    LinearSolverOptions, LinearSystemSolver, Optimizer, OptimizerOptions, SolutionReturnValue,
    TrustRegionMethod, TrustRegionOptions,
};
