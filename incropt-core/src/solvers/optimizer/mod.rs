mod solve;
mod types;

pub use types::{Optimizer, OptimizerOptions, SolutionReturnValue};
