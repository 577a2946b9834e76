//! The variable/residual pool and the pieces batches are built from.

pub mod batch;
pub mod design_variable;
pub mod error_term;
pub mod incremental;

use std::fmt;

pub use batch::Batch;
pub use design_variable::DesignVariable;
pub use error_term::ErrorTerm;
pub use incremental::{ErrorTermRef, IncrementalProblem, SystemLayout, VariableValues};

/// Caller-chosen key of a design variable; shared variables reuse the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(pub usize);

/// Partition of design variables; the marginalized group is one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub usize);

/// Identity of a batch, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(pub u64);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dv#{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}
