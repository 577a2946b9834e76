use crate::problems::{BatchId, GroupId, VariableId};

/// Errors raised synchronously by the estimator and its pool.
///
/// Numerical trouble (iteration cap, cost increase, rank loss) is never
/// reported here; it is carried as data in [`crate::estimator::BatchResult`].
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    /// The marginalized group is missing, or a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A batch removal targeted a batch that is not committed.
    #[error("batch not found: {0}")]
    NotFound(String),

    /// The same batch was offered to the pool twice.
    #[error("batch {0} is already present in the problem")]
    BatchAlreadyPresent(BatchId),

    /// `accept`/`reject` was invoked on a decision that was already consumed.
    #[error("pending decision already consumed")]
    DecisionConsumed,

    /// A restore was requested but the trial did not save design variables.
    #[error("no saved design variables to restore")]
    NoSavedDesignVariables,

    /// An error term references a variable its batch does not declare.
    #[error("error term references undeclared design variable {0}")]
    UnknownVariable(VariableId),

    /// The same variable was declared twice in one batch.
    #[error("design variable {0} declared twice in the same batch")]
    DuplicateVariable(VariableId),

    /// A shared variable was redeclared with a different group or shape.
    #[error("design variable {id} conflicts with the problem: {reason}")]
    VariableMismatch { id: VariableId, reason: String },

    /// The requested group does not exist in the problem.
    #[error("group {0} does not appear in the problem")]
    UnknownGroup(GroupId),

    #[error(transparent)]
    Marginalization(#[from] MarginalizationError),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Failures of the marginalization oracle contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarginalizationError {
    #[error("split column {keep} exceeds the {columns} columns of the system")]
    SplitOutOfRange { keep: usize, columns: usize },

    #[error("decomposition failed on a system with non-finite entries")]
    NonFinite,
}

pub type Result<T, E = EstimatorError> = std::result::Result<T, E>;
