use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EstimatorError, Result};

use super::{BatchId, DesignVariable, ErrorTerm, GroupId, VariableId};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(0);

/// Design variables and error terms offered to the estimator as one unit.
///
/// Every variable an error term touches must be declared in the batch, even
/// when an earlier batch already brought it into the problem. Shared
/// variables keep the value held by the problem; the declaration here only
/// serves as the initial guess for variables seen for the first time.
pub struct Batch {
    id: BatchId,
    design_variables: Vec<DesignVariable>,
    error_terms: Vec<Box<dyn ErrorTerm>>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed)),
            design_variables: Vec::new(),
            error_terms: Vec::new(),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn add_design_variable(&mut self, variable: DesignVariable) -> Result<()> {
        if self.design_variable(variable.id()).is_some() {
            return Err(EstimatorError::DuplicateVariable(variable.id()));
        }
        self.design_variables.push(variable);
        Ok(())
    }

    pub fn add_error_term<E: ErrorTerm + 'static>(&mut self, term: E) -> Result<()> {
        if let Some(missing) = term
            .design_variables()
            .iter()
            .find(|id| self.design_variable(**id).is_none())
        {
            return Err(EstimatorError::UnknownVariable(*missing));
        }
        self.error_terms.push(Box::new(term));
        Ok(())
    }

    pub fn design_variables(&self) -> &[DesignVariable] {
        &self.design_variables
    }

    pub fn design_variable(&self, id: VariableId) -> Option<&DesignVariable> {
        self.design_variables.iter().find(|dv| dv.id() == id)
    }

    pub fn num_design_variables(&self) -> usize {
        self.design_variables.len()
    }

    pub fn num_error_terms(&self) -> usize {
        self.error_terms.len()
    }

    pub fn error_terms(&self) -> impl Iterator<Item = &dyn ErrorTerm> {
        self.error_terms.iter().map(|et| et.as_ref())
    }

    pub fn contains_group(&self, group: GroupId) -> bool {
        self.design_variables.iter().any(|dv| dv.group() == group)
    }

    pub(crate) fn design_variables_mut(&mut self) -> &mut [DesignVariable] {
        &mut self.design_variables
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("design_variables", &self.design_variables)
            .field("num_error_terms", &self.error_terms.len())
            .finish()
    }
}
