use std::sync::Arc;

use crate::manifolds::{AngleSpace, EuclideanSpace, Manifold};

use super::{GroupId, VariableId};

/// A block of unknowns estimated by the optimizer.
///
/// `block_index` and `column_base` are assigned by the pool each time the
/// system layout is rebuilt and are `None` while the variable is inactive
/// or not yet laid out.
#[derive(Clone, Debug)]
pub struct DesignVariable {
    id: VariableId,
    group: GroupId,
    value: Vec<f64>,
    manifold: Arc<dyn Manifold>,
    active: bool,
    block_index: Option<usize>,
    column_base: Option<usize>,
}

impl DesignVariable {
    pub fn new(
        id: VariableId,
        group: GroupId,
        value: Vec<f64>,
        manifold: Arc<dyn Manifold>,
    ) -> Self {
        Self {
            id,
            group,
            value,
            manifold,
            active: true,
            block_index: None,
            column_base: None,
        }
    }

    /// Variable on R^n.
    pub fn euclidean(id: VariableId, group: GroupId, value: Vec<f64>) -> Self {
        Self::new(id, group, value, Arc::new(EuclideanSpace))
    }

    /// Planar angle, wrapped on every update.
    pub fn angle(id: VariableId, group: GroupId, theta: f64) -> Self {
        Self::new(id, group, vec![theta], Arc::new(AngleSpace))
    }

    /// Builder form of [`set_active`](Self::set_active).
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn value(&self) -> &[f64] {
        &self.value
    }

    pub fn set_value(&mut self, value: &[f64]) {
        self.value.clear();
        self.value.extend_from_slice(value);
    }

    pub fn manifold(&self) -> &dyn Manifold {
        self.manifold.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn minimal_dimensions(&self) -> usize {
        self.manifold.minimal_dimensions(self.value.len())
    }

    pub fn block_index(&self) -> Option<usize> {
        self.block_index
    }

    pub fn set_block_index(&mut self, index: Option<usize>) {
        self.block_index = index;
    }

    pub fn column_base(&self) -> Option<usize> {
        self.column_base
    }

    pub fn set_column_base(&mut self, base: Option<usize>) {
        self.column_base = base;
    }

    /// x <- Retr_x(direction)
    pub(crate) fn apply_update(&mut self, direction: &[f64], tmp: &mut Vec<f64>) {
        self.manifold.retract_step_into(&mut self.value, direction, tmp);
    }

    /// Why `other` cannot stand for the same variable, if it cannot.
    pub(crate) fn conflict_with(&self, other: &DesignVariable) -> Option<String> {
        if self.group != other.group {
            return Some(format!("group {} vs {}", self.group, other.group));
        }
        if self.value.len() != other.value.len() {
            return Some(format!(
                "dimension {} vs {}",
                self.value.len(),
                other.value.len()
            ));
        }
        if self.minimal_dimensions() != other.minimal_dimensions() {
            return Some(format!(
                "minimal dimension {} vs {}",
                self.minimal_dimensions(),
                other.minimal_dimensions()
            ));
        }
        None
    }
}
