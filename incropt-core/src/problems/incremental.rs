use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::error::{EstimatorError, Result};

use super::{Batch, BatchId, DesignVariable, ErrorTerm, GroupId, VariableId};

/// Values of every design variable, keyed by id.
pub type VariableValues = BTreeMap<VariableId, Vec<f64>>;

/// Shape of the linear system produced by the current layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemLayout {
    pub num_columns: usize,
    pub num_rows: usize,
    pub num_blocks: usize,
}

#[derive(Debug)]
struct VariableSlot {
    variable: DesignVariable,
    ref_count: usize,
}

/// Read view of one error term together with its row offset.
#[derive(Clone, Copy)]
pub struct ErrorTermRef<'a> {
    term: &'a dyn ErrorTerm,
    row_base: Option<usize>,
}

impl<'a> ErrorTermRef<'a> {
    pub fn term(&self) -> &'a dyn ErrorTerm {
        self.term
    }

    pub fn dimension(&self) -> usize {
        self.term.dimension()
    }

    pub fn design_variables(&self) -> &'a [VariableId] {
        self.term.design_variables()
    }

    /// First row of this term in the stacked residual, once laid out.
    pub fn row_base(&self) -> Option<usize> {
        self.row_base
    }
}

/// Pool of all batches currently in the problem.
///
/// Design variables are stored once and reference-counted by the batches
/// declaring them. Columns follow `groups_ordering`; inside a group,
/// variables are ordered by id.
#[derive(Debug, Default)]
pub struct IncrementalProblem {
    batches: Vec<Batch>,
    variables: BTreeMap<VariableId, VariableSlot>,
    groups_ordering: Vec<GroupId>,
    column_order: Vec<VariableId>,
    row_bases: Vec<usize>,
    saved: Option<VariableValues>,
}

impl IncrementalProblem {
    pub fn new() -> Self {
        Self::default()
    }

    // --- batches ---

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn batch(&self, index: usize) -> Option<&Batch> {
        self.batches.get(index)
    }

    pub fn batch_index(&self, id: BatchId) -> Option<usize> {
        self.batches.iter().position(|b| b.id() == id)
    }

    pub fn contains_batch(&self, id: BatchId) -> bool {
        self.batch_index(id).is_some()
    }

    /// Checks that `batch` can be added without touching the problem.
    pub fn validate_batch(&self, batch: &Batch) -> Result<()> {
        if self.contains_batch(batch.id()) {
            return Err(EstimatorError::BatchAlreadyPresent(batch.id()));
        }
        for dv in batch.design_variables() {
            if let Some(slot) = self.variables.get(&dv.id()) {
                if let Some(reason) = slot.variable.conflict_with(dv) {
                    return Err(EstimatorError::VariableMismatch { id: dv.id(), reason });
                }
            }
        }
        Ok(())
    }

    /// Inserts a batch. New groups are appended to the groups ordering.
    pub fn add(&mut self, batch: Batch) -> Result<()> {
        self.insert(self.batches.len(), batch)
    }

    /// Inserts a batch at `index`, shifting the batches after it.
    ///
    /// Row order follows batch order, so re-inserting a removed batch at its
    /// old index reproduces the old stacked system.
    pub fn insert(&mut self, index: usize, batch: Batch) -> Result<()> {
        if index > self.batches.len() {
            return Err(EstimatorError::NotFound(format!(
                "batch index {index} out of {}",
                self.batches.len()
            )));
        }
        self.validate_batch(&batch)?;
        for dv in batch.design_variables() {
            match self.variables.entry(dv.id()) {
                Entry::Occupied(mut slot) => slot.get_mut().ref_count += 1,
                Entry::Vacant(slot) => {
                    if !self.groups_ordering.contains(&dv.group()) {
                        self.groups_ordering.push(dv.group());
                    }
                    let mut variable = dv.clone();
                    variable.set_block_index(None);
                    variable.set_column_base(None);
                    slot.insert(VariableSlot {
                        variable,
                        ref_count: 1,
                    });
                }
            }
        }
        self.batches.insert(index, batch);
        self.refresh_column_order();
        Ok(())
    }

    /// Removes the batch at `index` and hands it back.
    ///
    /// The returned batch carries the latest values of the variables it
    /// declared. Variables no other batch references leave the problem, and
    /// so do groups left without variables.
    pub fn remove(&mut self, index: usize) -> Result<Batch> {
        if index >= self.batches.len() {
            return Err(EstimatorError::NotFound(format!(
                "batch index {index} out of {}",
                self.batches.len()
            )));
        }
        let mut batch = self.batches.remove(index);
        for dv in batch.design_variables_mut() {
            let orphaned = match self.variables.get_mut(&dv.id()) {
                Some(slot) => {
                    dv.set_value(slot.variable.value());
                    slot.ref_count -= 1;
                    slot.ref_count == 0
                }
                None => false,
            };
            if orphaned {
                self.variables.remove(&dv.id());
            }
        }
        self.groups_ordering
            .retain(|g| self.variables.values().any(|s| s.variable.group() == *g));
        self.refresh_column_order();
        Ok(batch)
    }

    pub fn remove_by_id(&mut self, id: BatchId) -> Result<Batch> {
        let index = self
            .batch_index(id)
            .ok_or_else(|| EstimatorError::NotFound(id.to_string()))?;
        self.remove(index)
    }

    // --- groups ---

    pub fn contains_group(&self, group: GroupId) -> bool {
        self.groups_ordering.contains(&group)
    }

    /// Whether `group` still has a variable once the batch at `index` is gone.
    pub fn retains_group_without(&self, index: usize, group: GroupId) -> bool {
        let Some(batch) = self.batches.get(index) else {
            return self.contains_group(group);
        };
        self.variables
            .values()
            .filter(|slot| slot.variable.group() == group)
            .any(|slot| {
                let own = usize::from(batch.design_variable(slot.variable.id()).is_some());
                slot.ref_count > own
            })
    }

    /// Sum of the minimal dimensions of the active variables in `group`.
    pub fn group_dim(&self, group: GroupId) -> usize {
        self.variables
            .values()
            .map(|slot| &slot.variable)
            .filter(|dv| dv.group() == group && dv.is_active())
            .map(DesignVariable::minimal_dimensions)
            .sum()
    }

    pub fn groups_ordering(&self) -> &[GroupId] {
        &self.groups_ordering
    }

    /// Replaces the groups ordering; `ordering` must permute the present groups.
    pub fn set_groups_ordering(&mut self, ordering: Vec<GroupId>) -> Result<()> {
        let is_permutation = ordering.len() == self.groups_ordering.len()
            && self.groups_ordering.iter().all(|g| ordering.contains(g))
            && ordering
                .iter()
                .enumerate()
                .all(|(i, g)| !ordering[..i].contains(g));
        if !is_permutation {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "groups ordering {ordering:?} is not a permutation of {:?}",
                self.groups_ordering
            )));
        }
        self.groups_ordering = ordering;
        self.refresh_column_order();
        Ok(())
    }

    // --- design variables ---

    pub fn num_design_variables(&self) -> usize {
        self.column_order.len()
    }

    /// The i-th design variable in column order (inactive ones included).
    pub fn design_variable(&self, index: usize) -> Option<&DesignVariable> {
        let id = self.column_order.get(index)?;
        self.variables.get(id).map(|slot| &slot.variable)
    }

    pub fn design_variable_mut(&mut self, index: usize) -> Option<&mut DesignVariable> {
        let id = self.column_order.get(index)?;
        self.variables.get_mut(id).map(|slot| &mut slot.variable)
    }

    pub fn design_variable_by_id(&self, id: VariableId) -> Option<&DesignVariable> {
        self.variables.get(&id).map(|slot| &slot.variable)
    }

    pub fn design_variable_values(&self) -> VariableValues {
        self.variables
            .iter()
            .map(|(id, slot)| (*id, slot.variable.value().to_vec()))
            .collect()
    }

    /// Overwrites the values of the listed variables still in the problem.
    pub fn set_design_variable_values(&mut self, values: &VariableValues) {
        for (id, value) in values {
            if let Some(slot) = self.variables.get_mut(id) {
                slot.variable.set_value(value);
            }
        }
    }

    /// Deep-copies all current values into the save slot.
    pub fn save_design_variables(&mut self) {
        self.saved = Some(self.design_variable_values());
    }

    /// Restores the values captured by the last save and empties the slot.
    pub fn restore_design_variables(&mut self) -> Result<()> {
        let saved = self
            .saved
            .take()
            .ok_or(EstimatorError::NoSavedDesignVariables)?;
        self.set_design_variable_values(&saved);
        Ok(())
    }

    pub fn has_saved_design_variables(&self) -> bool {
        self.saved.is_some()
    }

    pub fn discard_saved_design_variables(&mut self) {
        self.saved = None;
    }

    // --- error terms ---

    pub fn num_error_terms(&self) -> usize {
        self.batches.iter().map(Batch::num_error_terms).sum()
    }

    pub fn error_term(&self, index: usize) -> Option<ErrorTermRef<'_>> {
        let term = self.error_terms().nth(index)?;
        Some(ErrorTermRef {
            term,
            row_base: self.row_bases.get(index).copied(),
        })
    }

    fn error_terms(&self) -> impl Iterator<Item = &dyn ErrorTerm> {
        self.batches.iter().flat_map(|b| b.error_terms())
    }

    // --- linear system ---

    /// Assigns block indices, column bases and row bases.
    ///
    /// Must be called after any structural change before `linearize`.
    pub fn assign_system_layout(&mut self) -> SystemLayout {
        let mut num_blocks = 0;
        let mut column_base = 0;
        for id in &self.column_order {
            let Some(slot) = self.variables.get_mut(id) else {
                continue;
            };
            let dv = &mut slot.variable;
            if dv.is_active() {
                dv.set_block_index(Some(num_blocks));
                dv.set_column_base(Some(column_base));
                num_blocks += 1;
                column_base += dv.minimal_dimensions();
            } else {
                dv.set_block_index(None);
                dv.set_column_base(None);
            }
        }

        let mut row_bases = Vec::with_capacity(self.num_error_terms());
        let mut num_rows = 0;
        for term in self.error_terms() {
            row_bases.push(num_rows);
            num_rows += term.dimension();
        }
        self.row_bases = row_bases;

        SystemLayout {
            num_columns: column_base,
            num_rows,
            num_blocks,
        }
    }

    /// 0.5 * ||r||^2 over all error terms.
    pub fn evaluate_cost(&self) -> f64 {
        let mut residual = Vec::new();
        let mut cost = 0.0;
        for term in self.error_terms() {
            let Some(values) = self.term_values(term) else {
                continue;
            };
            residual.clear();
            residual.resize(term.dimension(), 0.0);
            term.evaluate(&values, &mut residual);
            cost += 0.5 * residual.iter().map(|v| v * v).sum::<f64>();
        }
        cost
    }

    /// Fills the stacked Jacobian and residual at the current values.
    ///
    /// `jacobian` and `residual` must match the last `assign_system_layout`.
    pub fn linearize(&self, jacobian: &mut DMatrix<f64>, residual: &mut DVector<f64>) {
        debug_assert_eq!(self.row_bases.len(), self.num_error_terms());
        jacobian.fill(0.0);
        residual.fill(0.0);

        let mut r = Vec::new();
        let mut block = Vec::new();
        for (term, &row_base) in self.error_terms().zip(&self.row_bases) {
            let Some(values) = self.term_values(term) else {
                continue;
            };
            let dim = term.dimension();
            r.clear();
            r.resize(dim, 0.0);
            term.evaluate(&values, &mut r);
            for (i, ri) in r.iter().enumerate() {
                residual[row_base + i] = *ri;
            }

            for (k, id) in term.design_variables().iter().enumerate() {
                let Some(dv) = self.variables.get(id).map(|slot| &slot.variable) else {
                    continue;
                };
                // inactive variables contribute no columns
                let Some(column_base) = dv.column_base() else {
                    continue;
                };
                let cols = dv.minimal_dimensions();
                block.clear();
                block.resize(dim * cols, 0.0);
                term.jacobian(&values, k, &mut block);
                for i in 0..dim {
                    for c in 0..cols {
                        jacobian[(row_base + i, column_base + c)] += block[i * cols + c];
                    }
                }
            }
        }
    }

    /// x <- Retr_x(dx) for every active variable, dx in column order.
    pub fn apply_update(&mut self, dx: &DVector<f64>) {
        let mut tmp = Vec::new();
        for id in &self.column_order {
            let Some(slot) = self.variables.get_mut(id) else {
                continue;
            };
            let dv = &mut slot.variable;
            if let Some(column_base) = dv.column_base() {
                let cols = dv.minimal_dimensions();
                dv.apply_update(&dx.as_slice()[column_base..column_base + cols], &mut tmp);
            }
        }
    }

    fn term_values(&self, term: &dyn ErrorTerm) -> Option<Vec<&[f64]>> {
        term.design_variables()
            .iter()
            .map(|id| self.variables.get(id).map(|slot| slot.variable.value()))
            .collect()
    }

    fn refresh_column_order(&mut self) {
        let mut order = Vec::with_capacity(self.variables.len());
        for group in &self.groups_ordering {
            order.extend(
                self.variables
                    .iter()
                    .filter(|(_, slot)| slot.variable.group() == *group)
                    .map(|(id, _)| *id),
            );
        }
        self.column_order = order;
        // the layout no longer matches the structure
        self.row_bases.clear();
        for slot in self.variables.values_mut() {
            slot.variable.set_block_index(None);
            slot.variable.set_column_base(None);
        }
    }
}
