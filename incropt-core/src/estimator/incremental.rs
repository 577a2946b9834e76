use std::fmt;
use std::time::Instant;

use nalgebra::DMatrix;
use tracing::{debug, info, warn};

use crate::algorithms::{Marginalizer, SpectralSnapshot, SvdMarginalizer};
use crate::config::{EstimatorConfig, EstimatorOptions};
use crate::error::{EstimatorError, Result};
use crate::problems::{Batch, BatchId, GroupId, IncrementalProblem, VariableValues};
use crate::solvers::{Optimizer, SolutionReturnValue};

use super::decision::Trial;
use super::{BatchResult, PendingDecision, SpectralState};

/// A batch taken out by [`IncrementalEstimator::remove_batch`] together with
/// the result of re-solving without it.
#[derive(Debug)]
pub struct RemovedBatch {
    pub batch: Batch,
    pub result: BatchResult,
}

/// Incremental estimator of one marginalized group of design variables.
///
/// Batches enter through [`try_batch`](Self::try_batch), which solves the
/// problem with the batch included and scores how much it sharpens the
/// marginal spectrum of the group. The caller then accepts or rejects the
/// returned [`PendingDecision`]; a rejection leaves the estimator as it was
/// before the trial.
///
/// ```no_run
/// use incropt::{EstimatorConfig, GroupId, IncrementalEstimator};
///
/// let mut estimator = IncrementalEstimator::new(GroupId(0), EstimatorConfig::default())?;
/// # let batch = incropt::Batch::new();
/// let result = estimator.add_batch(batch, false)?;
/// println!("accepted: {}", result.batch_accepted);
/// # Ok::<(), incropt::EstimatorError>(())
/// ```
pub struct IncrementalEstimator<M: Marginalizer = SvdMarginalizer> {
    marg_group: GroupId,
    options: EstimatorOptions,
    problem: IncrementalProblem,
    optimizer: Optimizer,
    marginalizer: M,
    spectral: SpectralState,
}

impl<M: Marginalizer> fmt::Debug for IncrementalEstimator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalEstimator")
            .field("marg_group", &self.marg_group)
            .field("options", &self.options)
            .field("problem", &self.problem)
            .field("optimizer", &self.optimizer)
            .field("spectral", &self.spectral)
            .finish_non_exhaustive()
    }
}

impl IncrementalEstimator<SvdMarginalizer> {
    pub fn new(marg_group: GroupId, config: EstimatorConfig) -> Result<Self> {
        Self::with_marginalizer(
            marg_group,
            config,
            SvdMarginalizer::new(config.marginalizer),
        )
    }
}

impl<M: Marginalizer> IncrementalEstimator<M> {
    pub fn with_marginalizer(
        marg_group: GroupId,
        config: EstimatorConfig,
        marginalizer: M,
    ) -> Result<Self> {
        config.validate()?;
        let optimizer = Optimizer::new(config.optimizer, config.linear_solver);
        Self::with_components(marg_group, config.estimator, optimizer, marginalizer)
    }

    /// Assembles an estimator from a ready optimizer, e.g. one carrying a
    /// custom linear solver.
    pub fn with_components(
        marg_group: GroupId,
        options: EstimatorOptions,
        optimizer: Optimizer,
        marginalizer: M,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            marg_group,
            options,
            problem: IncrementalProblem::new(),
            optimizer,
            marginalizer,
            spectral: SpectralState::default(),
        })
    }

    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    pub fn marg_group_id(&self) -> GroupId {
        self.marg_group
    }

    pub fn problem(&self) -> &IncrementalProblem {
        &self.problem
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn marginalizer(&self) -> &M {
        &self.marginalizer
    }

    pub fn spectral(&self) -> &SpectralState {
        &self.spectral
    }

    pub fn num_batches(&self) -> usize {
        self.problem.num_batches()
    }

    /// Jacobian transpose at the last linearization point.
    pub fn jacobian_transpose(&self) -> &DMatrix<f64> {
        self.optimizer.linear_solver().jacobian_transpose()
    }

    /// Tentatively adds `batch`, solves and scores it.
    ///
    /// All identity and configuration checks run before the problem is
    /// touched. With `preserve_variables` the current values are saved so a
    /// later `reject(true)` can restore them exactly.
    pub fn try_batch(
        &mut self,
        batch: Batch,
        preserve_variables: bool,
    ) -> Result<PendingDecision<'_, M>> {
        self.problem.validate_batch(&batch)?;
        if !self.problem.contains_group(self.marg_group) && !batch.contains_group(self.marg_group)
        {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "neither the problem nor batch {} contains the marginalized {}",
                batch.id(),
                self.marg_group
            )));
        }

        let trial = Trial {
            batch_id: batch.id(),
            groups_ordering: self.problem.groups_ordering().to_vec(),
            preserved: preserve_variables,
            started: Instant::now(),
        };

        self.problem.add(batch)?;
        if let Err(err) = self.move_marg_group_to_tail() {
            self.abort_trial(&trial, false);
            return Err(err);
        }
        if preserve_variables {
            self.problem.save_design_variables();
        } else {
            self.problem.discard_saved_design_variables();
        }

        let solution = self.solve();
        let snapshot = match self.marginalize() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.abort_trial(&trial, trial.preserved);
                return Err(err);
            }
        };

        let solution_valid = self.solution_valid(&solution);
        let (information_gain, is_informative_batch) = self.score(&snapshot, solution_valid);
        let mut result = self.result_from(&solution, snapshot, trial.started);
        result.solution_valid = solution_valid;
        result.information_gain = information_gain;
        result.is_informative_batch = is_informative_batch;

        if self.options.verbose {
            info!(
                batch = %trial.batch_id,
                iterations = result.num_iterations,
                cost_start = result.cost_start,
                cost_final = result.cost_final,
                information_gain,
                solution_valid,
                is_informative_batch,
                "batch tried"
            );
        } else {
            debug!(
                batch = %trial.batch_id,
                iterations = result.num_iterations,
                information_gain,
                solution_valid,
                is_informative_batch,
                "batch tried"
            );
        }

        Ok(PendingDecision::new(self, result, trial))
    }

    /// `try_batch` followed by `accept` when forced or informative, and by
    /// `reject(true)` otherwise.
    pub fn add_batch(&mut self, batch: Batch, force: bool) -> Result<BatchResult> {
        let mut decision = self.try_batch(batch, !force)?;
        if force || decision.is_informative_batch() {
            decision.accept()
        } else {
            decision.reject(true)?;
            Ok(decision.result().clone())
        }
    }

    /// Removes a committed batch and re-solves without it.
    ///
    /// The reported information gain is the signed change of the log2
    /// singular value sum. If the re-solve cannot be marginalized, the batch
    /// goes back in at its index, values and ordering are restored and the
    /// spectral state is left untouched.
    pub fn remove_batch(&mut self, index: usize) -> Result<RemovedBatch> {
        let num_batches = self.problem.num_batches();
        if index >= num_batches {
            return Err(EstimatorError::NotFound(format!(
                "batch index {index} out of {num_batches}"
            )));
        }
        if num_batches > 1 && !self.problem.retains_group_without(index, self.marg_group) {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "removing batch {index} would leave the problem without the marginalized {}",
                self.marg_group
            )));
        }

        let start = Instant::now();
        let ordering = self.problem.groups_ordering().to_vec();
        let values = self.problem.design_variable_values();
        let batch = self.problem.remove(index)?;
        if self.problem.num_batches() == 0 {
            self.restore_linear_solver();
            self.spectral.reset();
            debug!(batch = %batch.id(), "last batch removed, estimator back to bootstrap");
            return Ok(RemovedBatch {
                batch,
                result: BatchResult {
                    batch_accepted: true,
                    solution_valid: true,
                    elapsed: start.elapsed(),
                    ..BatchResult::default()
                },
            });
        }

        let (solution, snapshot) = match self.resolve() {
            Ok(resolved) => resolved,
            Err(err) => {
                let id = batch.id();
                if let Err(undo) = self.problem.insert(index, batch) {
                    warn!(batch = %id, err = %undo, "failed to put removed batch back");
                }
                self.restore_state(&values, ordering);
                debug!(batch = %id, %err, "batch removal rolled back");
                return Err(err);
            }
        };
        let information_gain =
            snapshot.log2_singular_value_sum() - self.spectral.log2_singular_value_sum();
        let mut result = self.result_from(&solution, snapshot, start);
        result.batch_accepted = true;
        result.solution_valid = self.solution_valid(&solution);
        result.information_gain = information_gain;
        self.spectral.commit(&result);

        debug!(batch = %batch.id(), information_gain, "batch removed");
        Ok(RemovedBatch { batch, result })
    }

    pub fn remove_batch_by_id(&mut self, id: BatchId) -> Result<RemovedBatch> {
        let index = self
            .problem
            .batch_index(id)
            .ok_or_else(|| EstimatorError::NotFound(id.to_string()))?;
        self.remove_batch(index)
    }

    /// Re-solves and re-marginalizes the committed batches.
    pub fn reoptimize(&mut self) -> Result<BatchResult> {
        if !self.problem.contains_group(self.marg_group) {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "the problem does not contain the marginalized {}",
                self.marg_group
            )));
        }
        let start = Instant::now();
        let ordering = self.problem.groups_ordering().to_vec();
        let values = self.problem.design_variable_values();
        let (solution, snapshot) = match self.resolve() {
            Ok(resolved) => resolved,
            Err(err) => {
                self.restore_state(&values, ordering);
                debug!(%err, "reoptimization rolled back");
                return Err(err);
            }
        };
        let mut result = self.result_from(&solution, snapshot, start);
        result.solution_valid = self.solution_valid(&solution);
        self.spectral.commit(&result);
        debug!(
            iterations = result.num_iterations,
            cost_final = result.cost_final,
            "problem reoptimized"
        );
        Ok(result)
    }

    pub(crate) fn commit_trial(&mut self, result: &BatchResult) {
        self.spectral.commit(result);
        self.problem.discard_saved_design_variables();
    }

    /// Undoes a trial: batch out, values and ordering back, solver rebuilt.
    pub(crate) fn rollback_trial(&mut self, trial: &Trial, restore: bool) -> Result<Batch> {
        let batch = self.problem.remove_by_id(trial.batch_id)?;
        if restore {
            self.problem.restore_design_variables()?;
        } else {
            self.problem.discard_saved_design_variables();
        }
        self.problem.set_groups_ordering(trial.groups_ordering.clone())?;
        self.restore_linear_solver();
        Ok(batch)
    }

    fn abort_trial(&mut self, trial: &Trial, restore: bool) {
        if let Err(err) = self.rollback_trial(trial, restore) {
            warn!(batch = %trial.batch_id, %err, "rollback of failed trial failed");
        }
    }

    /// Puts committed values and ordering back and relinearizes there.
    fn restore_state(&mut self, values: &VariableValues, ordering: Vec<GroupId>) {
        self.problem.set_design_variable_values(values);
        if let Err(err) = self.problem.set_groups_ordering(ordering) {
            warn!(%err, "failed to restore groups ordering");
        }
        self.restore_linear_solver();
    }

    /// Re-solves the committed pool and marginalizes the result.
    fn resolve(&mut self) -> Result<(SolutionReturnValue, SpectralSnapshot)> {
        self.move_marg_group_to_tail()?;
        let solution = self.solve();
        let snapshot = self.marginalize()?;
        Ok((solution, snapshot))
    }

    fn move_marg_group_to_tail(&mut self) -> Result<()> {
        let mut ordering: Vec<GroupId> = self
            .problem
            .groups_ordering()
            .iter()
            .copied()
            .filter(|g| *g != self.marg_group)
            .collect();
        ordering.push(self.marg_group);
        self.problem.set_groups_ordering(ordering)
    }

    fn solve(&mut self) -> SolutionReturnValue {
        self.optimizer.initialize_linear_solver();
        self.optimizer.initialize_trust_region_policy();
        self.optimizer.optimize(&mut self.problem)
    }

    fn marginalize(&mut self) -> Result<SpectralSnapshot> {
        let jacobian_transpose = self.optimizer.linear_solver().jacobian_transpose();
        let keep_columns = jacobian_transpose
            .nrows()
            .saturating_sub(self.problem.group_dim(self.marg_group));
        Ok(self
            .marginalizer
            .marginalize(jacobian_transpose, keep_columns)?)
    }

    fn restore_linear_solver(&mut self) {
        self.optimizer.initialize_linear_solver();
        self.optimizer.relinearize(&mut self.problem);
    }

    fn solution_valid(&self, solution: &SolutionReturnValue) -> bool {
        if !self.options.check_validity {
            return true;
        }
        let cap_hit = solution.iterations >= self.optimizer.options().max_iterations
            && !self.options.max_iteration_hit_is_still_valid;
        !(cap_hit && solution.cost_final >= solution.cost_start)
    }

    /// Information gain against the committed snapshot and the informative flag.
    fn score(&self, snapshot: &SpectralSnapshot, solution_valid: bool) -> (f64, bool) {
        let Some(current) = self.spectral.snapshot() else {
            return (0.0, solution_valid);
        };
        let gain = 0.5 * (snapshot.log2_singular_value_sum() - current.log2_singular_value_sum());
        let (new_rank, current_rank) = (snapshot.rank_theta(), current.rank_theta());
        if new_rank < current_rank {
            if self.options.verbose {
                warn!(new_rank, current_rank, "column space rank decreased");
            } else {
                debug!(new_rank, current_rank, "column space rank decreased");
            }
        }
        let informative =
            solution_valid && (gain > self.options.info_gain_delta || new_rank > current_rank);
        (gain, informative)
    }

    fn result_from(
        &self,
        solution: &SolutionReturnValue,
        snapshot: SpectralSnapshot,
        start: Instant,
    ) -> BatchResult {
        let linear_solver = self.optimizer.linear_solver();
        BatchResult {
            rank_psi: snapshot.psi_rank,
            rank_psi_deficiency: snapshot.psi_rank_deficiency,
            rank_theta: snapshot.raw.rank,
            rank_theta_deficiency: snapshot.raw.rank_deficiency,
            svd_tolerance: snapshot.raw.svd_tolerance,
            qr_tolerance: snapshot.qr_tolerance,
            snapshot,
            num_iterations: solution.iterations,
            cost_start: solution.cost_start,
            cost_final: solution.cost_final,
            elapsed: start.elapsed(),
            peak_memory_usage: linear_solver.peak_memory_usage(),
            memory_usage: linear_solver.memory_usage(),
            num_flops: linear_solver.num_flops(),
            ..BatchResult::default()
        }
    }
}
