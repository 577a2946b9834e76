use std::fmt;
use std::time::Instant;

use tracing::{debug, error};

use crate::algorithms::{Marginalizer, SvdMarginalizer};
use crate::error::{EstimatorError, Result};
use crate::problems::{Batch, BatchId, GroupId};

use super::{BatchResult, IncrementalEstimator};

/// What a rollback needs to undo one trial.
#[derive(Debug)]
pub(crate) struct Trial {
    pub(crate) batch_id: BatchId,
    pub(crate) groups_ordering: Vec<GroupId>,
    pub(crate) preserved: bool,
    pub(crate) started: Instant,
}

/// A tried batch waiting for `accept` or `reject`.
///
/// The decision borrows the estimator, so nothing else can touch it while the
/// trial is pending. Exactly one of [`accept`](Self::accept) and
/// [`reject`](Self::reject) succeeds; any later call fails with
/// [`EstimatorError::DecisionConsumed`]. Dropping a pending decision rolls
/// the trial back, restoring the variables if they were preserved.
pub struct PendingDecision<'a, M: Marginalizer = SvdMarginalizer> {
    estimator: &'a mut IncrementalEstimator<M>,
    result: BatchResult,
    trial: Option<Trial>,
}

impl<'a, M: Marginalizer> PendingDecision<'a, M> {
    pub(crate) fn new(
        estimator: &'a mut IncrementalEstimator<M>,
        result: BatchResult,
        trial: Trial,
    ) -> Self {
        Self {
            estimator,
            result,
            trial: Some(trial),
        }
    }

    /// Result of the trial; `batch_accepted` turns true once accepted.
    pub fn result(&self) -> &BatchResult {
        &self.result
    }

    pub fn is_pending(&self) -> bool {
        self.trial.is_some()
    }

    pub fn is_informative_batch(&self) -> bool {
        self.result.is_informative_batch
    }

    /// Keeps the batch and makes the trial snapshot the current one.
    pub fn accept(&mut self) -> Result<BatchResult> {
        let trial = self.trial.take().ok_or(EstimatorError::DecisionConsumed)?;
        self.result.batch_accepted = true;
        self.estimator.commit_trial(&self.result);
        debug!(
            batch = %trial.batch_id,
            information_gain = self.result.information_gain,
            "batch accepted"
        );
        Ok(self.result.clone())
    }

    /// Takes the batch back out of the problem and returns it.
    ///
    /// With `restore`, every variable gets back the value it had before the
    /// trial; that requires the trial to have preserved the variables.
    /// `result().elapsed` is re-stamped to include the rollback.
    pub fn reject(&mut self, restore: bool) -> Result<Batch> {
        let preserved = self
            .trial
            .as_ref()
            .ok_or(EstimatorError::DecisionConsumed)?
            .preserved;
        if restore && !preserved {
            return Err(EstimatorError::NoSavedDesignVariables);
        }
        let trial = self.trial.take().ok_or(EstimatorError::DecisionConsumed)?;
        let batch = self.estimator.rollback_trial(&trial, restore)?;
        self.result.elapsed = trial.started.elapsed();
        debug!(batch = %trial.batch_id, restore, "batch rejected");
        Ok(batch)
    }
}

impl<M: Marginalizer> fmt::Debug for PendingDecision<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDecision")
            .field("result", &self.result)
            .field("trial", &self.trial)
            .finish()
    }
}

impl<M: Marginalizer> Drop for PendingDecision<'_, M> {
    fn drop(&mut self) {
        let Some(trial) = self.trial.take() else {
            return;
        };
        error!(
            batch = %trial.batch_id,
            "pending decision dropped without accept or reject, rolling back"
        );
        if let Err(err) = self.estimator.rollback_trial(&trial, trial.preserved) {
            error!(batch = %trial.batch_id, %err, "rollback of abandoned trial failed");
        }
    }
}
