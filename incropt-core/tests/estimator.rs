mod common;

use approx::assert_relative_eq;
use common::*;
use incropt::{
    Batch, DesignVariable, ErrorTerm, EstimatorConfig, EstimatorError, GroupId,
    IncrementalEstimator, MarginalizationError, MarginalizerOptions, VariableId,
};

fn estimator() -> IncrementalEstimator {
    IncrementalEstimator::new(THETA_GROUP, EstimatorConfig::default()).unwrap()
}

fn scripted(script: &[(f64, usize)]) -> IncrementalEstimator<ScriptedMarginalizer> {
    IncrementalEstimator::with_marginalizer(
        THETA_GROUP,
        EstimatorConfig::default(),
        ScriptedMarginalizer::new(3, script),
    )
    .unwrap()
}

fn quadratic_batch() -> Batch {
    poly_batch(3, &[(0.0, 1.0), (1.0, 2.0), (2.0, 5.0)], 1.0)
}

#[test]
fn bootstrap_batch_is_accepted_with_zero_gain() {
    let mut estimator = estimator();
    let result = estimator.add_batch(line_batch(&[0.0, 1.0, 2.0], 1.0), false).unwrap();

    assert!(result.batch_accepted);
    assert!(result.solution_valid);
    assert!(result.is_informative_batch);
    assert_eq!(result.information_gain, 0.0);
    assert_eq!(result.rank_theta, 2);
    assert_eq!(result.rank_theta_deficiency, 0);
    assert!(result.cost_final < 1e-16);
    assert_eq!(estimator.num_batches(), 1);

    assert_eq!(estimator.spectral().snapshot(), Some(&result.snapshot));
    let theta = estimator.problem().design_variable_by_id(THETA).unwrap();
    assert_relative_eq!(theta.value()[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(theta.value()[1], 2.0, epsilon = 1e-9);
}

#[test]
fn repeated_batch_doubles_the_information() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    let before = estimator.spectral().log2_singular_value_sum();

    // J^T J doubles, so det grows four-fold and sum log2 s grows by one
    let result = estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    assert!(result.batch_accepted);
    assert!(result.is_informative_batch);
    assert_relative_eq!(result.information_gain, 0.5, epsilon = 1e-9);
    assert_relative_eq!(
        estimator.spectral().log2_singular_value_sum() - before,
        1.0,
        epsilon = 1e-9
    );
    assert_eq!(estimator.num_batches(), 2);
}

#[test]
fn weak_batch_is_rejected_and_leaves_the_estimator_alone() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    let spectral = estimator.spectral().clone();
    let values = estimator.problem().design_variable_values();

    let result = estimator.add_batch(line_batch(&[0.0], 0.1), false).unwrap();
    assert!(!result.batch_accepted);
    assert!(!result.is_informative_batch);
    assert!(result.information_gain > 0.0);
    assert!(result.information_gain < 0.2);
    assert_eq!(estimator.num_batches(), 1);
    assert_eq!(estimator.spectral(), &spectral);
    assert_eq!(estimator.problem().design_variable_values(), values);
}

#[test]
fn small_scripted_gain_is_not_informative() {
    let mut estimator = scripted(&[(0.0, 3), (0.1, 3)]);
    let first = estimator.add_batch(quadratic_batch(), false).unwrap();
    assert!(first.batch_accepted);
    assert_eq!(first.information_gain, 0.0);

    let second = estimator.add_batch(quadratic_batch(), false).unwrap();
    assert_relative_eq!(second.information_gain, 0.05, epsilon = 1e-12);
    assert!(!second.is_informative_batch);
    assert!(!second.batch_accepted);
    assert_eq!(estimator.num_batches(), 1);
    assert_eq!(estimator.spectral().log2_singular_value_sum(), 0.0);

    // the group occupies the last three of three columns
    assert_eq!(estimator.marginalizer().calls, vec![(3, 0), (3, 0)]);
}

#[test]
fn forced_batch_is_accepted_even_when_not_informative() {
    let mut estimator = scripted(&[(0.0, 3), (0.1, 3)]);
    estimator.add_batch(quadratic_batch(), false).unwrap();

    let result = estimator.add_batch(quadratic_batch(), true).unwrap();
    assert!(result.batch_accepted);
    assert!(!result.is_informative_batch);
    assert_eq!(estimator.num_batches(), 2);
    assert_eq!(estimator.spectral().log2_singular_value_sum(), 0.1);
    assert_eq!(estimator.spectral().information_gain(), result.information_gain);
}

#[test]
fn rank_increase_is_informative_despite_negative_gain() {
    let mut estimator = scripted(&[(5.0, 2), (4.0, 3)]);
    estimator.add_batch(quadratic_batch(), false).unwrap();

    let result = estimator.add_batch(quadratic_batch(), false).unwrap();
    assert_relative_eq!(result.information_gain, -0.5, epsilon = 1e-12);
    assert!(result.is_informative_batch);
    assert!(result.batch_accepted);
    assert_eq!(estimator.spectral().rank_theta(), 3);
    assert_eq!(estimator.spectral().rank_theta_deficiency(), 0);
}

#[test]
fn rank_decrease_does_not_veto_a_large_gain() {
    let mut estimator = scripted(&[(0.0, 3), (2.0, 2)]);
    estimator.add_batch(quadratic_batch(), false).unwrap();

    let result = estimator.add_batch(quadratic_batch(), false).unwrap();
    assert_relative_eq!(result.information_gain, 1.0, epsilon = 1e-12);
    assert!(result.batch_accepted);
    assert_eq!(estimator.spectral().rank_theta(), 2);
}

#[test]
fn real_rank_increase_with_a_weak_batch() {
    let mut estimator = estimator();
    // a single point only observes a + b
    let first = estimator.add_batch(line_batch(&[1.0], 1.0), false).unwrap();
    assert_eq!(first.rank_theta, 1);
    assert_eq!(first.rank_theta_deficiency, 1);

    let second = estimator.add_batch(line_batch(&[0.0], 0.01), false).unwrap();
    assert!(second.information_gain < 0.0);
    assert_eq!(second.rank_theta, 2);
    assert!(second.batch_accepted);
}

#[test]
fn decisions_are_single_use() {
    let mut estimator = estimator();
    let mut decision = estimator.try_batch(line_batch(&[0.0, 1.0], 1.0), true).unwrap();
    assert!(decision.is_pending());
    let accepted = decision.accept().unwrap();
    assert!(accepted.batch_accepted);
    assert!(!decision.is_pending());
    assert!(decision.result().batch_accepted);

    assert!(matches!(
        decision.accept(),
        Err(EstimatorError::DecisionConsumed)
    ));
    assert!(matches!(
        decision.reject(true),
        Err(EstimatorError::DecisionConsumed)
    ));
    drop(decision);
    assert_eq!(estimator.num_batches(), 1);
}

#[test]
fn restoring_requires_preserved_variables() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();

    let mut decision = estimator.try_batch(line_batch(&[3.0], 1.0), false).unwrap();
    assert!(matches!(
        decision.reject(true),
        Err(EstimatorError::NoSavedDesignVariables)
    ));
    assert!(decision.is_pending());
    let batch = decision.reject(false).unwrap();
    assert_eq!(batch.num_error_terms(), 1);
    drop(decision);
    assert_eq!(estimator.num_batches(), 1);
}

#[test]
fn rejected_batch_comes_back_with_its_values() {
    let mut estimator = estimator();
    let mut decision = estimator.try_batch(line_batch(&[0.0, 1.0], 1.0), true).unwrap();
    let batch = decision.reject(true).unwrap();

    let theta = batch.design_variable(THETA).unwrap();
    assert_relative_eq!(theta.value()[1], 2.0, epsilon = 1e-9);
    drop(decision);
    assert_eq!(estimator.num_batches(), 0);
    assert!(estimator.problem().groups_ordering().is_empty());
    assert!(estimator.spectral().snapshot().is_none());

    // a returned batch can be tried again
    let result = estimator.add_batch(batch, false).unwrap();
    assert!(result.batch_accepted);
}

#[test]
fn dropped_decision_rolls_back() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    let values = estimator.problem().design_variable_values();
    let spectral = estimator.spectral().clone();

    {
        let decision = estimator
            .try_batch(poly_batch(2, &[(0.0, 10.0)], 1.0), true)
            .unwrap();
        assert!(decision.is_pending());
    }

    assert_eq!(estimator.num_batches(), 1);
    assert_eq!(estimator.problem().design_variable_values(), values);
    assert_eq!(estimator.spectral(), &spectral);
}

#[test]
fn batch_without_the_marginalized_group_is_a_configuration_error() {
    let mut estimator = estimator();
    let err = estimator
        .try_batch(prior_batch(VariableId(7), GroupId(3), 1.0), true)
        .unwrap_err();
    assert!(matches!(err, EstimatorError::InvalidConfiguration(_)));
    assert_eq!(estimator.num_batches(), 0);

    // once the group is present, batches without it are fine
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), true).unwrap();
    let result = estimator
        .add_batch(prior_batch(VariableId(7), GroupId(3), 1.0), true)
        .unwrap();
    assert!(result.batch_accepted);
    assert_eq!(result.rank_psi, 1);
    assert_eq!(estimator.problem().groups_ordering(), &[GroupId(3), THETA_GROUP]);
}

#[test]
fn conflicting_redeclaration_is_rejected_before_mutation() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    let err = estimator
        .try_batch(poly_batch(3, &[(0.0, 1.0)], 1.0), true)
        .unwrap_err();
    assert!(matches!(err, EstimatorError::VariableMismatch { .. }));
    assert_eq!(estimator.num_batches(), 1);
}

#[test]
fn local_offsets_hide_the_intercept() {
    let config = EstimatorConfig {
        marginalizer: MarginalizerOptions {
            svd_tolerance: Some(1e-9),
            qr_tolerance: None,
        },
        ..EstimatorConfig::default()
    };
    let mut estimator = IncrementalEstimator::new(THETA_GROUP, config).unwrap();
    let result = estimator
        .add_batch(offset_line_batch(VariableId(10), &[0.0, 1.0, 2.0]), false)
        .unwrap();

    assert_eq!(result.rank_psi, 1);
    assert_eq!(result.rank_theta, 1);
    assert_eq!(result.rank_theta_deficiency, 1);
    let null = estimator.spectral().null_space_basis(false);
    assert_eq!(null.shape(), (2, 1));
    assert_relative_eq!(null[(0, 0)].abs(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(null[(1, 0)], 0.0, epsilon = 1e-9);
    // only the slope is observable: A = [0, x - mean(x)]
    assert_relative_eq!(
        estimator.spectral().singular_values(false)[0],
        2.0_f64.sqrt(),
        epsilon = 1e-9
    );
    assert_relative_eq!(estimator.spectral().precision()[(1, 1)], 2.0, epsilon = 1e-9);
}

/// atan(x): Gauss-Newton overshoots for |x| beyond ~1.39.
struct Atan {
    ids: [VariableId; 1],
}

impl ErrorTerm for Atan {
    fn dimension(&self) -> usize {
        1
    }

    fn design_variables(&self) -> &[VariableId] {
        &self.ids
    }

    fn evaluate(&self, values: &[&[f64]], residual: &mut [f64]) {
        residual[0] = values[0][0].atan();
    }

    fn jacobian(&self, values: &[&[f64]], _wrt: usize, out: &mut [f64]) {
        let x = values[0][0];
        out[0] = 1.0 / (1.0 + x * x);
    }
}

fn diverging_batch() -> Batch {
    let mut batch = Batch::new();
    batch
        .add_design_variable(DesignVariable::euclidean(THETA, THETA_GROUP, vec![2.0]))
        .unwrap();
    batch.add_error_term(Atan { ids: [THETA] }).unwrap();
    batch
}

fn validity_config(max_iteration_hit_is_still_valid: bool) -> EstimatorConfig {
    let mut config = EstimatorConfig::default();
    config.estimator.check_validity = true;
    config.estimator.max_iteration_hit_is_still_valid = max_iteration_hit_is_still_valid;
    config.optimizer.max_iterations = 1;
    config
}

#[test]
fn capped_solve_with_rising_cost_is_invalid() {
    let mut estimator = IncrementalEstimator::new(THETA_GROUP, validity_config(false)).unwrap();
    let result = estimator.add_batch(diverging_batch(), false).unwrap();

    assert_eq!(result.num_iterations, 1);
    assert!(result.cost_final > result.cost_start);
    assert!(!result.solution_valid);
    assert!(!result.is_informative_batch);
    assert!(!result.batch_accepted);
    assert_eq!(estimator.num_batches(), 0);
}

#[test]
fn cap_hit_can_be_declared_valid() {
    let mut estimator = IncrementalEstimator::new(THETA_GROUP, validity_config(true)).unwrap();
    let result = estimator.add_batch(diverging_batch(), false).unwrap();
    assert!(result.solution_valid);
    assert!(result.batch_accepted);

    let mut unchecked = validity_config(false);
    unchecked.estimator.check_validity = false;
    let mut estimator = IncrementalEstimator::new(THETA_GROUP, unchecked).unwrap();
    assert!(estimator.add_batch(diverging_batch(), false).unwrap().solution_valid);
}

#[test]
fn reoptimize_refreshes_without_accepting() {
    let mut estimator = estimator();
    assert!(matches!(
        estimator.reoptimize(),
        Err(EstimatorError::InvalidConfiguration(_))
    ));

    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();
    let committed = estimator.spectral().log2_singular_value_sum();
    let result = estimator.reoptimize().unwrap();
    assert!(!result.batch_accepted);
    assert_eq!(result.information_gain, 0.0);
    assert_eq!(estimator.spectral().information_gain(), 0.0);
    assert_relative_eq!(result.snapshot.log2_singular_value_sum(), committed, epsilon = 1e-12);
    assert_eq!(estimator.num_batches(), 1);
}

/// atan(x) whose Jacobian is only defined on |x| <= 10.
struct BoundedAtan {
    ids: [VariableId; 1],
}

impl ErrorTerm for BoundedAtan {
    fn dimension(&self) -> usize {
        1
    }

    fn design_variables(&self) -> &[VariableId] {
        &self.ids
    }

    fn evaluate(&self, values: &[&[f64]], residual: &mut [f64]) {
        residual[0] = values[0][0].atan();
    }

    fn jacobian(&self, values: &[&[f64]], _wrt: usize, out: &mut [f64]) {
        let x = values[0][0];
        out[0] = if x.abs() > 10.0 {
            f64::NAN
        } else {
            1.0 / (1.0 + x * x)
        };
    }
}

#[test]
fn failed_reoptimization_keeps_the_committed_state() {
    let mut config = EstimatorConfig::default();
    config.optimizer.max_iterations = 1;
    let mut estimator = IncrementalEstimator::new(THETA_GROUP, config).unwrap();
    let mut batch = Batch::new();
    batch
        .add_design_variable(DesignVariable::euclidean(THETA, THETA_GROUP, vec![2.0]))
        .unwrap();
    batch.add_error_term(BoundedAtan { ids: [THETA] }).unwrap();
    // one overshooting step: 2 -> -3.54
    estimator.add_batch(batch, true).unwrap();

    let values = estimator.problem().design_variable_values();
    let spectral = estimator.spectral().clone();
    let jacobian_transpose = estimator.jacobian_transpose().clone();
    assert!(values[&THETA][0] < -3.0);

    // the next step leaves the region where the Jacobian is defined
    let err = estimator.reoptimize().unwrap_err();
    assert!(matches!(
        err,
        EstimatorError::Marginalization(MarginalizationError::NonFinite)
    ));
    assert_eq!(estimator.num_batches(), 1);
    assert_eq!(estimator.problem().design_variable_values(), values);
    assert_eq!(estimator.spectral(), &spectral);
    assert_eq!(estimator.jacobian_transpose(), &jacobian_transpose);
}

#[test]
fn rejection_time_covers_the_rollback() {
    let mut estimator = estimator();
    estimator.add_batch(line_batch(&[0.0, 1.0], 1.0), false).unwrap();

    let mut decision = estimator.try_batch(line_batch(&[2.0], 1.0), true).unwrap();
    let tried = decision.result().elapsed;
    decision.reject(true).unwrap();
    assert!(decision.result().elapsed >= tried);
    assert!(!decision.result().batch_accepted);
}

#[test]
fn invalid_options_are_rejected_at_construction() {
    let mut config = EstimatorConfig::default();
    config.estimator.info_gain_delta = f64::NAN;
    assert!(matches!(
        IncrementalEstimator::new(THETA_GROUP, config),
        Err(EstimatorError::InvalidConfiguration(_))
    ));
}
