//! Configuration of the estimator and its collaborators.
//!
//! Every section deserializes with defaults, so a TOML document only needs
//! the values it changes:
//!
//! ```toml
//! [estimator]
//! info_gain_delta = 0.5
//!
//! [optimizer]
//! max_iterations = 50
//! trust_region = { method = "levenberg_marquardt" }
//! ```

use serde::Deserialize;

use crate::algorithms::MarginalizerOptions;
use crate::error::{EstimatorError, Result};
use crate::solvers::{LinearSolverOptions, OptimizerOptions};

/// Admission policy of the estimator.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Minimum information gain for a batch to count as informative.
    pub info_gain_delta: f64,
    /// Mark solutions invalid when the optimizer ran into its iteration cap
    /// without lowering the cost.
    pub check_validity: bool,
    /// Treat hitting the iteration cap as acceptable.
    pub max_iteration_hit_is_still_valid: bool,
    pub verbose: bool,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            info_gain_delta: 0.2,
            check_validity: false,
            max_iteration_hit_is_still_valid: false,
            verbose: false,
        }
    }
}

impl EstimatorOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.info_gain_delta.is_finite() || self.info_gain_delta < 0.0 {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "info_gain_delta must be finite and non-negative, got {}",
                self.info_gain_delta
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub estimator: EstimatorOptions,
    pub optimizer: OptimizerOptions,
    pub linear_solver: LinearSolverOptions,
    pub marginalizer: MarginalizerOptions,
}

impl EstimatorConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.estimator.validate()?;

        let optimizer = &self.optimizer;
        if optimizer.max_iterations == 0 {
            return Err(EstimatorError::InvalidConfiguration(
                "optimizer.max_iterations must be positive".into(),
            ));
        }
        check_non_negative("optimizer.convergence_delta_j", optimizer.convergence_delta_j)?;
        check_non_negative("optimizer.convergence_delta_x", optimizer.convergence_delta_x)?;

        let tolerances = [
            ("linear_solver.qr_tolerance", self.linear_solver.qr_tolerance),
            ("marginalizer.svd_tolerance", self.marginalizer.svd_tolerance),
            ("marginalizer.qr_tolerance", self.marginalizer.qr_tolerance),
        ];
        for (name, value) in tolerances {
            if let Some(value) = value {
                if !value.is_finite() || value <= 0.0 {
                    return Err(EstimatorError::InvalidConfiguration(format!(
                        "{name} must be positive, got {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidConfiguration(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}
