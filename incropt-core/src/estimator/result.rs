use std::time::Duration;

use crate::algorithms::SpectralSnapshot;

/// Outcome of a trial, removal or reoptimization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    pub batch_accepted: bool,
    /// False when validity checking is on and the optimizer gave up.
    pub solution_valid: bool,
    pub is_informative_batch: bool,
    pub information_gain: f64,
    pub rank_psi: usize,
    pub rank_psi_deficiency: usize,
    pub rank_theta: usize,
    pub rank_theta_deficiency: usize,
    pub svd_tolerance: f64,
    pub qr_tolerance: f64,
    pub snapshot: SpectralSnapshot,
    pub num_iterations: usize,
    pub cost_start: f64,
    pub cost_final: f64,
    /// Wall time of the trial; after a rejection it also covers the rollback.
    pub elapsed: Duration,
    pub peak_memory_usage: usize,
    pub memory_usage: usize,
    pub num_flops: f64,
}
