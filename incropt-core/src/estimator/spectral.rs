use nalgebra::{DMatrix, DVector};

use crate::algorithms::SpectralSnapshot;

use super::BatchResult;

/// Spectral summary of the committed batches.
///
/// Before the first commit every accessor reports zeros and empty matrices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralState {
    snapshot: SpectralSnapshot,
    committed: bool,
    information_gain: f64,
    initial_cost: f64,
    final_cost: f64,
    memory_usage: usize,
    peak_memory_usage: usize,
    num_flops: f64,
}

impl SpectralState {
    /// `None` until a first batch was committed.
    pub fn snapshot(&self) -> Option<&SpectralSnapshot> {
        self.committed.then_some(&self.snapshot)
    }

    pub fn information_gain(&self) -> f64 {
        self.information_gain
    }

    pub fn rank_theta(&self) -> usize {
        self.snapshot.raw.rank
    }

    pub fn rank_theta_deficiency(&self) -> usize {
        self.snapshot.raw.rank_deficiency
    }

    pub fn rank_psi(&self) -> usize {
        self.snapshot.psi_rank
    }

    pub fn rank_psi_deficiency(&self) -> usize {
        self.snapshot.psi_rank_deficiency
    }

    pub fn svd_tolerance(&self) -> f64 {
        self.snapshot.raw.svd_tolerance
    }

    pub fn qr_tolerance(&self) -> f64 {
        self.snapshot.qr_tolerance
    }

    pub fn null_space_basis(&self, scaled: bool) -> &DMatrix<f64> {
        &self.snapshot.analysis(scaled).null_space_basis
    }

    pub fn column_space_basis(&self, scaled: bool) -> &DMatrix<f64> {
        &self.snapshot.analysis(scaled).column_space_basis
    }

    pub fn covariance(&self, scaled: bool) -> &DMatrix<f64> {
        &self.snapshot.analysis(scaled).covariance
    }

    pub fn complement_covariance(&self, scaled: bool) -> &DMatrix<f64> {
        &self.snapshot.analysis(scaled).complement_covariance
    }

    pub fn singular_values(&self, scaled: bool) -> &DVector<f64> {
        &self.snapshot.analysis(scaled).singular_values
    }

    pub fn precision(&self) -> &DMatrix<f64> {
        &self.snapshot.precision
    }

    pub fn log2_singular_value_sum(&self) -> f64 {
        self.snapshot.log2_singular_value_sum()
    }

    pub fn initial_cost(&self) -> f64 {
        self.initial_cost
    }

    pub fn final_cost(&self) -> f64 {
        self.final_cost
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    pub fn peak_memory_usage(&self) -> usize {
        self.peak_memory_usage
    }

    pub fn num_flops(&self) -> f64 {
        self.num_flops
    }

    pub(crate) fn commit(&mut self, result: &BatchResult) {
        self.snapshot = result.snapshot.clone();
        self.committed = true;
        self.information_gain = result.information_gain;
        self.initial_cost = result.cost_start;
        self.final_cost = result.cost_final;
        self.memory_usage = result.memory_usage;
        self.peak_memory_usage = result.peak_memory_usage;
        self.num_flops = result.num_flops;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
