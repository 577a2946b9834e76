use std::mem::size_of;

use nalgebra::{DMatrix, DVector};

use crate::numerics::linalg::{
    column_scaling, default_qr_tolerance, numerical_rank, scale_columns, sorted_svd, SortedSvd,
};
use crate::problems::{IncrementalProblem, SystemLayout};

use super::{LinearSolverOptions, LinearSystemSolver};

/// Dense solver truncating the SVD of the (optionally column-normalized)
/// Jacobian at the QR tolerance.
///
/// The step is the damped minimum-norm solution
/// `dx = -D^-1 sum_{s_i > tol} v_i s_i / (s_i^2 + lambda) u_i^T r`,
/// so rank-deficient systems never fail, they just leave the unobservable
/// directions untouched.
#[derive(Clone, Debug)]
pub struct TruncatedSvdSolver {
    options: LinearSolverOptions,
    layout: SystemLayout,
    jacobian: DMatrix<f64>,
    jacobian_transpose: DMatrix<f64>,
    residual: DVector<f64>,
    scaling: DVector<f64>,
    svd: Option<SortedSvd>,
    tolerance: f64,
    rank: usize,
    memory_usage: usize,
    peak_memory_usage: usize,
    num_flops: f64,
}

impl TruncatedSvdSolver {
    pub fn new(options: LinearSolverOptions) -> Self {
        Self {
            options,
            layout: SystemLayout::default(),
            jacobian: DMatrix::zeros(0, 0),
            jacobian_transpose: DMatrix::zeros(0, 0),
            residual: DVector::zeros(0),
            scaling: DVector::zeros(0),
            svd: None,
            tolerance: 0.0,
            rank: 0,
            memory_usage: 0,
            peak_memory_usage: 0,
            num_flops: 0.0,
        }
    }

    pub fn options(&self) -> &LinearSolverOptions {
        &self.options
    }

    fn track_memory(&mut self) {
        let mut elements = self.jacobian.len()
            + self.jacobian_transpose.len()
            + self.residual.len()
            + self.scaling.len();
        if let Some(svd) = &self.svd {
            elements += svd.u.len() + svd.v.len() + svd.singular_values.len();
        }
        self.memory_usage = elements * size_of::<f64>();
        self.peak_memory_usage = self.peak_memory_usage.max(self.memory_usage);
    }
}

impl Default for TruncatedSvdSolver {
    fn default() -> Self {
        Self::new(LinearSolverOptions::default())
    }
}

impl LinearSystemSolver for TruncatedSvdSolver {
    fn initialize(&mut self) {
        *self = Self::new(self.options);
    }

    fn init_matrix_structure(&mut self, layout: &SystemLayout) {
        self.layout = *layout;
        self.jacobian = DMatrix::zeros(layout.num_rows, layout.num_columns);
        self.jacobian_transpose = DMatrix::zeros(layout.num_columns, layout.num_rows);
        self.residual = DVector::zeros(layout.num_rows);
        self.scaling = DVector::from_element(layout.num_columns, 1.0);
        self.svd = None;
        self.rank = 0;
        self.track_memory();
    }

    fn build_system(&mut self, problem: &IncrementalProblem) {
        problem.linearize(&mut self.jacobian, &mut self.residual);
        self.jacobian_transpose = self.jacobian.transpose();
        self.svd = None;
    }

    fn analyze_system(&mut self) -> bool {
        self.scaling = if self.options.column_normalization {
            column_scaling(&self.jacobian)
        } else {
            DVector::from_element(self.jacobian.ncols(), 1.0)
        };
        let scaled = scale_columns(&self.jacobian, &self.scaling);
        self.tolerance = self
            .options
            .qr_tolerance
            .unwrap_or_else(|| default_qr_tolerance(&scaled));

        let (m, n) = scaled.shape();
        let (k, l) = (m.min(n) as f64, m.max(n) as f64);
        self.num_flops += 4.0 * l * k * k + 22.0 * k * k * k;

        self.svd = sorted_svd(&scaled);
        self.rank = self
            .svd
            .as_ref()
            .map(|svd| numerical_rank(&svd.singular_values, self.tolerance))
            .unwrap_or(0);
        self.track_memory();
        self.svd.is_some()
    }

    fn solve_system(&self, damping: f64) -> Option<DVector<f64>> {
        let svd = self.svd.as_ref()?;
        let lambda = damping.max(0.0);
        let mut dx = DVector::zeros(self.layout.num_columns);
        for i in 0..self.rank {
            let s = svd.singular_values[i];
            let coeff = s / (s * s + lambda) * svd.u.column(i).dot(&self.residual);
            dx -= svd.v.column(i) * coeff;
        }
        dx.component_div_assign(&self.scaling);
        dx.iter().all(|v| v.is_finite()).then_some(dx)
    }

    fn jacobian_transpose(&self) -> &DMatrix<f64> {
        &self.jacobian_transpose
    }

    fn residual(&self) -> &DVector<f64> {
        &self.residual
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn rank_deficiency(&self) -> usize {
        self.layout.num_columns.saturating_sub(self.rank)
    }

    fn qr_tolerance(&self) -> f64 {
        self.tolerance
    }

    fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    fn peak_memory_usage(&self) -> usize {
        self.peak_memory_usage
    }

    fn num_flops(&self) -> f64 {
        self.num_flops
    }
}
