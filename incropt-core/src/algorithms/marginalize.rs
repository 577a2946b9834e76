use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

use crate::error::MarginalizationError;
use crate::numerics::linalg::{
    column_scaling, default_qr_tolerance, default_svd_tolerance, log2_sum, numerical_rank,
    scale_columns, sorted_svd,
};

/// Tolerances of the default marginalizer; `None` picks the usual defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarginalizerOptions {
    pub svd_tolerance: Option<f64>,
    pub qr_tolerance: Option<f64>,
}

/// Spectral decomposition of the marginalized group's system.
#[derive(Clone, Debug, PartialEq)]
pub struct SubspaceAnalysis {
    /// Right singular vectors at or below the tolerance (dim x deficiency).
    pub null_space_basis: DMatrix<f64>,
    /// Right singular vectors above the tolerance (dim x rank).
    pub column_space_basis: DMatrix<f64>,
    /// Pseudo-inverse of the marginal information, V_r S_r^-2 V_r^T.
    pub covariance: DMatrix<f64>,
    /// Covariance in column-space coordinates, S_r^-2.
    pub complement_covariance: DMatrix<f64>,
    /// Sorted in decreasing order.
    pub singular_values: DVector<f64>,
    pub log2_singular_value_sum: f64,
    pub rank: usize,
    pub rank_deficiency: usize,
    pub svd_tolerance: f64,
}

impl Default for SubspaceAnalysis {
    fn default() -> Self {
        Self {
            null_space_basis: DMatrix::zeros(0, 0),
            column_space_basis: DMatrix::zeros(0, 0),
            covariance: DMatrix::zeros(0, 0),
            complement_covariance: DMatrix::zeros(0, 0),
            singular_values: DVector::zeros(0),
            log2_singular_value_sum: 0.0,
            rank: 0,
            rank_deficiency: 0,
            svd_tolerance: 0.0,
        }
    }
}

/// Everything one marginalization produces.
///
/// `raw` decomposes the marginal system as is, `scaled` after normalizing
/// its columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralSnapshot {
    pub raw: SubspaceAnalysis,
    pub scaled: SubspaceAnalysis,
    /// Marginal information matrix of the group (A^T A).
    pub precision: DMatrix<f64>,
    pub psi_rank: usize,
    pub psi_rank_deficiency: usize,
    pub qr_tolerance: f64,
}

impl SpectralSnapshot {
    pub fn analysis(&self, scaled: bool) -> &SubspaceAnalysis {
        if scaled {
            &self.scaled
        } else {
            &self.raw
        }
    }

    pub fn log2_singular_value_sum(&self) -> f64 {
        self.raw.log2_singular_value_sum
    }

    pub fn rank_theta(&self) -> usize {
        self.raw.rank
    }

    pub fn rank_theta_deficiency(&self) -> usize {
        self.raw.rank_deficiency
    }
}

/// Computes the marginal spectral properties of the trailing columns of a
/// linear system.
pub trait Marginalizer {
    /// `jacobian_transpose` is columns x rows; the first `keep_columns`
    /// columns of the Jacobian are marginalized out, the rest are analyzed.
    fn marginalize(
        &mut self,
        jacobian_transpose: &DMatrix<f64>,
        keep_columns: usize,
    ) -> Result<SpectralSnapshot, MarginalizationError>;
}

/// Default marginalizer: rank-revealing projection of the analyzed columns
/// onto the complement of the kept block, followed by an SVD.
#[derive(Clone, Copy, Debug, Default)]
pub struct SvdMarginalizer {
    options: MarginalizerOptions,
}

impl SvdMarginalizer {
    pub fn new(options: MarginalizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MarginalizerOptions {
        &self.options
    }

    fn analyze(
        &self,
        a: &DMatrix<f64>,
        dim: usize,
    ) -> Result<SubspaceAnalysis, MarginalizationError> {
        // at least `dim` rows so that V is square
        let padded = if a.nrows() < dim {
            a.clone().resize_vertically(dim, 0.0)
        } else {
            a.clone()
        };
        let svd = sorted_svd(&padded).ok_or(MarginalizationError::NonFinite)?;
        let s = &svd.singular_values;
        let svd_tolerance = self
            .options
            .svd_tolerance
            .unwrap_or_else(|| default_svd_tolerance(padded.nrows(), dim, s));
        let rank = numerical_rank(s, svd_tolerance);

        let column_space_basis = svd.v.columns(0, rank).into_owned();
        let null_space_basis = svd.v.columns(rank, dim - rank).into_owned();
        let inv_sq = DVector::from_iterator(rank, s.iter().take(rank).map(|s| 1.0 / (s * s)));
        let complement_covariance = DMatrix::from_diagonal(&inv_sq);
        let covariance =
            &column_space_basis * &complement_covariance * column_space_basis.transpose();

        Ok(SubspaceAnalysis {
            null_space_basis,
            column_space_basis,
            covariance,
            complement_covariance,
            singular_values: s.clone(),
            log2_singular_value_sum: log2_sum(s, rank),
            rank,
            rank_deficiency: dim - rank,
            svd_tolerance,
        })
    }
}

impl Marginalizer for SvdMarginalizer {
    fn marginalize(
        &mut self,
        jacobian_transpose: &DMatrix<f64>,
        keep_columns: usize,
    ) -> Result<SpectralSnapshot, MarginalizationError> {
        let columns = jacobian_transpose.nrows();
        if keep_columns > columns {
            return Err(MarginalizationError::SplitOutOfRange {
                keep: keep_columns,
                columns,
            });
        }
        let dim = columns - keep_columns;
        let jacobian = jacobian_transpose.transpose();
        let j_psi = jacobian.columns(0, keep_columns).into_owned();
        let mut a_theta = jacobian.columns(keep_columns, dim).into_owned();

        let qr_tolerance = self
            .options
            .qr_tolerance
            .unwrap_or_else(|| default_qr_tolerance(&j_psi));
        let psi_svd = sorted_svd(&j_psi).ok_or(MarginalizationError::NonFinite)?;
        let psi_rank = numerical_rank(&psi_svd.singular_values, qr_tolerance);

        // A = (I - U_r U_r^T) J_theta
        if psi_rank > 0 {
            let u_r = psi_svd.u.columns(0, psi_rank);
            let projected = &u_r * (u_r.transpose() * &a_theta);
            a_theta -= projected;
        }

        let raw = self.analyze(&a_theta, dim)?;
        let scaling = column_scaling(&a_theta);
        let scaled = self.analyze(&scale_columns(&a_theta, &scaling), dim)?;
        let precision = a_theta.transpose() * &a_theta;

        Ok(SpectralSnapshot {
            raw,
            scaled,
            precision,
            psi_rank,
            psi_rank_deficiency: keep_columns - psi_rank,
            qr_tolerance,
        })
    }
}
