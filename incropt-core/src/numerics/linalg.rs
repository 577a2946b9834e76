//! Dense helpers shared by the linear solver and the marginalizer.

use nalgebra::{DMatrix, DVector};

/// Thin SVD with singular values sorted in decreasing order.
///
/// `u` is `m x k`, `v` is `n x k` with `k = min(m, n)`.
#[derive(Clone, Debug)]
pub struct SortedSvd {
    pub u: DMatrix<f64>,
    pub singular_values: DVector<f64>,
    pub v: DMatrix<f64>,
}

/// Returns `None` when `a` holds non-finite entries or the SVD fails to converge.
pub fn sorted_svd(a: &DMatrix<f64>) -> Option<SortedSvd> {
    const MAX_SWEEPS_PER_VALUE: usize = 200;

    let (m, n) = a.shape();
    let k = m.min(n);
    if k == 0 {
        return Some(SortedSvd {
            u: DMatrix::zeros(m, 0),
            singular_values: DVector::zeros(0),
            v: DMatrix::zeros(n, 0),
        });
    }
    if a.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = a
        .clone()
        .try_svd(true, true, f64::EPSILON, MAX_SWEEPS_PER_VALUE * k)?;
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let s = svd.singular_values;

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| s[j].total_cmp(&s[i]));

    Some(SortedSvd {
        u: u.select_columns(&order),
        singular_values: DVector::from_iterator(k, order.iter().map(|&i| s[i])),
        v: v.select_columns(&order),
    })
}

/// Euclidean norm of every column.
pub fn column_norms(a: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(a.ncols(), a.column_iter().map(|c| c.norm()))
}

/// Column norms with zeros replaced by one, usable as a scaling.
pub fn column_scaling(a: &DMatrix<f64>) -> DVector<f64> {
    column_norms(a).map(|n| if n > 0.0 && n.is_finite() { n } else { 1.0 })
}

/// a * diag(1 / scale)
pub fn scale_columns(a: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    let mut out = a.clone();
    for (j, mut column) in out.column_iter_mut().enumerate() {
        column /= scale[j];
    }
    out
}

/// Default rank tolerance used by SuiteSparseQR: 20 (m + n) eps max_j ||a_j||.
pub fn default_qr_tolerance(a: &DMatrix<f64>) -> f64 {
    let (m, n) = a.shape();
    let max_norm = column_norms(a).iter().copied().fold(0.0, f64::max);
    20.0 * (m + n) as f64 * f64::EPSILON * max_norm
}

/// Default SVD rank tolerance: max(m, n) sigma_max eps.
pub fn default_svd_tolerance(rows: usize, cols: usize, singular_values: &DVector<f64>) -> f64 {
    let sigma_max = singular_values.iter().copied().fold(0.0, f64::max);
    rows.max(cols) as f64 * sigma_max * f64::EPSILON
}

/// Number of singular values strictly above `tolerance`.
pub fn numerical_rank(singular_values: &DVector<f64>, tolerance: f64) -> usize {
    singular_values.iter().filter(|&&s| s > tolerance).count()
}

/// sum_{i < rank} log2(s_i), for values sorted in decreasing order.
pub fn log2_sum(singular_values: &DVector<f64>, rank: usize) -> f64 {
    singular_values.iter().take(rank).map(|s| s.log2()).sum()
}
