use super::VariableId;

/// One residual block of the least-squares problem.
///
/// All derivatives are with respect to the local update vector used by
/// `Manifold::retract_into` of each referenced design variable.
pub trait ErrorTerm: Send {
    /// Residual dimension m.
    fn dimension(&self) -> usize;

    /// Variables this term depends on, in the order `values` is passed.
    fn design_variables(&self) -> &[VariableId];

    /// Fill residual vector r(x), len = m.
    ///
    /// `values[k]` holds the current value of `design_variables()[k]`.
    fn evaluate(&self, values: &[&[f64]], residual: &mut [f64]);

    /// Fill the Jacobian block of r with respect to variable `wrt`.
    ///
    /// The block is row-major with `minimal_dimensions` columns of that
    /// variable: row i, column k goes to `out[i * cols + k]`.
    fn jacobian(&self, values: &[&[f64]], wrt: usize, out: &mut [f64]);
}
