use std::fmt;

/// Trait that represents the space a design variable lives on.
///
/// The interface is intentionally small. The optimizer works with:
/// - points (`x`), stored as the variable's ambient coordinates
/// - local update vectors (`direction`) of `minimal_dimensions` entries
///
/// Jacobians supplied by error terms are taken with respect to the local
/// update, so `retract_into` defines what a column of the system means.
pub trait Manifold: fmt::Debug + Send + Sync {
    /// Length of the local update for a point with `ambient` coordinates.
    fn minimal_dimensions(&self, ambient: usize) -> usize;

    /// out = Retr_x(direction)
    fn retract_into(&self, out: &mut [f64], x: &[f64], direction: &[f64]);

    /// In-place step update: x <- Retr_x(direction)
    ///
    /// `tmp` is a scratch buffer owned by the caller so repeated updates do
    /// not allocate.
    fn retract_step_into(&self, x: &mut [f64], direction: &[f64], tmp: &mut Vec<f64>) {
        tmp.clear();
        tmp.extend_from_slice(x);
        self.retract_into(x, tmp, direction);
    }
}
