use super::manifold::Manifold;

/// Plain R^n: the local update is added coordinate-wise.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanSpace;

impl Manifold for EuclideanSpace {
    fn minimal_dimensions(&self, ambient: usize) -> usize {
        ambient
    }

    fn retract_into(&self, out: &mut [f64], x: &[f64], direction: &[f64]) {
        for i in 0..x.len() {
            out[i] = x[i] + direction[i];
        }
    }
}
