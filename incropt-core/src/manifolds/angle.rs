use std::f64::consts::PI;

use super::manifold::Manifold;

/// Planar rotation stored as a single angle, kept in `[-pi, pi)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AngleSpace;

fn wrap_angle(theta: f64) -> f64 {
    (theta + PI).rem_euclid(2.0 * PI) - PI
}

impl Manifold for AngleSpace {
    fn minimal_dimensions(&self, _ambient: usize) -> usize {
        1
    }

    fn retract_into(&self, out: &mut [f64], x: &[f64], direction: &[f64]) {
        out[0] = wrap_angle(x[0] + direction[0]);
    }
}
