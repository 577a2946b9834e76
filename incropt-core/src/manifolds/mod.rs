//! Local-update conventions for design variables.

pub mod angle;
pub mod euclidean;
pub mod manifold;

pub use angle::AngleSpace;
pub use euclidean::EuclideanSpace;
pub use manifold::Manifold;
