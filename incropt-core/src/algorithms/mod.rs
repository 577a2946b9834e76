//! Numerical algorithms built on top of the linear system.

pub mod marginalize;

pub use marginalize::{
    Marginalizer, MarginalizerOptions, SpectralSnapshot, SubspaceAnalysis, SvdMarginalizer,
};
