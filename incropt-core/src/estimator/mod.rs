//! Batch admission: trial, scoring, commit and rollback.

mod decision;
mod incremental;
mod result;
mod spectral;

pub use decision::PendingDecision;
pub use incremental::{IncrementalEstimator, RemovedBatch};
pub use result::BatchResult;
pub use spectral::SpectralState;
