//! Streams batches of noisy line samples into the estimator.
//!
//! Each batch carries its own sensor offset, so only the slope of the line is
//! observable; redundant batches are rejected once they stop adding
//! information. Run with `RUST_LOG=incropt=debug` to see every decision.

use incropt::{
    Batch, DesignVariable, ErrorTerm, EstimatorConfig, GroupId, IncrementalEstimator, VariableId,
};
use tracing_subscriber::EnvFilter;

const LINE: VariableId = VariableId(0);
const LINE_GROUP: GroupId = GroupId(0);
const OFFSET_GROUP: GroupId = GroupId(1);

/// y = a x + b + offset
struct Sample {
    ids: [VariableId; 2],
    x: f64,
    y: f64,
}

impl ErrorTerm for Sample {
    fn dimension(&self) -> usize {
        1
    }

    fn design_variables(&self) -> &[VariableId] {
        &self.ids
    }

    fn evaluate(&self, values: &[&[f64]], r: &mut [f64]) {
        let (line, offset) = (values[0], values[1][0]);
        r[0] = line[0] * self.x + line[1] + offset - self.y;
    }

    fn jacobian(&self, _values: &[&[f64]], wrt: usize, j: &mut [f64]) {
        if wrt == 0 {
            j[0] = self.x;
            j[1] = 1.0;
        } else {
            j[0] = 1.0;
        }
    }
}

fn batch(index: usize, xs: &[f64]) -> incropt::Result<Batch> {
    let offset = VariableId(index + 1);
    let mut batch = Batch::new();
    batch.add_design_variable(DesignVariable::euclidean(LINE, LINE_GROUP, vec![1.0, 0.0]))?;
    batch.add_design_variable(DesignVariable::euclidean(offset, OFFSET_GROUP, vec![0.0]))?;
    for (k, &x) in xs.iter().enumerate() {
        // deterministic pseudo-noise
        let noise = 0.01 * ((index * 7 + k * 3) % 5) as f64 - 0.02;
        let y = 0.5 * x + 2.0 + 0.1 * index as f64 + noise;
        batch.add_error_term(Sample {
            ids: [LINE, offset],
            x,
            y,
        })?;
    }
    Ok(batch)
}

fn main() -> incropt::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EstimatorConfig::from_toml_str(
        r#"
        [estimator]
        info_gain_delta = 0.2
        verbose = true

        [optimizer]
        max_iterations = 10
        "#,
    )?;
    let mut estimator = IncrementalEstimator::new(LINE_GROUP, config)?;

    let streams: [&[f64]; 5] = [
        &[0.0, 1.0],
        &[0.0, 1.0],
        &[-4.0, 0.0, 4.0, 8.0],
        &[0.5, 0.6],
        &[-10.0, 10.0],
    ];
    for (index, xs) in streams.iter().enumerate() {
        let result = estimator.add_batch(batch(index, xs)?, false)?;
        println!(
            "batch {index}: accepted={} gain={:+.3} rank={} cost={:.3e}",
            result.batch_accepted,
            result.information_gain,
            result.rank_theta,
            result.cost_final
        );
    }

    let line = estimator
        .problem()
        .design_variable_by_id(LINE)
        .map(|dv| dv.value().to_vec())
        .unwrap_or_default();
    println!(
        "kept {} batches, line = {:?}, slope variance = {:.3e}",
        estimator.num_batches(),
        line,
        estimator
            .spectral()
            .covariance(false)
            .get((0, 0))
            .copied()
            .unwrap_or(f64::NAN)
    );
    Ok(())
}
