#![allow(dead_code)]

use std::collections::VecDeque;

use incropt::{
    Batch, DesignVariable, ErrorTerm, GroupId, MarginalizationError, Marginalizer,
    SpectralSnapshot, VariableId,
};
use nalgebra::DMatrix;

pub const THETA: VariableId = VariableId(0);
pub const THETA_GROUP: GroupId = GroupId(0);
pub const OFFSET_GROUP: GroupId = GroupId(1);

/// w * (sum_k theta_k x^k + offset - y)
pub struct PolyPoint {
    ids: Vec<VariableId>,
    x: f64,
    y: f64,
    weight: f64,
}

impl PolyPoint {
    pub fn new(x: f64, y: f64, weight: f64) -> Self {
        Self {
            ids: vec![THETA],
            x,
            y,
            weight,
        }
    }

    pub fn with_offset(x: f64, y: f64, weight: f64, offset: VariableId) -> Self {
        Self {
            ids: vec![THETA, offset],
            x,
            y,
            weight,
        }
    }
}

impl ErrorTerm for PolyPoint {
    fn dimension(&self) -> usize {
        1
    }

    fn design_variables(&self) -> &[VariableId] {
        &self.ids
    }

    fn evaluate(&self, values: &[&[f64]], residual: &mut [f64]) {
        let mut model = 0.0;
        let mut power = 1.0;
        for theta in values[0] {
            model += theta * power;
            power *= self.x;
        }
        if let Some(offset) = values.get(1) {
            model += offset[0];
        }
        residual[0] = self.weight * (model - self.y);
    }

    fn jacobian(&self, _values: &[&[f64]], wrt: usize, out: &mut [f64]) {
        if wrt == 0 {
            let mut power = 1.0;
            for o in out.iter_mut() {
                *o = self.weight * power;
                power *= self.x;
            }
        } else {
            out[0] = self.weight;
        }
    }
}

/// Batch of weighted points on the polynomial with `theta_dim` coefficients.
pub fn poly_batch(theta_dim: usize, points: &[(f64, f64)], weight: f64) -> Batch {
    let mut batch = Batch::new();
    batch
        .add_design_variable(DesignVariable::euclidean(
            THETA,
            THETA_GROUP,
            vec![0.0; theta_dim],
        ))
        .unwrap();
    for &(x, y) in points {
        batch.add_error_term(PolyPoint::new(x, y, weight)).unwrap();
    }
    batch
}

/// Points on the line y = 1 + 2x.
pub fn line_batch(xs: &[f64], weight: f64) -> Batch {
    let points: Vec<_> = xs.iter().map(|&x| (x, 1.0 + 2.0 * x)).collect();
    poly_batch(2, &points, weight)
}

/// Line points sharing one batch-local offset.
pub fn offset_line_batch(offset: VariableId, xs: &[f64]) -> Batch {
    let mut batch = Batch::new();
    batch
        .add_design_variable(DesignVariable::euclidean(THETA, THETA_GROUP, vec![0.0; 2]))
        .unwrap();
    batch
        .add_design_variable(DesignVariable::euclidean(offset, OFFSET_GROUP, vec![0.0]))
        .unwrap();
    for &x in xs {
        batch
            .add_error_term(PolyPoint::with_offset(x, 1.0 + 2.0 * x, 1.0, offset))
            .unwrap();
    }
    batch
}

/// Prior pulling `id` towards `target`.
pub struct Prior {
    ids: [VariableId; 1],
    target: f64,
}

impl Prior {
    pub fn new(id: VariableId, target: f64) -> Self {
        Self { ids: [id], target }
    }
}

impl ErrorTerm for Prior {
    fn dimension(&self) -> usize {
        1
    }

    fn design_variables(&self) -> &[VariableId] {
        &self.ids
    }

    fn evaluate(&self, values: &[&[f64]], residual: &mut [f64]) {
        residual[0] = values[0][0] - self.target;
    }

    fn jacobian(&self, _values: &[&[f64]], _wrt: usize, out: &mut [f64]) {
        out[0] = 1.0;
    }
}

/// Batch holding a single scalar variable of `group` and a prior on it.
pub fn prior_batch(id: VariableId, group: GroupId, target: f64) -> Batch {
    let mut batch = Batch::new();
    batch
        .add_design_variable(DesignVariable::euclidean(id, group, vec![0.0]))
        .unwrap();
    batch.add_error_term(Prior::new(id, target)).unwrap();
    batch
}

/// Marginalizer replaying a fixed list of (log2 singular value sum, rank).
#[derive(Debug)]
pub struct ScriptedMarginalizer {
    dim: usize,
    script: VecDeque<(f64, usize)>,
    pub calls: Vec<(usize, usize)>,
}

impl ScriptedMarginalizer {
    pub fn new(dim: usize, script: &[(f64, usize)]) -> Self {
        Self {
            dim,
            script: script.iter().copied().collect(),
            calls: Vec::new(),
        }
    }
}

impl Marginalizer for ScriptedMarginalizer {
    fn marginalize(
        &mut self,
        jacobian_transpose: &DMatrix<f64>,
        keep_columns: usize,
    ) -> Result<SpectralSnapshot, MarginalizationError> {
        self.calls.push((jacobian_transpose.nrows(), keep_columns));
        let (log2_sum, rank) = self.script.pop_front().unwrap_or((0.0, 0));
        let mut snapshot = SpectralSnapshot::default();
        snapshot.raw.log2_singular_value_sum = log2_sum;
        snapshot.raw.rank = rank;
        snapshot.raw.rank_deficiency = self.dim - rank;
        snapshot.scaled = snapshot.raw.clone();
        Ok(snapshot)
    }
}
