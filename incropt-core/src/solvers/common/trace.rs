use std::fmt::Write;

/// One iteration row of an optimizer run.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverTraceRecord {
    pub solver: &'static str,
    pub iter: usize,
    pub cost: Option<f64>,
    pub cost_trial: Option<f64>,
    pub dx_norm: Option<f64>,
    pub lambda: Option<f64>,
    pub note: Option<&'static str>,
}

impl SolverTraceRecord {
    pub fn format_line(&self) -> String {
        let mut line = format!("[{}] iter {:>6}", self.solver, self.iter);
        if let Some(v) = self.cost {
            let _ = write!(line, " | cost {:>13.6e}", v);
        }
        if let Some(v) = self.cost_trial {
            let _ = write!(line, " | trial {:>13.6e}", v);
        }
        if let Some(v) = self.dx_norm {
            let _ = write!(line, " | dx {:>13.6e}", v);
        }
        if let Some(v) = self.lambda {
            let _ = write!(line, " | lambda {:>9.3e}", v);
        }
        if let Some(note) = self.note {
            let _ = write!(line, " | note {note}");
        }
        line
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TraceRow {
    iter: usize,
    cost: Option<f64>,
    cost_trial: Option<f64>,
    dx_norm: Option<f64>,
    lambda: Option<f64>,
    note: Option<&'static str>,
}

impl TraceRow {
    pub(crate) fn iter(iter: usize) -> Self {
        Self {
            iter,
            cost: None,
            cost_trial: None,
            dx_norm: None,
            lambda: None,
            note: None,
        }
    }

    pub(crate) fn cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub(crate) fn cost_trial(mut self, cost_trial: f64) -> Self {
        self.cost_trial = Some(cost_trial);
        self
    }

    pub(crate) fn dx_norm(mut self, dx_norm: f64) -> Self {
        self.dx_norm = Some(dx_norm);
        self
    }

    pub(crate) fn lambda(mut self, lambda: f64) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub(crate) fn note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }
}

/// Routes trace rows to `tracing` and, optionally, to an in-memory history.
///
/// Rows go out at `info` when verbose and at `trace` otherwise.
#[derive(Clone, Debug)]
pub(crate) struct SolverTracer {
    verbose: bool,
    solver: &'static str,
    history: Option<Vec<SolverTraceRecord>>,
}

impl SolverTracer {
    pub(crate) fn new(solver: &'static str, verbose: bool, collect: bool) -> Self {
        Self {
            verbose,
            solver,
            history: collect.then(Vec::new),
        }
    }

    pub(crate) fn emit(&mut self, row: TraceRow) {
        let record = SolverTraceRecord {
            solver: self.solver,
            iter: row.iter,
            cost: row.cost,
            cost_trial: row.cost_trial,
            dx_norm: row.dx_norm,
            lambda: row.lambda,
            note: row.note,
        };

        if self.verbose {
            tracing::info!(target: "incropt::optimizer", "{}", record.format_line());
        } else {
            tracing::trace!(target: "incropt::optimizer", "{}", record.format_line());
        }

        if let Some(history) = &mut self.history {
            history.push(record);
        }
    }

    pub(crate) fn into_history(self) -> Option<Vec<SolverTraceRecord>> {
        self.history
    }
}
