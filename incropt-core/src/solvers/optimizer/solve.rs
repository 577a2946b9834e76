use crate::problems::IncrementalProblem;
use crate::solvers::common::trace::{SolverTracer, TraceRow};
use crate::solvers::trust_region::StepContext;

use super::types::{Optimizer, SolutionReturnValue};

impl Optimizer {
    /// Lays out the problem and rebuilds the linear system at its current values.
    pub fn relinearize(&mut self, problem: &mut IncrementalProblem) -> bool {
        let layout = problem.assign_system_layout();
        self.linear_solver.init_matrix_structure(&layout);
        self.linear_solver.build_system(problem);
        self.linear_solver.analyze_system()
    }

    /// Minimize the total cost of `problem` in place.
    ///
    /// On return the linear solver holds the system linearized at the final
    /// values, so its Jacobian transpose matches the returned point.
    pub fn optimize(&mut self, problem: &mut IncrementalProblem) -> SolutionReturnValue {
        let mut tracer = SolverTracer::new(
            self.trust_region.name(),
            self.options.verbose,
            self.options.collect_trace,
        );

        let layout = problem.assign_system_layout();
        self.linear_solver.init_matrix_structure(&layout);

        let cost_start = problem.evaluate_cost();
        let mut cost = cost_start;
        let mut iterations = 0;
        let mut converged = false;
        let mut failed_linear_solves = 0;
        tracer.emit(TraceRow::iter(0).cost(cost).note("initial"));

        for it in 0..self.options.max_iterations {
            self.linear_solver.build_system(problem);
            let lambda = self.trust_region.damping();
            let step = if self.linear_solver.analyze_system() {
                self.linear_solver.solve_system(lambda)
            } else {
                None
            };
            let Some(dx) = step else {
                iterations = it + 1;
                failed_linear_solves += 1;
                self.trust_region.on_solve_failure();
                tracer.emit(
                    TraceRow::iter(it)
                        .cost(cost)
                        .lambda(lambda)
                        .note("linear_solve_failed"),
                );
                continue;
            };

            let dx_norm = dx.norm();
            if dx_norm <= self.options.convergence_delta_x {
                converged = true;
                tracer.emit(
                    TraceRow::iter(it)
                        .cost(cost)
                        .dx_norm(dx_norm)
                        .note("stop dx_norm"),
                );
                break;
            }
            iterations = it + 1;

            let backup = problem.design_variable_values();
            problem.apply_update(&dx);
            let cost_trial = problem.evaluate_cost();
            let ctx = StepContext {
                iter: it,
                cost0: cost,
                cost_trial: cost_trial.is_finite().then_some(cost_trial),
                dx_norm,
            };

            if self.trust_region.evaluate_step(&ctx) {
                let delta = cost - cost_trial;
                cost = cost_trial;
                tracer.emit(
                    TraceRow::iter(it)
                        .cost(cost)
                        .dx_norm(dx_norm)
                        .lambda(lambda)
                        .note("accepted"),
                );
                if delta.abs() <= self.options.convergence_delta_j {
                    converged = true;
                    break;
                }
            } else {
                problem.set_design_variable_values(&backup);
                tracer.emit(
                    TraceRow::iter(it)
                        .cost(cost)
                        .cost_trial(cost_trial)
                        .dx_norm(dx_norm)
                        .lambda(lambda)
                        .note("rejected"),
                );
            }
        }

        self.linear_solver.build_system(problem);
        self.linear_solver.analyze_system();

        SolutionReturnValue {
            iterations,
            cost_start,
            cost_final: cost,
            converged,
            failed_linear_solves,
            trace: tracer.into_history(),
        }
    }
}
