use nalgebra::DVector;

use crate::numerics::config::{
    Direction, JacobianMode, LineSearchMethod, PreconditionerMode, SolverParameters,
};
use crate::numerics::context::ExecutionContext;
use crate::numerics::error::SolverError;
use crate::numerics::interface::NonlinearInterface;
use crate::numerics::linear;
use crate::numerics::precond::RowScaling;
use crate::numerics::status::{IterationState, StatusTest, StatusType};

/// Perturbation scale of the matrix-free Jacobian-vector product.
const MATRIX_FREE_LAMBDA: f64 = 1.0e-6;

pub struct NewtonResult {
    pub status: StatusType,
    pub iterations: u32,
    pub solution: DVector<f64>,
    pub final_residual: f64,
}

/// Line-search based Newton iteration over a [`NonlinearInterface`].
pub struct LineSearchNewton<'c> {
    params: &'c SolverParameters,
    ctx: &'c ExecutionContext,
}

struct Step {
    x: DVector<f64>,
    f: DVector<f64>,
    alpha: f64,
}

impl<'c> LineSearchNewton<'c> {
    pub fn new(params: &'c SolverParameters, ctx: &'c ExecutionContext) -> Self {
        Self { params, ctx }
    }

    pub fn solve<I>(
        &self,
        interface: &mut I,
        tests: &StatusTest,
    ) -> Result<NewtonResult, SolverError>
    where
        I: NonlinearInterface + ?Sized,
    {
        let n = interface.num_unknowns();
        let mut x = interface.initial_guess().clone();
        let mut f = DVector::zeros(n);

        if let Err(e) = interface.compute_residual(&x, &mut f) {
            return reject(e, x, 0, f64::NAN);
        }
        let initial_f_norm = f.norm();
        let mut previous_x: Option<DVector<f64>> = None;
        let mut previous_norm: Option<f64> = None;

        let mut jacobian_age: Option<u32> = None;
        // linearization point of the matrix-free products
        let mut base: Option<(DVector<f64>, DVector<f64>)> = None;
        let mut prec_op: Option<RowScaling> = None;
        let mut prec_age = 0u32;

        if self.params.verbose {
            log::info!("{n} unknowns");
            log::info!("    Iter   | Residual |  Fraction |  Step % |  Initial");
        }

        let mut iter = 0u32;
        loop {
            let f_norm = f.norm();
            let status = tests.check(&IterationState {
                iteration: iter,
                x: &x,
                f: &f,
                previous_x: previous_x.as_ref(),
                initial_f_norm,
            });

            let step_percent = previous_norm.map_or(0.0, |prev| (prev - f_norm) / prev * 100.0);
            previous_norm = Some(f_norm);
            log_iteration(
                iter,
                f_norm,
                f_norm / initial_f_norm,
                step_percent,
                initial_f_norm,
                self.params.verbose,
            );

            if status != StatusType::Unconverged {
                return Ok(NewtonResult {
                    status,
                    iterations: iter,
                    solution: x,
                    final_residual: f_norm,
                });
            }

            let refresh = match self.params.direction.method {
                Direction::Newton => true,
                Direction::ModifiedNewton => {
                    jacobian_age.map_or(true, |age| age >= self.params.direction.max_jacobian_age)
                }
            };
            if refresh {
                let computed = match self.params.jacobian {
                    JacobianMode::Assembled => interface.compute_jacobian(&x),
                    JacobianMode::MatrixFree | JacobianMode::MatrixFreePreconditioned => {
                        base = Some((x.clone(), f.clone()));
                        Ok(())
                    }
                };
                if let Err(e) = computed {
                    return reject(e, x, iter, f_norm);
                }
                jacobian_age = Some(0);
            }
            jacobian_age = jacobian_age.map(|age| age + 1);

            if let PreconditionerMode::UserDefined { max_age } = self.params.preconditioner {
                if prec_op.is_none() || prec_age >= max_age {
                    if let Err(e) = interface.compute_preconditioner(&x) {
                        return reject(e, x, iter, f_norm);
                    }
                    prec_op = interface.preconditioner_operator().cloned();
                    prec_age = 0;
                }
                prec_age += 1;
            }

            let rhs = -&f;
            let solved = match self.params.jacobian {
                JacobianMode::Assembled => {
                    let matrix = interface.jacobian().ok_or(SolverError::JacobianUnavailable)?;
                    linear::solve(&self.params.linear, matrix, &rhs, prec_op.as_ref(), self.ctx)
                }
                JacobianMode::MatrixFree | JacobianMode::MatrixFreePreconditioned => {
                    let (x0, f0) = base.as_ref().ok_or(SolverError::JacobianUnavailable)?;
                    linear::solve_matrix_free(
                        &self.params.linear,
                        |v, jv| jacobian_times(&mut *interface, x0, f0, v, jv),
                        &rhs,
                        prec_op.as_ref(),
                    )
                }
            };
            let linear = match solved {
                Ok(linear) => linear,
                Err(e) => return reject(e, x, iter, f_norm),
            };

            match self.line_search(interface, &x, &linear.dx, f_norm)? {
                Some(step) => {
                    log::trace!(
                        "iteration {iter}: alpha = {:.3}, |dx| = {:.4e}",
                        step.alpha,
                        linear.dx.norm()
                    );
                    previous_x = Some(std::mem::replace(&mut x, step.x));
                    f = step.f;
                }
                None => {
                    log::warn!("line search failed to find an acceptable step at iteration {iter}");
                    return Ok(NewtonResult {
                        status: StatusType::Failed,
                        iterations: iter,
                        solution: x,
                        final_residual: f_norm,
                    });
                }
            }
            iter += 1;
        }
    }

    /// Tries `x + alpha * dx`. `None` means no acceptable step exists.
    fn line_search<I>(
        &self,
        interface: &mut I,
        x: &DVector<f64>,
        dx: &DVector<f64>,
        f_norm: f64,
    ) -> Result<Option<Step>, SolverError>
    where
        I: NonlinearInterface + ?Sized,
    {
        let ls = &self.params.line_search;
        let mut f_trial = DVector::zeros(x.len());

        match ls.method {
            LineSearchMethod::FullStep => {
                let x_trial = x + dx;
                match interface.compute_residual(&x_trial, &mut f_trial) {
                    Ok(()) => Ok(Some(Step {
                        x: x_trial,
                        f: f_trial,
                        alpha: 1.0,
                    })),
                    Err(e) if e.is_step_rejection() => Ok(None),
                    Err(e) => Err(e),
                }
            }
            LineSearchMethod::Backtrack => {
                let mut alpha = 1.0;
                while alpha > ls.min_step_size {
                    let x_trial = x + dx * alpha;
                    match interface.compute_residual(&x_trial, &mut f_trial) {
                        Ok(()) => {
                            // ||F_new|| <= (1 - alpha * t) * ||F_old||
                            let target = (1.0 - alpha * ls.armijo_param) * f_norm;
                            if f_trial.norm() < target {
                                return Ok(Some(Step {
                                    x: x_trial,
                                    f: f_trial,
                                    alpha,
                                }));
                            }
                        }
                        Err(e) if e.is_step_rejection() => {
                            log::warn!("residual rejected at alpha = {alpha:.3}: {e}");
                        }
                        Err(e) => return Err(e),
                    }
                    alpha *= 0.5;
                }
                Ok(None)
            }
        }
    }
}

/// `J(x) v ~ (F(x + eta v) - F(x)) / eta`, with `eta` scaled by `|x|` and `|v|`.
fn jacobian_times<I>(
    interface: &mut I,
    x: &DVector<f64>,
    f: &DVector<f64>,
    v: &DVector<f64>,
    jv: &mut DVector<f64>,
) -> Result<(), SolverError>
where
    I: NonlinearInterface + ?Sized,
{
    let v_norm = v.norm();
    if v_norm == 0.0 {
        jv.fill(0.0);
        return Ok(());
    }
    let eta = MATRIX_FREE_LAMBDA * (MATRIX_FREE_LAMBDA + x.norm()) / v_norm;
    interface.compute_residual(&(x + v * eta), jv)?;
    *jv -= f;
    *jv /= eta;
    Ok(())
}

fn reject(
    error: SolverError,
    x: DVector<f64>,
    iterations: u32,
    final_residual: f64,
) -> Result<NewtonResult, SolverError> {
    if !error.is_step_rejection() {
        return Err(error);
    }
    log::warn!("step rejected at iteration {iterations}: {error}");
    Ok(NewtonResult {
        status: StatusType::Failed,
        iterations,
        solution: x,
        final_residual,
    })
}

pub(crate) fn log_iteration(
    i: u32,
    res_norm: f64,
    fraction: f64,
    step_percent: f64,
    init: f64,
    logging: bool,
) {
    if !logging {
        return;
    }
    log::info!(
        "{i:>4} | {res_norm:>8.3e} | {fraction:>9.3e} | {step_percent:>6.2}% | {init:>8.3e}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::config::{LinearSolverKind, NonlinearConfig};
    use crate::numerics::jacobian::JacobianMatrix;
    use crate::numerics::precond::{JacobiPreconditioner, Preconditioner};
    use crate::numerics::status::build_status_tests;
    use approx::assert_relative_eq;

    /// `F_i(x) = x_i^2 - c_i`, solved by `x_i = sqrt(c_i)`.
    struct Squares {
        c: Vec<f64>,
        x0: DVector<f64>,
        jac: JacobianMatrix,
        precond: Option<JacobiPreconditioner>,
        residual_calls: usize,
        jacobian_calls: usize,
        fail_residual_above: Option<f64>,
    }

    impl Squares {
        fn new(c: Vec<f64>, x0: Vec<f64>) -> Self {
            let n = c.len();
            let mut jac = JacobianMatrix::new();
            jac.prealloc(n);
            for i in 0..n {
                jac.pre_add_ij(i, i);
            }
            jac.alloc();
            Self {
                c,
                x0: DVector::from_vec(x0),
                jac,
                precond: None,
                residual_calls: 0,
                jacobian_calls: 0,
                fail_residual_above: None,
            }
        }
    }

    impl NonlinearInterface for Squares {
        fn num_unknowns(&self) -> usize {
            self.c.len()
        }

        fn initial_guess(&self) -> &DVector<f64> {
            &self.x0
        }

        fn compute_residual(
            &mut self,
            x: &DVector<f64>,
            f: &mut DVector<f64>,
        ) -> Result<(), SolverError> {
            self.residual_calls += 1;
            if let Some(limit) = self.fail_residual_above {
                if x.amax() > limit {
                    let err = crate::physics::problem::AssemblyError("out of range".into());
                    return Err(err.into());
                }
            }
            for i in 0..self.c.len() {
                f[i] = x[i] * x[i] - self.c[i];
            }
            Ok(())
        }

        fn compute_jacobian(&mut self, x: &DVector<f64>) -> Result<(), SolverError> {
            self.jacobian_calls += 1;
            self.jac.zero();
            for i in 0..self.c.len() {
                self.jac.add(i, i, 2.0 * x[i]);
            }
            self.jac.finish();
            Ok(())
        }

        fn compute_preconditioner(&mut self, x: &DVector<f64>) -> Result<(), SolverError> {
            self.compute_jacobian(x)?;
            let pc = self.precond.as_mut().ok_or(SolverError::MissingPreconditioner)?;
            pc.create(&self.jac);
            pc.compute()?;
            Ok(())
        }

        fn jacobian(&self) -> Option<&JacobianMatrix> {
            Some(&self.jac)
        }

        fn preconditioner_operator(&self) -> Option<&RowScaling> {
            self.precond.as_ref().and_then(|pc| pc.operator())
        }
    }

    fn params(config: &NonlinearConfig, matrix_free: bool, precond: bool) -> SolverParameters {
        SolverParameters::build(config, matrix_free, precond).unwrap()
    }

    fn lu_config() -> NonlinearConfig {
        let mut config = NonlinearConfig::default();
        config.linear.solver = LinearSolverKind::Lu;
        config.convergence.max_iterations = 50;
        config
    }

    fn krylov_config() -> NonlinearConfig {
        let mut config = NonlinearConfig::default();
        config.convergence.max_iterations = 50;
        config
    }

    #[test]
    fn newton_converges_on_squares() {
        let config = lu_config();
        let params = params(&config, false, false);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0, 9.0, 2.0], vec![1.0, 1.0, 1.0]);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();

        assert_eq!(result.status, StatusType::Converged);
        assert_relative_eq!(result.solution[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(result.solution[1], 3.0, epsilon = 1e-8);
        assert_relative_eq!(result.solution[2], 2f64.sqrt(), epsilon = 1e-8);
        assert_eq!(problem.jacobian_calls as u32, result.iterations);
    }

    #[test]
    fn modified_newton_reuses_the_jacobian() {
        let mut config = lu_config();
        config.direction = Direction::ModifiedNewton;
        let params = params(&config, false, false);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0], vec![3.0]);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();

        assert_eq!(result.status, StatusType::Converged);
        assert_eq!(problem.jacobian_calls as u32, result.iterations.div_ceil(2));
    }

    #[test]
    fn matrix_free_matches_assembled_solution() {
        let config = krylov_config();
        let params = params(&config, true, false);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0, 9.0], vec![1.0, 1.0]);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();

        assert_eq!(result.status, StatusType::Converged);
        assert_eq!(problem.jacobian_calls, 0);
        assert_relative_eq!(result.solution[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.solution[1], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn preconditioned_matrix_free_solve() {
        let config = krylov_config();
        let params = params(&config, true, true);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0, 9.0], vec![1.0, 1.0]);
        problem.precond = Some(JacobiPreconditioner::new());

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();
        assert_eq!(result.status, StatusType::Converged);
        assert!(problem.precond.as_ref().unwrap().operator().is_some());
    }

    #[test]
    fn matrix_free_cost_does_not_grow_with_unknowns() {
        let n = 40;
        let c: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let x0 = c.iter().map(|ci| 1.2 * ci.sqrt()).collect();
        let config = krylov_config();
        let params = params(&config, true, true);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(c, x0);
        problem.precond = Some(JacobiPreconditioner::new());

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();

        assert_eq!(result.status, StatusType::Converged);
        assert!(result.iterations > 0);
        // a column-by-column difference Jacobian alone costs n residuals per iteration
        assert!(problem.residual_calls < result.iterations as usize * n);
        assert_relative_eq!(result.solution[n - 1], (n as f64).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn missing_preconditioner_is_an_error() {
        let config = lu_config();
        let params = params(&config, false, true);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0], vec![1.0]);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence));
        assert!(matches!(result, Err(SolverError::MissingPreconditioner)));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let mut config = lu_config();
        config.convergence.max_iterations = 2;
        let params = params(&config, false, false);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0], vec![100.0]);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();
        assert_eq!(result.status, StatusType::MaxIterations);
        assert_eq!(result.iterations, 2);
    }

    #[test]
    fn rejected_full_step_fails_the_solve() {
        let config = lu_config();
        let params = params(&config, false, false);
        let ctx = ExecutionContext::serial();
        // first Newton step from 0.1 overshoots to ~20
        let mut problem = Squares::new(vec![4.0], vec![0.1]);
        problem.fail_residual_above = Some(10.0);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();
        assert_eq!(result.status, StatusType::Failed);
    }

    #[test]
    fn backtracking_recovers_from_rejected_trials() {
        let mut config = lu_config();
        config.line_search = LineSearchMethod::Backtrack;
        let params = params(&config, false, false);
        let ctx = ExecutionContext::serial();
        let mut problem = Squares::new(vec![4.0], vec![0.1]);
        problem.fail_residual_above = Some(10.0);

        let result = LineSearchNewton::new(&params, &ctx)
            .solve(&mut problem, &build_status_tests(&config.convergence))
            .unwrap();
        assert_eq!(result.status, StatusType::Converged);
        assert_relative_eq!(result.solution[0], 2.0, epsilon = 1e-8);
    }
}
