use std::time::{Duration, Instant};

use crate::numerics::config::{NonlinearConfig, SolverParameters};
use crate::numerics::context::ExecutionContext;
use crate::numerics::error::SolverError;
use crate::numerics::interface::{NonlinearInterface, ProblemInterface};
use crate::numerics::jacobian::JacobianMatrix;
use crate::numerics::precond::Preconditioner;
use crate::numerics::status::{build_status_tests, StatusTest, StatusType};
use crate::physics::problem::FeProblem;

/// Drives a Newton-type solve of a [`FeProblem`] and keeps its outcome.
///
/// The solution of the last converged `solve()` is kept until the next
/// converged one replaces it. `num_iters()` is `-1` after any other outcome.
pub struct NonlinearSolver<'a, P: FeProblem + ?Sized> {
    interface: ProblemInterface<'a, P>,
    config: NonlinearConfig,
    ctx: ExecutionContext,
    solution: Option<Vec<f64>>,
    num_iters: i32,
    status: Option<StatusType>,
}

impl<'a, P: FeProblem + ?Sized> NonlinearSolver<'a, P> {
    pub fn new(problem: &'a P, ctx: ExecutionContext) -> Result<Self, SolverError> {
        if !cfg!(feature = "newton-backend") {
            return Err(SolverError::BackendUnavailable);
        }
        Ok(Self {
            interface: ProblemInterface::new(problem),
            config: NonlinearConfig::default(),
            ctx,
            solution: None,
            num_iters: -1,
            status: None,
        })
    }

    pub fn with_config(mut self, config: NonlinearConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut NonlinearConfig {
        &mut self.config
    }

    pub fn set_preconditioner(&mut self, pc: &'a mut dyn Preconditioner) {
        log::debug!("attaching preconditioner '{}'", pc.name());
        self.interface.set_precond(pc);
    }

    pub fn set_initial_solution(&mut self, ic: &[f64]) -> Result<(), SolverError> {
        self.interface.set_init_sln(ic)
    }

    pub fn initial_solution(&self) -> &[f64] {
        self.interface.init_sln().as_slice()
    }

    /// Last assembled Jacobian; `None` for matrix-free problems without a preconditioner.
    pub fn jacobian(&self) -> Option<&JacobianMatrix> {
        self.interface.jacobian()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn interface(&self) -> &ProblemInterface<'a, P> {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut ProblemInterface<'a, P> {
        &mut self.interface
    }

    /// Builds the parameter tree for the current configuration.
    pub fn configure(&self) -> Result<SolverParameters, SolverError> {
        SolverParameters::build(
            &self.config,
            self.interface.problem().is_matrix_free(),
            self.interface.has_precond(),
        )
    }

    pub fn solve(&mut self) -> Result<StatusType, SolverError> {
        let start = Instant::now();
        self.interface.timers_mut().reset();
        // stays in place unless the backend reports convergence
        self.num_iters = -1;
        self.status = Some(StatusType::Failed);

        if self.interface.num_unknowns() == 0 {
            log::warn!("nothing to solve: the problem has no degrees of freedom");
            return Ok(StatusType::Failed);
        }

        let params = self.configure()?;
        let tests = build_status_tests(&self.config.convergence);

        let outcome = self.iterate(&params, &tests);
        self.interface.timers_mut().finalize(start.elapsed());
        let (status, iterations, solution) = outcome?;

        if status.is_converged() {
            self.solution = Some(solution);
            self.num_iters = iterations as i32;
            if self.config.verbose {
                log::info!("converged in {iterations} iterations");
            }
        } else {
            log::warn!("nonlinear solve ended with {status:?} after {iterations} iterations");
        }
        self.status = Some(status);
        self.interface.timers().print_summary();
        Ok(status)
    }

    #[cfg(feature = "newton-backend")]
    fn iterate(
        &mut self,
        params: &SolverParameters,
        tests: &StatusTest,
    ) -> Result<(StatusType, u32, Vec<f64>), SolverError> {
        let result = crate::numerics::newton::LineSearchNewton::new(params, &self.ctx)
            .solve(&mut self.interface, tests)?;
        log::debug!("final residual norm {:.4e}", result.final_residual);
        Ok((result.status, result.iterations, result.solution.as_slice().to_vec()))
    }

    #[cfg(not(feature = "newton-backend"))]
    fn iterate(
        &mut self,
        _params: &SolverParameters,
        _tests: &StatusTest,
    ) -> Result<(StatusType, u32, Vec<f64>), SolverError> {
        Err(SolverError::BackendUnavailable)
    }

    /// Solution of the last converged solve.
    pub fn solution(&self) -> Option<&[f64]> {
        self.solution.as_deref()
    }

    pub fn num_iters(&self) -> i32 {
        self.num_iters
    }

    /// Terminal status of the last solve, if any.
    pub fn status(&self) -> Option<StatusType> {
        self.status
    }

    pub fn assembly_time(&self) -> Duration {
        self.interface.timers().assembly_time()
    }

    pub fn precond_time(&self) -> Duration {
        self.interface.timers().precond_time()
    }

    pub fn solve_time(&self) -> Duration {
        self.interface.timers().solve_time()
    }
}
