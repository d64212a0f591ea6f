use nalgebra::DVector;

use crate::numerics::error::SolverError;
use crate::numerics::jacobian::JacobianMatrix;
use crate::numerics::precond::{Preconditioner, RowScaling};
use crate::numerics::timing::SolverTimers;
use crate::physics::problem::FeProblem;

/// Callbacks a Newton-type backend drives while iterating.
pub trait NonlinearInterface {
    fn num_unknowns(&self) -> usize;

    fn initial_guess(&self) -> &DVector<f64>;

    /// Residual `F(x)` written into `f`.
    fn compute_residual(
        &mut self,
        x: &DVector<f64>,
        f: &mut DVector<f64>,
    ) -> Result<(), SolverError>;

    /// Assembles `J(x)` into the storage returned by [`NonlinearInterface::jacobian`].
    fn compute_jacobian(&mut self, x: &DVector<f64>) -> Result<(), SolverError>;

    /// Rebuilds the preconditioner from `J(x)`.
    fn compute_preconditioner(&mut self, x: &DVector<f64>) -> Result<(), SolverError>;

    fn jacobian(&self) -> Option<&JacobianMatrix>;

    fn preconditioner_operator(&self) -> Option<&RowScaling>;
}

/// Bridges a [`FeProblem`] to the Newton backend.
///
/// Every callback forwards to `FeProblem::assemble` with only the requested
/// target, and its wall time is charged to the assembly or preconditioner
/// timer.
pub struct ProblemInterface<'a, P: FeProblem + ?Sized> {
    problem: &'a P,
    init_sln: DVector<f64>,
    jacobian: Option<JacobianMatrix>,
    precond: Option<&'a mut dyn Preconditioner>,
    timers: SolverTimers,
}

impl<'a, P: FeProblem + ?Sized> ProblemInterface<'a, P> {
    pub fn new(problem: &'a P) -> Self {
        let mut interface = Self {
            problem,
            init_sln: DVector::zeros(problem.num_dofs()),
            jacobian: None,
            precond: None,
            timers: SolverTimers::new(),
        };
        if !problem.is_matrix_free() {
            interface.prealloc_jacobian();
        }
        interface
    }

    fn prealloc_jacobian(&mut self) {
        let mut jacobian = JacobianMatrix::new();
        self.problem.create_jacobian(&mut jacobian);
        jacobian.finish();
        self.jacobian = Some(jacobian);
    }

    pub fn problem(&self) -> &'a P {
        self.problem
    }

    /// Attaches a caller-owned preconditioner; also allocates the Jacobian it is built from.
    pub fn set_precond(&mut self, pc: &'a mut dyn Preconditioner) {
        self.precond = Some(pc);
        self.prealloc_jacobian();
    }

    pub fn has_precond(&self) -> bool {
        self.precond.is_some()
    }

    pub fn set_init_sln(&mut self, ic: &[f64]) -> Result<(), SolverError> {
        let expected = self.problem.num_dofs();
        if ic.len() != expected {
            return Err(SolverError::InitialSolutionLength {
                expected,
                got: ic.len(),
            });
        }
        self.init_sln = DVector::from_column_slice(ic);
        Ok(())
    }

    pub fn init_sln(&self) -> &DVector<f64> {
        &self.init_sln
    }

    pub fn timers(&self) -> &SolverTimers {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut SolverTimers {
        &mut self.timers
    }

    fn assemble_jacobian(&mut self, x: &DVector<f64>) -> Result<(), SolverError> {
        let problem = self.problem;
        let jacobian = self
            .jacobian
            .as_mut()
            .ok_or(SolverError::JacobianUnavailable)?;

        self.timers.record_assembly(|| {
            jacobian.zero();
            let result = problem.assemble(x, Some(&mut *jacobian), None, None);
            jacobian.finish();
            result
        })?;
        Ok(())
    }
}

impl<'a, P: FeProblem + ?Sized> NonlinearInterface for ProblemInterface<'a, P> {
    fn num_unknowns(&self) -> usize {
        self.problem.num_dofs()
    }

    fn initial_guess(&self) -> &DVector<f64> {
        &self.init_sln
    }

    fn compute_residual(
        &mut self,
        x: &DVector<f64>,
        f: &mut DVector<f64>,
    ) -> Result<(), SolverError> {
        let problem = self.problem;
        if f.len() != x.len() {
            *f = DVector::zeros(x.len());
        }
        self.timers
            .record_assembly(|| problem.assemble(x, None, Some(f), None))?;
        Ok(())
    }

    fn compute_jacobian(&mut self, x: &DVector<f64>) -> Result<(), SolverError> {
        self.assemble_jacobian(x)
    }

    fn compute_preconditioner(&mut self, x: &DVector<f64>) -> Result<(), SolverError> {
        if self.precond.is_none() {
            return Err(SolverError::MissingPreconditioner);
        }
        self.assemble_jacobian(x)?;

        let jacobian = self
            .jacobian
            .as_ref()
            .ok_or(SolverError::JacobianUnavailable)?;
        let pc = self
            .precond
            .as_deref_mut()
            .ok_or(SolverError::MissingPreconditioner)?;

        self.timers.record_precond(|| {
            pc.create(jacobian);
            pc.compute()
        })?;
        Ok(())
    }

    fn jacobian(&self) -> Option<&JacobianMatrix> {
        self.jacobian.as_ref()
    }

    fn preconditioner_operator(&self) -> Option<&RowScaling> {
        self.precond.as_deref().and_then(|pc| pc.operator())
    }
}
