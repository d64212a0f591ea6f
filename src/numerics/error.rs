use thiserror::Error;

use crate::numerics::precond::PreconditionerError;
use crate::physics::problem::AssemblyError;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("built without the Newton backend (enable the `newton-backend` feature)")]
    BackendUnavailable,
    #[error("preconditioner requested but none is attached")]
    MissingPreconditioner,
    #[error("Jacobian storage was not allocated for this problem")]
    JacobianUnavailable,
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("preconditioner failed: {0}")]
    Preconditioner(#[from] PreconditionerError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("initial solution has {got} entries but the problem has {expected} unknowns")]
    InitialSolutionLength { expected: usize, got: usize },
    #[error("linear solve failed")]
    LinearSolveFailed,
}

impl SolverError {
    /// Errors that reject the current step instead of aborting the solve.
    pub(crate) fn is_step_rejection(&self) -> bool {
        matches!(self, SolverError::Assembly(_) | SolverError::LinearSolveFailed)
    }
}
