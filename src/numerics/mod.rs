pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod interface;
pub mod jacobian;
pub mod linear;
#[cfg(feature = "newton-backend")]
pub mod newton;
pub mod precond;
pub mod status;
pub mod timing;

pub use adapter::NonlinearSolver;
pub use config::{
    ConvergenceConfig, Direction, LineSearchMethod, LinearSolverConfig, LinearSolverKind,
    NonlinearConfig, SolverParameters,
};
pub use context::ExecutionContext;
pub use error::SolverError;
pub use interface::{NonlinearInterface, ProblemInterface};
pub use jacobian::JacobianMatrix;
pub use precond::{JacobiPreconditioner, Preconditioner, PreconditionerError, RowScaling};
pub use status::{build_status_tests, StatusTest, StatusType};
pub use timing::SolverTimers;
