//! Boundary-condition bookkeeping and a Newton solver adapter for assembled
//! finite-element problems.
//!
//! [`physics`] holds the boundary-condition types and the marker registry the
//! assembly consults, plus the [`FeProblem`] contract. [`numerics`] holds the
//! solver adapter, the Jacobian storage, preconditioners and the line-search
//! Newton backend.

pub mod numerics;
pub mod physics;

pub use numerics::{
    ExecutionContext, JacobiPreconditioner, JacobianMatrix, NonlinearConfig, NonlinearSolver,
    Preconditioner, SolverError, StatusType,
};
pub use physics::{
    AssemblyError, BoundaryCondition, BoundaryConditions, BoundaryError, DirichletBc, FeProblem,
    NeumannBc, NewtonBc, Point,
};
