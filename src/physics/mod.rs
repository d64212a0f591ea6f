pub mod bc;
pub mod problem;
pub mod registry;

pub use bc::{BcKind, BoundaryCondition, BoundaryError, DirichletBc, NeumannBc, NewtonBc, Point};
pub use problem::{AssemblyError, FeProblem};
pub use registry::BoundaryConditions;
