use nalgebra::DVector;
use thiserror::Error;

use crate::numerics::jacobian::JacobianMatrix;

#[derive(Debug, Error)]
#[error("assembly failed: {0}")]
pub struct AssemblyError(pub String);

/// Contract of an assembled finite-element problem as seen by the nonlinear solver.
pub trait FeProblem {
    /// Number of scalar unknowns.
    fn num_dofs(&self) -> usize;

    /// When true the Jacobian is never formed explicitly.
    fn is_matrix_free(&self) -> bool {
        false
    }

    /// Assembles the requested quantities at the iterate `x`.
    ///
    /// Any target may be `None` to skip that computation. Jacobian entries are
    /// added into `jacobian`, which the caller has zeroed. `dirichlet` receives
    /// the lifted Dirichlet values when requested.
    fn assemble(
        &self,
        x: &DVector<f64>,
        jacobian: Option<&mut JacobianMatrix>,
        residual: Option<&mut DVector<f64>>,
        dirichlet: Option<&mut DVector<f64>>,
    ) -> Result<(), AssemblyError>;

    /// Registers the sparsity pattern of the Jacobian.
    fn create_jacobian(&self, jacobian: &mut JacobianMatrix);
}
