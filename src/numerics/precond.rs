use nalgebra::DVector;
use thiserror::Error;

use crate::numerics::jacobian::JacobianMatrix;

#[derive(Debug, Error, PartialEq)]
pub enum PreconditionerError {
    #[error("preconditioner computed before create()")]
    NotCreated,
}

/// Left preconditioning operator `P^-1 = diag(scale)` applied to the system rows.
#[derive(Clone, Debug, PartialEq)]
pub struct RowScaling {
    scale: Vec<f64>,
}

impl RowScaling {
    pub fn new(scale: Vec<f64>) -> Self {
        Self { scale }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scale
    }

    pub fn len(&self) -> usize {
        self.scale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_empty()
    }

    pub fn apply(&self, rhs: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            rhs.len(),
            rhs.iter().zip(&self.scale).map(|(r, s)| r * s),
        )
    }
}

/// Preconditioner supplied by the caller and borrowed by the solver.
///
/// `create` hands over the freshly assembled Jacobian, `compute` builds or
/// factorizes the operator, and `operator` exposes it once computed.
pub trait Preconditioner {
    fn name(&self) -> &str;

    fn create(&mut self, matrix: &JacobianMatrix);

    fn compute(&mut self) -> Result<(), PreconditionerError>;

    fn operator(&self) -> Option<&RowScaling>;
}

/// Jacobi (diagonal) preconditioner.
///
/// Rows with a diagonal below `eps_diagonal` in magnitude are left unscaled.
#[derive(Clone, Debug)]
pub struct JacobiPreconditioner {
    pub eps_diagonal: f64,
    diagonal: Option<Vec<f64>>,
    op: Option<RowScaling>,
}

impl Default for JacobiPreconditioner {
    fn default() -> Self {
        Self {
            eps_diagonal: 1e-12,
            diagonal: None,
            op: None,
        }
    }
}

impl JacobiPreconditioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn name(&self) -> &str {
        "Jacobi"
    }

    fn create(&mut self, matrix: &JacobianMatrix) {
        let diag = (0..matrix.size())
            .map(|r| matrix.diagonal(r).unwrap_or(0.0))
            .collect();
        self.diagonal = Some(diag);
        self.op = None;
    }

    fn compute(&mut self) -> Result<(), PreconditionerError> {
        let diag = self
            .diagonal
            .as_ref()
            .ok_or(PreconditionerError::NotCreated)?;
        let scale = diag
            .iter()
            .map(|&d| if d.abs() < self.eps_diagonal { 1.0 } else { 1.0 / d })
            .collect();
        self.op = Some(RowScaling::new(scale));
        Ok(())
    }

    fn operator(&self) -> Option<&RowScaling> {
        self.op.as_ref()
    }
}
