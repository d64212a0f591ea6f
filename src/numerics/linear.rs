use std::sync::Arc;

use kryst::preconditioner::PcSide;
use kryst::solver::LinearSolver;
use nalgebra::DVector;

use crate::numerics::config::{LinearSolverConfig, LinearSolverKind};
use crate::numerics::context::ExecutionContext;
use crate::numerics::error::SolverError;
use crate::numerics::jacobian::JacobianMatrix;
use crate::numerics::precond::RowScaling;

pub struct LinearSolution {
    pub dx: DVector<f64>,
}

/// Solves `J dx = rhs`, left-preconditioned by `scaling` when given.
pub fn solve(
    settings: &LinearSolverConfig,
    jacobian: &JacobianMatrix,
    rhs: &DVector<f64>,
    scaling: Option<&RowScaling>,
    ctx: &ExecutionContext,
) -> Result<LinearSolution, SolverError> {
    let n = rhs.len();
    if jacobian.size() != n || scaling.is_some_and(|s| s.len() != n) {
        return Err(SolverError::LinearSolveFailed);
    }

    let b = match scaling {
        Some(s) => s.apply(rhs),
        None => rhs.clone(),
    };
    if !b.iter().all(|x| x.is_finite()) {
        log::error!("right-hand side contains NaN or Inf");
        return Err(SolverError::LinearSolveFailed);
    }

    let solution = match settings.solver {
        LinearSolverKind::Lu => solve_lu(jacobian, &b, scaling)?,
        LinearSolverKind::BiCgStab => solve_bicgstab(settings, jacobian, &b, scaling, ctx)?,
    };

    if !solution.dx.iter().all(|v| v.is_finite()) {
        log::error!("linear solver produced NaN/Inf");
        return Err(SolverError::LinearSolveFailed);
    }
    Ok(solution)
}

fn solve_lu(
    jacobian: &JacobianMatrix,
    b: &DVector<f64>,
    scaling: Option<&RowScaling>,
) -> Result<LinearSolution, SolverError> {
    let mut dense = jacobian.to_dense();
    if let Some(s) = scaling {
        for (r, &scale) in s.as_slice().iter().enumerate() {
            let mut row = dense.row_mut(r);
            row *= scale;
        }
    }
    let dx = dense.lu().solve(b).ok_or(SolverError::LinearSolveFailed)?;
    Ok(LinearSolution { dx })
}

fn solve_bicgstab(
    settings: &LinearSolverConfig,
    jacobian: &JacobianMatrix,
    b: &DVector<f64>,
    scaling: Option<&RowScaling>,
    ctx: &ExecutionContext,
) -> Result<LinearSolution, SolverError> {
    let n = b.len();
    let csr = jacobian.to_csr(scaling.map(RowScaling::as_slice));
    let op = kryst::matrix::op::CsrOp::new(Arc::new(csr));

    let mut bicgstab_solver =
        kryst::solver::bicgstab::BiCgStabSolver::new(settings.tolerance, settings.max_iterations);
    let mut workspace = kryst::context::ksp_context::Workspace::new(n);
    bicgstab_solver.setup_workspace(&mut workspace);

    let mut dx = DVector::from_element(n, 0.0);
    let result = bicgstab_solver.solve(
        &op,
        None,
        b.as_slice(),
        dx.as_mut_slice(),
        PcSide::Left,
        ctx.comm(),
        None,
        Some(&mut workspace),
    );

    match result {
        Ok(stats) => {
            log::trace!("BiCGStab: {:?}", stats);
            Ok(LinearSolution { dx })
        }
        Err(e) => {
            log::warn!("linear solve failed: {:?}", e);
            Err(SolverError::LinearSolveFailed)
        }
    }
}

/// Breakdown threshold for the BiCGStab inner products, relative to `|b|^2`.
const BREAKDOWN: f64 = 1e-30;

/// Tightest relative target used with finite-difference products.
const DIRECTIONAL_RTOL: f64 = 1e-8;

/// Solves `J dx = rhs` where `J` is only available through products `J v`.
///
/// `apply` writes `J v` into its second argument. With `scaling`, both the
/// products and `rhs` are row-scaled before the Krylov iteration.
pub fn solve_matrix_free<A>(
    settings: &LinearSolverConfig,
    mut apply: A,
    rhs: &DVector<f64>,
    scaling: Option<&RowScaling>,
) -> Result<LinearSolution, SolverError>
where
    A: FnMut(&DVector<f64>, &mut DVector<f64>) -> Result<(), SolverError>,
{
    let n = rhs.len();
    if settings.solver != LinearSolverKind::BiCgStab || scaling.is_some_and(|s| s.len() != n) {
        return Err(SolverError::LinearSolveFailed);
    }
    let mut op = |v: &DVector<f64>, out: &mut DVector<f64>| -> Result<(), SolverError> {
        apply(v, out)?;
        if let Some(s) = scaling {
            *out = s.apply(out);
        }
        Ok(())
    };

    let b = match scaling {
        Some(s) => s.apply(rhs),
        None => rhs.clone(),
    };
    if !b.iter().all(|x| x.is_finite()) {
        log::error!("right-hand side contains NaN or Inf");
        return Err(SolverError::LinearSolveFailed);
    }

    let mut dx = DVector::zeros(n);
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(LinearSolution { dx });
    }
    let tol = settings.tolerance.max(DIRECTIONAL_RTOL) * b_norm;
    let stag_tol = BREAKDOWN * b_norm * b_norm;

    let mut r = b.clone();
    let r0 = b;
    let mut p = DVector::zeros(n);
    let mut v = DVector::zeros(n);
    let mut s = DVector::zeros(n);
    let mut t = DVector::zeros(n);
    let mut rho_old = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;

    for iter in 0..settings.max_iterations {
        let rho = r0.dot(&r);
        if rho.abs() < stag_tol {
            break;
        }
        let beta = if iter == 0 {
            0.0
        } else {
            (rho / rho_old) * (alpha / omega)
        };
        rho_old = rho;

        // p = r + beta * (p - omega * v)
        p.axpy(-omega, &v, 1.0);
        p.axpy(1.0, &r, beta);

        op(&p, &mut v)?;
        let r0v = r0.dot(&v);
        if r0v.abs() < stag_tol {
            break;
        }
        alpha = rho / r0v;

        s.copy_from(&r);
        s.axpy(-alpha, &v, 1.0);
        if s.norm() <= tol {
            dx.axpy(alpha, &p, 1.0);
            log::trace!("matrix-free BiCGStab converged in {} iterations", iter + 1);
            return finite(dx);
        }

        op(&s, &mut t)?;
        let tt = t.dot(&t);
        if tt < stag_tol {
            break;
        }
        omega = t.dot(&s) / tt;

        dx.axpy(alpha, &p, 1.0);
        dx.axpy(omega, &s, 1.0);
        r.copy_from(&s);
        r.axpy(-omega, &t, 1.0);

        let res_norm = r.norm();
        log::trace!("matrix-free BiCGStab iter {}: residual = {:.6e}", iter + 1, res_norm);
        if res_norm <= tol {
            return finite(dx);
        }
        if omega.abs() < BREAKDOWN {
            break;
        }
    }

    log::warn!(
        "matrix-free BiCGStab stopped at residual {:.3e} (target {:.3e})",
        r.norm(),
        tol
    );
    Err(SolverError::LinearSolveFailed)
}

fn finite(dx: DVector<f64>) -> Result<LinearSolution, SolverError> {
    if !dx.iter().all(|v| v.is_finite()) {
        log::error!("linear solver produced NaN/Inf");
        return Err(SolverError::LinearSolveFailed);
    }
    Ok(LinearSolution { dx })
}
