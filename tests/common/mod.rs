#![allow(dead_code)]

use std::cell::Cell;

use fem_nl_rs::numerics::JacobianMatrix;
use fem_nl_rs::physics::{AssemblyError, BoundaryCondition, BoundaryConditions, FeProblem, Point};
use nalgebra::DVector;
use num_dual::{DualDVec64, DualNum};

pub const LEFT: &str = "left";
pub const RIGHT: &str = "right";

/// `-u'' + k u^3 = s` on `[0, length]`, linear elements, boundary nodes tagged
/// `left` and `right`. Untagged ends are natural (zero flux).
pub struct Bar1d<'a> {
    pub num_elements: usize,
    pub length: f64,
    pub k: f64,
    pub source: f64,
    pub bcs: BoundaryConditions<'a>,
    pub matrix_free: bool,
    /// Assembly fails once any `|u_i|` exceeds this bound.
    pub fail_above: Option<f64>,
    pub residual_calls: Cell<usize>,
    pub jacobian_calls: Cell<usize>,
}

impl<'a> Bar1d<'a> {
    pub fn new(num_elements: usize, bcs: BoundaryConditions<'a>) -> Self {
        Self {
            num_elements,
            length: 1.0,
            k: 1.0,
            source: 1.0,
            bcs,
            matrix_free: false,
            fail_above: None,
            residual_calls: Cell::new(0),
            jacobian_calls: Cell::new(0),
        }
    }

    pub fn linear(mut self) -> Self {
        self.k = 0.0;
        self.source = 0.0;
        self
    }

    pub fn matrix_free(mut self) -> Self {
        self.matrix_free = true;
        self
    }

    pub fn h(&self) -> f64 {
        self.length / self.num_elements as f64
    }

    pub fn node_x(&self, i: usize) -> f64 {
        i as f64 * self.h()
    }

    fn boundary_nodes(&self) -> [(usize, &'static str); 2] {
        [(0, LEFT), (self.num_elements, RIGHT)]
    }

    fn is_dirichlet(&self, node: usize) -> bool {
        self.boundary_nodes()
            .iter()
            .any(|&(i, marker)| i == node && self.bcs.dirichlet_for(marker).is_some())
    }
}

fn element_residual(h: f64, k: f64, s: f64, u: DVector<DualDVec64>) -> DVector<DualDVec64> {
    let c = |v: f64| DualDVec64::from_re(v);
    let (u0, u1) = (u[0].clone(), u[1].clone());

    let flux = (u1.clone() - u0.clone()) * c(1.0 / h);
    let mut r0 = -flux.clone();
    let mut r1 = flux;

    // two-point Gauss rule on the reference element [0, 1]
    let g = 0.5 / 3f64.sqrt();
    for xi in [0.5 - g, 0.5 + g] {
        let uq = u0.clone() * c(1.0 - xi) + u1.clone() * c(xi);
        let reaction = (uq.powi(3) * c(k) - c(s)) * c(0.5 * h);
        r0 = r0 + reaction.clone() * c(1.0 - xi);
        r1 = r1 + reaction * c(xi);
    }
    DVector::from_vec(vec![r0, r1])
}

impl FeProblem for Bar1d<'_> {
    fn num_dofs(&self) -> usize {
        self.num_elements + 1
    }

    fn is_matrix_free(&self) -> bool {
        self.matrix_free
    }

    fn assemble(
        &self,
        x: &DVector<f64>,
        mut jacobian: Option<&mut JacobianMatrix>,
        mut residual: Option<&mut DVector<f64>>,
        mut dirichlet: Option<&mut DVector<f64>>,
    ) -> Result<(), AssemblyError> {
        if let Some(limit) = self.fail_above {
            if x.amax() > limit {
                return Err(AssemblyError(format!("|u| = {} exceeds {limit}", x.amax())));
            }
        }
        if jacobian.is_some() {
            self.jacobian_calls.set(self.jacobian_calls.get() + 1);
        }
        if let Some(f) = residual.as_deref_mut() {
            self.residual_calls.set(self.residual_calls.get() + 1);
            f.fill(0.0);
        }

        let h = self.h();
        for e in 0..self.num_elements {
            let nodes = [e, e + 1];
            let local = DVector::from_vec(vec![x[e], x[e + 1]]);
            let (r_e, j_e) = num_dual::jacobian(
                |u: DVector<DualDVec64>| element_residual(h, self.k, self.source, u),
                local,
            );
            for (a, &i) in nodes.iter().enumerate() {
                if self.is_dirichlet(i) {
                    continue;
                }
                if let Some(f) = residual.as_deref_mut() {
                    f[i] += r_e[a];
                }
                if let Some(jac) = jacobian.as_deref_mut() {
                    for (b, &j) in nodes.iter().enumerate() {
                        jac.add(i, j, j_e[(a, b)]);
                    }
                }
            }
        }

        for (i, marker) in self.boundary_nodes() {
            let p = Point::new(self.node_x(i), 0.0);
            match self.bcs.get(marker) {
                None => {}
                Some(BoundaryCondition::Dirichlet(bc)) => {
                    let g = bc.evaluate(p);
                    if let Some(f) = residual.as_deref_mut() {
                        f[i] = x[i] - g;
                    }
                    if let Some(jac) = jacobian.as_deref_mut() {
                        jac.add(i, i, 1.0);
                    }
                    if let Some(d) = dirichlet.as_deref_mut() {
                        d[i] = g;
                    }
                }
                Some(BoundaryCondition::Neumann(bc)) => {
                    if let Some(f) = residual.as_deref_mut() {
                        f[i] -= bc.evaluate(p);
                    }
                }
                Some(BoundaryCondition::Newton(bc)) => {
                    let (coeff, g) = bc.evaluate(p);
                    if let Some(f) = residual.as_deref_mut() {
                        f[i] += coeff * x[i] - g;
                    }
                    if let Some(jac) = jacobian.as_deref_mut() {
                        jac.add(i, i, coeff);
                    }
                }
            }
        }
        Ok(())
    }

    fn create_jacobian(&self, jacobian: &mut JacobianMatrix) {
        jacobian.prealloc(self.num_dofs());
        for e in 0..self.num_elements {
            for i in [e, e + 1] {
                for j in [e, e + 1] {
                    jacobian.pre_add_ij(i, j);
                }
            }
        }
        jacobian.alloc();
    }
}

/// Problem without unknowns; counts every assembly request.
#[derive(Default)]
pub struct EmptyProblem {
    pub assemble_calls: Cell<usize>,
}

impl FeProblem for EmptyProblem {
    fn num_dofs(&self) -> usize {
        0
    }

    fn assemble(
        &self,
        _x: &DVector<f64>,
        _jacobian: Option<&mut JacobianMatrix>,
        _residual: Option<&mut DVector<f64>>,
        _dirichlet: Option<&mut DVector<f64>>,
    ) -> Result<(), AssemblyError> {
        self.assemble_calls.set(self.assemble_calls.get() + 1);
        Ok(())
    }

    fn create_jacobian(&self, jacobian: &mut JacobianMatrix) {
        jacobian.prealloc(0);
        jacobian.alloc();
    }
}

/// Finite-difference Jacobian of the assembled residual, column by column.
pub fn fd_jacobian<P: FeProblem>(
    problem: &P,
    x: &DVector<f64>,
    eps: f64,
) -> nalgebra::DMatrix<f64> {
    let n = problem.num_dofs();
    let mut base = DVector::zeros(n);
    problem
        .assemble(x, None, Some(&mut base), None)
        .expect("residual at base point");

    let mut jac = nalgebra::DMatrix::zeros(n, n);
    let mut xp = x.clone();
    let mut fp = DVector::zeros(n);
    for j in 0..n {
        xp[j] += eps;
        problem
            .assemble(&xp, None, Some(&mut fp), None)
            .expect("residual at perturbed point");
        jac.set_column(j, &((&fp - &base) / eps));
        xp[j] = x[j];
    }
    jac
}
