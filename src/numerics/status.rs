use nalgebra::DVector;

use crate::numerics::config::ConvergenceConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusType {
    Unconverged,
    Converged,
    /// Iteration cap reached without convergence.
    MaxIterations,
    /// A non-finite residual or iterate was detected.
    Diverged,
    /// The step could not be completed (linear solve, line search or assembly failure).
    Failed,
}

impl StatusType {
    pub fn is_converged(self) -> bool {
        self == StatusType::Converged
    }
}

/// Snapshot of the iteration seen by the status tests.
pub struct IterationState<'s> {
    pub iteration: u32,
    pub x: &'s DVector<f64>,
    pub f: &'s DVector<f64>,
    /// Iterate of the previous step; `None` before the first step.
    pub previous_x: Option<&'s DVector<f64>>,
    pub initial_f_norm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComboType {
    /// Converged only when every member has converged.
    And,
    /// First member not `Unconverged`, in insertion order.
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatusTest {
    /// `||F|| < tol`
    AbsResidual { tol: f64 },
    /// `||F|| / ||F_0|| < tol`
    RelResidual { tol: f64 },
    /// `||x_k - x_{k-1}|| < tol`
    Update { tol: f64 },
    /// Weighted root-mean-square update norm below one.
    Wrms { rtol: f64, atol: f64 },
    MaxIters { max: u32 },
    FiniteValue,
    Combo { kind: ComboType, tests: Vec<StatusTest> },
}

impl StatusTest {
    pub fn and(tests: Vec<StatusTest>) -> Self {
        StatusTest::Combo {
            kind: ComboType::And,
            tests,
        }
    }

    pub fn or(tests: Vec<StatusTest>) -> Self {
        StatusTest::Combo {
            kind: ComboType::Or,
            tests,
        }
    }

    pub fn check(&self, state: &IterationState) -> StatusType {
        use StatusType::*;
        let converged_if = |ok: bool| if ok { Converged } else { Unconverged };

        match self {
            StatusTest::AbsResidual { tol } => converged_if(state.f.norm() < *tol),
            StatusTest::RelResidual { tol } => {
                let f_norm = state.f.norm();
                if state.initial_f_norm == 0.0 {
                    converged_if(f_norm == 0.0)
                } else {
                    converged_if(f_norm / state.initial_f_norm < *tol)
                }
            }
            StatusTest::Update { tol } => match state.previous_x {
                Some(prev) => converged_if((state.x - prev).norm() < *tol),
                None => Unconverged,
            },
            StatusTest::Wrms { rtol, atol } => match state.previous_x {
                Some(prev) => converged_if(wrms_norm(state.x, prev, *rtol, *atol) < 1.0),
                None => Unconverged,
            },
            StatusTest::MaxIters { max } => {
                if state.iteration >= *max {
                    MaxIterations
                } else {
                    Unconverged
                }
            }
            StatusTest::FiniteValue => {
                let finite = state.f.iter().all(|v| v.is_finite())
                    && state.x.iter().all(|v| v.is_finite());
                if finite { Unconverged } else { Diverged }
            }
            StatusTest::Combo { kind, tests } => match kind {
                ComboType::Or => tests
                    .iter()
                    .map(|t| t.check(state))
                    .find(|s| *s != Unconverged)
                    .unwrap_or(Unconverged),
                ComboType::And => {
                    let mut all_converged = !tests.is_empty();
                    for status in tests.iter().map(|t| t.check(state)) {
                        match status {
                            Converged => {}
                            Unconverged => all_converged = false,
                            failure => return failure,
                        }
                    }
                    converged_if(all_converged)
                }
            },
        }
    }
}

fn wrms_norm(x: &DVector<f64>, prev: &DVector<f64>, rtol: f64, atol: f64) -> f64 {
    let n = x.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = x
        .iter()
        .zip(prev.iter())
        .map(|(xi, pi)| {
            let w = rtol * xi.abs() + atol;
            ((xi - pi) / w).powi(2)
        })
        .sum();
    (sum / n as f64).sqrt()
}

/// `FiniteValue OR (AbsResidual AND [RelResidual] AND [Update] AND [Wrms]) OR MaxIters`
pub fn build_status_tests(conv: &ConvergenceConfig) -> StatusTest {
    let mut converged = vec![StatusTest::AbsResidual {
        tol: conv.abs_resid,
    }];
    if conv.check_rel_resid {
        converged.push(StatusTest::RelResidual {
            tol: conv.rel_resid,
        });
    }
    if conv.check_update {
        converged.push(StatusTest::Update { tol: conv.update });
    }
    if conv.check_wrms {
        converged.push(StatusTest::Wrms {
            rtol: conv.wrms_rtol,
            atol: conv.wrms_atol,
        });
    }

    StatusTest::or(vec![
        StatusTest::FiniteValue,
        StatusTest::and(converged),
        StatusTest::MaxIters {
            max: conv.max_iterations,
        },
    ])
}
