use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::numerics::error::SolverError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "Newton")]
    Newton,
    #[serde(rename = "Modified-Newton")]
    ModifiedNewton,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    #[default]
    #[serde(rename = "Full Step")]
    FullStep,
    #[serde(rename = "Backtrack")]
    Backtrack,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    #[serde(rename = "LU")]
    Lu,
    #[default]
    #[serde(rename = "BiCGStab")]
    BiCgStab,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Newton => "Newton",
            Direction::ModifiedNewton => "Modified-Newton",
        })
    }
}

impl fmt::Display for LineSearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LineSearchMethod::FullStep => "Full Step",
            LineSearchMethod::Backtrack => "Backtrack",
        })
    }
}

impl fmt::Display for LinearSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinearSolverKind::Lu => "LU",
            LinearSolverKind::BiCgStab => "BiCGStab",
        })
    }
}

impl FromStr for Direction {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Newton" => Ok(Direction::Newton),
            "Modified-Newton" => Ok(Direction::ModifiedNewton),
            other => Err(SolverError::InvalidConfig(format!(
                "unknown nonlinear direction '{other}'"
            ))),
        }
    }
}

impl FromStr for LineSearchMethod {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full Step" => Ok(LineSearchMethod::FullStep),
            "Backtrack" => Ok(LineSearchMethod::Backtrack),
            other => Err(SolverError::InvalidConfig(format!(
                "unknown line search method '{other}'"
            ))),
        }
    }
}

impl FromStr for LinearSolverKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LU" => Ok(LinearSolverKind::Lu),
            "BiCGStab" => Ok(LinearSolverKind::BiCgStab),
            other => Err(SolverError::InvalidConfig(format!(
                "unknown linear solver '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverConfig {
    pub solver: LinearSolverKind,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Restart length for restarted Krylov methods; BiCGStab does not restart.
    pub krylov_subspace_size: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            solver: LinearSolverKind::BiCgStab,
            max_iterations: 500,
            tolerance: 1e-10,
            krylov_subspace_size: 50,
        }
    }
}

/// Convergence criteria. The absolute residual test is always active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    pub max_iterations: u32,
    pub abs_resid: f64,
    pub rel_resid: f64,
    pub update: f64,
    pub wrms_rtol: f64,
    pub wrms_atol: f64,
    pub check_rel_resid: bool,
    pub check_update: bool,
    pub check_wrms: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            abs_resid: 1.0e-8,
            rel_resid: 1.0e-2,
            update: 1.0e-5,
            wrms_rtol: 1.0e-2,
            wrms_atol: 1.0e-8,
            check_rel_resid: false,
            check_update: false,
            check_wrms: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    pub direction: Direction,
    pub line_search: LineSearchMethod,
    pub linear: LinearSolverConfig,
    pub verbose: bool,
    pub convergence: ConvergenceConfig,
}

fn positive(name: &str, value: f64) -> Result<(), SolverError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SolverError::InvalidConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

impl NonlinearConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        positive("linear.tolerance", self.linear.tolerance)?;
        if self.linear.max_iterations == 0 {
            return Err(SolverError::InvalidConfig(
                "linear.max_iterations must be at least 1".into(),
            ));
        }
        if self.linear.krylov_subspace_size == 0 {
            return Err(SolverError::InvalidConfig(
                "linear.krylov_subspace_size must be at least 1".into(),
            ));
        }
        let conv = &self.convergence;
        positive("convergence.abs_resid", conv.abs_resid)?;
        if conv.check_rel_resid {
            positive("convergence.rel_resid", conv.rel_resid)?;
        }
        if conv.check_update {
            positive("convergence.update", conv.update)?;
        }
        if conv.check_wrms {
            positive("convergence.wrms_rtol", conv.wrms_rtol)?;
            positive("convergence.wrms_atol", conv.wrms_atol)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NonlinearMethod {
    #[default]
    LineSearchBased,
}

/// How the Jacobian reaches the linear solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JacobianMode {
    /// Assembled by the problem into the solver-owned matrix.
    Assembled,
    /// Applied only as finite-difference products `J v`, never formed.
    MatrixFree,
    /// Directional derivatives, preconditioned by the attached preconditioner.
    MatrixFreePreconditioned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreconditionerMode {
    None,
    UserDefined { max_age: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSearchParams {
    pub method: LineSearchMethod,
    /// Sufficient decrease parameter for backtracking.
    pub armijo_param: f64,
    pub min_step_size: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionParams {
    pub method: Direction,
    /// Iterations a Jacobian is reused for (1 recomputes every iteration).
    pub max_jacobian_age: u32,
}

/// Parameter tree handed to the Newton backend for one solve.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverParameters {
    pub method: NonlinearMethod,
    pub line_search: LineSearchParams,
    pub direction: DirectionParams,
    pub linear: LinearSolverConfig,
    pub preconditioner: PreconditionerMode,
    pub jacobian: JacobianMode,
    pub verbose: bool,
}

impl SolverParameters {
    pub fn build(
        config: &NonlinearConfig,
        matrix_free: bool,
        has_preconditioner: bool,
    ) -> Result<Self, SolverError> {
        config.validate()?;
        if matrix_free && config.linear.solver == LinearSolverKind::Lu {
            return Err(SolverError::InvalidConfig(
                "a matrix-free problem needs an iterative linear solver, not LU".into(),
            ));
        }

        let max_jacobian_age = match config.direction {
            Direction::Newton => 1,
            Direction::ModifiedNewton => 2,
        };
        let preconditioner = if has_preconditioner {
            PreconditionerMode::UserDefined { max_age: 5 }
        } else {
            PreconditionerMode::None
        };
        let jacobian = match (matrix_free, has_preconditioner) {
            (false, _) => JacobianMode::Assembled,
            (true, false) => JacobianMode::MatrixFree,
            (true, true) => JacobianMode::MatrixFreePreconditioned,
        };

        let params = Self {
            method: NonlinearMethod::LineSearchBased,
            line_search: LineSearchParams {
                method: config.line_search,
                armijo_param: 1e-4,
                min_step_size: 1e-3,
            },
            direction: DirectionParams {
                method: config.direction,
                max_jacobian_age,
            },
            linear: config.linear.clone(),
            preconditioner,
            jacobian,
            verbose: config.verbose,
        };
        log::debug!("{params:?}");
        Ok(params)
    }
}
