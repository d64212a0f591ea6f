use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Point on the boundary where a condition is evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Shared boundary function of time and position.
pub type BcFn = Arc<dyn Fn(f64, Point) -> f64 + Send + Sync>;

/// Local trait allowing closures to be passed where a [`BcFn`] is expected.
pub trait IntoBcFn {
    fn into_bc_fn(self) -> BcFn;
}

impl<F> IntoBcFn for F
where
    F: Fn(f64, Point) -> f64 + Send + Sync + 'static,
{
    fn into_bc_fn(self) -> BcFn {
        Arc::new(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BcKind {
    Dirichlet,
    Neumann,
    Newton,
}

impl fmt::Display for BcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BcKind::Dirichlet => "Dirichlet",
            BcKind::Neumann => "Neumann",
            BcKind::Newton => "Newton",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error(
        "{kind} boundary condition: function used either for a constant condition, \
         or not redefined for nonconstant condition"
    )]
    UndefinedFunction { kind: BcKind },
    #[error(
        "attempt to define more than one description of the boundary condition \
         on the same part of the boundary with marker '{marker}'"
    )]
    DuplicateMarker { marker: String },
}

fn call(func: Option<&BcFn>, kind: BcKind, t: f64, p: Point) -> Result<f64, BoundaryError> {
    func.map(|f| f(t, p))
        .ok_or(BoundaryError::UndefinedFunction { kind })
}

/// Either a prescribed value (`u = g`) or, with a function, `u = g(t, x, y)`.
#[derive(Clone, Default)]
pub struct DirichletBc {
    markers: Vec<String>,
    current_time: Cell<f64>,
    value: f64,
    func: Option<BcFn>,
}

impl DirichletBc {
    pub fn constant(markers: impl IntoMarkers, value: f64) -> Self {
        Self {
            markers: markers.into_markers(),
            value,
            ..Self::default()
        }
    }

    pub fn with_function(markers: impl IntoMarkers, func: impl IntoBcFn) -> Self {
        Self {
            markers: markers.into_markers(),
            func: Some(func.into_bc_fn()),
            ..Self::default()
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_constant(&self) -> bool {
        self.func.is_none()
    }

    /// Non-constant evaluation path. Fails if no function was supplied.
    pub fn function(&self, p: Point) -> Result<f64, BoundaryError> {
        call(self.func.as_ref(), BcKind::Dirichlet, self.current_time.get(), p)
    }

    /// Function value if one was supplied, otherwise the constant.
    pub fn evaluate(&self, p: Point) -> f64 {
        match &self.func {
            Some(f) => f(self.current_time.get(), p),
            None => self.value,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time.get()
    }

    pub fn set_current_time(&self, time: f64) {
        self.current_time.set(time);
    }
}

/// Prescribed normal derivative `du/dn = g`.
#[derive(Clone, Default)]
pub struct NeumannBc {
    markers: Vec<String>,
    current_time: Cell<f64>,
    value: f64,
    func: Option<BcFn>,
}

impl NeumannBc {
    pub fn constant(markers: impl IntoMarkers, value: f64) -> Self {
        Self {
            markers: markers.into_markers(),
            value,
            ..Self::default()
        }
    }

    pub fn with_function(markers: impl IntoMarkers, func: impl IntoBcFn) -> Self {
        Self {
            markers: markers.into_markers(),
            func: Some(func.into_bc_fn()),
            ..Self::default()
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_constant(&self) -> bool {
        self.func.is_none()
    }

    pub fn function(&self, p: Point) -> Result<f64, BoundaryError> {
        call(self.func.as_ref(), BcKind::Neumann, self.current_time.get(), p)
    }

    pub fn evaluate(&self, p: Point) -> f64 {
        match &self.func {
            Some(f) => f(self.current_time.get(), p),
            None => self.value,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time.get()
    }

    pub fn set_current_time(&self, time: f64) {
        self.current_time.set(time);
    }
}

/// Newton (Robin-type) condition `du/dn = g - h * u`.
///
/// `u` holds the linear coefficient `h` and `g` the source term. Each component
/// is either constant or a function, independently of the other.
#[derive(Clone, Default)]
pub struct NewtonBc {
    markers: Vec<String>,
    current_time: Cell<f64>,
    value_u: f64,
    value_g: f64,
    func_u: Option<BcFn>,
    func_g: Option<BcFn>,
}

impl NewtonBc {
    pub fn constant(markers: impl IntoMarkers, value_u: f64, value_g: f64) -> Self {
        Self {
            markers: markers.into_markers(),
            value_u,
            value_g,
            ..Self::default()
        }
    }

    pub fn with_functions(
        markers: impl IntoMarkers,
        func_u: impl IntoBcFn,
        func_g: impl IntoBcFn,
    ) -> Self {
        Self {
            markers: markers.into_markers(),
            func_u: Some(func_u.into_bc_fn()),
            func_g: Some(func_g.into_bc_fn()),
            ..Self::default()
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn value_u(&self) -> f64 {
        self.value_u
    }

    pub fn value_g(&self) -> f64 {
        self.value_g
    }

    pub fn is_constant(&self) -> bool {
        self.func_u.is_none() && self.func_g.is_none()
    }

    pub fn function_u(&self, p: Point) -> Result<f64, BoundaryError> {
        call(self.func_u.as_ref(), BcKind::Newton, self.current_time.get(), p)
    }

    pub fn function_g(&self, p: Point) -> Result<f64, BoundaryError> {
        call(self.func_g.as_ref(), BcKind::Newton, self.current_time.get(), p)
    }

    /// Returns `(h, g)` at `p`, taking each from its function when present.
    pub fn evaluate(&self, p: Point) -> (f64, f64) {
        let t = self.current_time.get();
        let u = self.func_u.as_ref().map_or(self.value_u, |f| f(t, p));
        let g = self.func_g.as_ref().map_or(self.value_g, |f| f(t, p));
        (u, g)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time.get()
    }

    pub fn set_current_time(&self, time: f64) {
        self.current_time.set(time);
    }
}

#[derive(Clone)]
pub enum BoundaryCondition {
    Dirichlet(DirichletBc),
    Neumann(NeumannBc),
    Newton(NewtonBc),
}

impl BoundaryCondition {
    pub fn kind(&self) -> BcKind {
        match self {
            BoundaryCondition::Dirichlet(_) => BcKind::Dirichlet,
            BoundaryCondition::Neumann(_) => BcKind::Neumann,
            BoundaryCondition::Newton(_) => BcKind::Newton,
        }
    }

    pub fn markers(&self) -> &[String] {
        match self {
            BoundaryCondition::Dirichlet(bc) => bc.markers(),
            BoundaryCondition::Neumann(bc) => bc.markers(),
            BoundaryCondition::Newton(bc) => bc.markers(),
        }
    }

    pub fn current_time(&self) -> f64 {
        match self {
            BoundaryCondition::Dirichlet(bc) => bc.current_time(),
            BoundaryCondition::Neumann(bc) => bc.current_time(),
            BoundaryCondition::Newton(bc) => bc.current_time(),
        }
    }

    pub fn set_current_time(&self, time: f64) {
        match self {
            BoundaryCondition::Dirichlet(bc) => bc.set_current_time(time),
            BoundaryCondition::Neumann(bc) => bc.set_current_time(time),
            BoundaryCondition::Newton(bc) => bc.set_current_time(time),
        }
    }
}

impl From<DirichletBc> for BoundaryCondition {
    fn from(bc: DirichletBc) -> Self {
        BoundaryCondition::Dirichlet(bc)
    }
}

impl From<NeumannBc> for BoundaryCondition {
    fn from(bc: NeumannBc) -> Self {
        BoundaryCondition::Neumann(bc)
    }
}

impl From<NewtonBc> for BoundaryCondition {
    fn from(bc: NewtonBc) -> Self {
        BoundaryCondition::Newton(bc)
    }
}

impl fmt::Debug for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryCondition")
            .field("kind", &self.kind())
            .field("markers", &self.markers())
            .field("current_time", &self.current_time())
            .finish()
    }
}

impl fmt::Debug for DirichletBc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirichletBc")
            .field("markers", &self.markers)
            .field("value", &self.value)
            .field("constant", &self.is_constant())
            .finish()
    }
}

impl fmt::Debug for NeumannBc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeumannBc")
            .field("markers", &self.markers)
            .field("value", &self.value)
            .field("constant", &self.is_constant())
            .finish()
    }
}

impl fmt::Debug for NewtonBc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewtonBc")
            .field("markers", &self.markers)
            .field("value_u", &self.value_u)
            .field("value_g", &self.value_g)
            .field("constant", &self.is_constant())
            .finish()
    }
}

/// Conversion of marker lists (`"left"`, `["left", "top"]`, `vec![..]`).
pub trait IntoMarkers {
    fn into_markers(self) -> Vec<String>;
}

impl IntoMarkers for &str {
    fn into_markers(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoMarkers for String {
    fn into_markers(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoMarkers for Vec<String> {
    fn into_markers(self) -> Vec<String> {
        self
    }
}

impl IntoMarkers for Vec<&str> {
    fn into_markers(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl<const N: usize> IntoMarkers for [&str; N] {
    fn into_markers(self) -> Vec<String> {
        self.iter().map(|m| m.to_string()).collect()
    }
}
