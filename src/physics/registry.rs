use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::physics::bc::{BoundaryCondition, BoundaryError, DirichletBc, NeumannBc, NewtonBc};

/// Boundary conditions of a problem, classified by kind and indexed by marker.
///
/// The registry borrows the conditions; the caller keeps ownership and the
/// conditions must outlive it. Every marker belongs to at most one condition.
#[derive(Debug, Default)]
pub struct BoundaryConditions<'a> {
    all: Vec<&'a BoundaryCondition>,
    dirichlet: Vec<&'a DirichletBc>,
    neumann: Vec<&'a NeumannBc>,
    newton: Vec<&'a NewtonBc>,
    markers: BTreeMap<String, &'a BoundaryCondition>,
}

impl<'a> BoundaryConditions<'a> {
    pub fn new<I>(conditions: I) -> Result<Self, BoundaryError>
    where
        I: IntoIterator<Item = &'a BoundaryCondition>,
    {
        let mut bcs = Self::default();
        for bc in conditions {
            bcs.all.push(bc);
            match bc {
                BoundaryCondition::Dirichlet(d) => bcs.dirichlet.push(d),
                BoundaryCondition::Neumann(n) => bcs.neumann.push(n),
                BoundaryCondition::Newton(r) => bcs.newton.push(r),
            }
        }
        bcs.create_marker_cache()?;
        Ok(bcs)
    }

    fn create_marker_cache(&mut self) -> Result<(), BoundaryError> {
        for &bc in &self.all {
            for marker in bc.markers() {
                match self.markers.entry(marker.clone()) {
                    Entry::Occupied(_) => {
                        return Err(BoundaryError::DuplicateMarker {
                            marker: marker.clone(),
                        });
                    }
                    Entry::Vacant(slot) => {
                        log::debug!("marker = {marker}, type = {}", bc.kind());
                        slot.insert(bc);
                    }
                }
            }
        }
        Ok(())
    }

    /// Condition owning `marker`. `None` means a natural boundary.
    pub fn get(&self, marker: &str) -> Option<&'a BoundaryCondition> {
        self.markers.get(marker).copied()
    }

    pub fn dirichlet_for(&self, marker: &str) -> Option<&'a DirichletBc> {
        match self.get(marker)? {
            BoundaryCondition::Dirichlet(bc) => Some(bc),
            _ => None,
        }
    }

    pub fn neumann_for(&self, marker: &str) -> Option<&'a NeumannBc> {
        match self.get(marker)? {
            BoundaryCondition::Neumann(bc) => Some(bc),
            _ => None,
        }
    }

    pub fn newton_for(&self, marker: &str) -> Option<&'a NewtonBc> {
        match self.get(marker)? {
            BoundaryCondition::Newton(bc) => Some(bc),
            _ => None,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &'a BoundaryCondition> + '_ {
        self.all.iter().copied()
    }

    pub fn dirichlet(&self) -> impl Iterator<Item = &'a DirichletBc> + '_ {
        self.dirichlet.iter().copied()
    }

    pub fn neumann(&self) -> impl Iterator<Item = &'a NeumannBc> + '_ {
        self.neumann.iter().copied()
    }

    pub fn newton(&self) -> impl Iterator<Item = &'a NewtonBc> + '_ {
        self.newton.iter().copied()
    }

    /// Marker cache in marker order.
    pub fn markers(&self) -> impl Iterator<Item = (&str, &'a BoundaryCondition)> + '_ {
        self.markers.iter().map(|(m, bc)| (m.as_str(), *bc))
    }

    /// Informs every condition of the time level about to be assembled.
    pub fn set_current_time(&self, time: f64) {
        for bc in &self.all {
            bc.set_current_time(time);
        }
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}
