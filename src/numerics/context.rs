use kryst::parallel::{NoComm, UniverseComm};

/// Execution context threaded through the solver in place of a global communicator.
pub struct ExecutionContext {
    comm: UniverseComm,
}

impl ExecutionContext {
    /// Single-process context.
    pub fn serial() -> Self {
        Self {
            comm: UniverseComm::NoComm(NoComm {}),
        }
    }

    pub fn comm(&self) -> &UniverseComm {
        &self.comm
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::serial()
    }
}
