use crate::ids::{CableId, ModuleId};
use serde::{Deserialize, Serialize};

/// A directed connection from one module's output port to another module's
/// input port.
///
/// An input port accepts at most one cable; an output port may fan out to
/// any number of cables (and any number of modules may read it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    pub id: CableId,
    pub source_module: ModuleId,
    pub source_port: usize,
    pub target_module: ModuleId,
    pub target_port: usize,
}
