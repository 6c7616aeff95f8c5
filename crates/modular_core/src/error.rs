//! Error kinds surfaced by the graph container.
//!
//! `process`/`on_event` on a [`crate::module::Module`] do not return a
//! `Result` — they run on the audio thread and a non-realtime error path
//! would burden the hot loop. A module that panics during `process` is
//! caught at the worker boundary (see [`crate::graph::worker`]) and reported
//! as a [`EngineError::ModuleFault`] instead.

use crate::ids::{CableId, ModuleId, ParamHandleId};

/// Errors returned by fallible [`crate::graph::Graph`] operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("module id {0:?} already exists in the graph")]
    DuplicateModuleId(ModuleId),

    #[error("cable id {0:?} already exists in the graph")]
    DuplicateCableId(CableId),

    #[error("module {0:?} is not present in the graph")]
    UnknownModule(ModuleId),

    #[error("cable {0:?} is not present in the graph")]
    UnknownCable(CableId),

    #[error("param handle {0:?} is not present in the registry")]
    UnknownParamHandle(ParamHandleId),

    #[error("module {module:?} has no output port {port}")]
    UnknownOutputPort { module: ModuleId, port: usize },

    #[error("module {module:?} has no input port {port}")]
    UnknownInputPort { module: ModuleId, port: usize },

    #[error("module {module:?} has no param {param}")]
    UnknownParam { module: ModuleId, param: usize },

    #[error("input port {module:?}.{port} already has an incoming cable")]
    InputPortAlreadyConnected { module: ModuleId, port: usize },

    #[error("malformed graph JSON: {0}")]
    Serialization(String),

    #[error("a module panicked during process(): {module:?} ({message})")]
    ModuleFault { module: ModuleId, message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
