//! Real-time modular audio/CV synthesis engine.
//!
//! A [`graph::Graph`] of [`module::Module`]s connected by cables, stepped
//! sample-accurately by a worker-thread pool. This crate is a pure library
//! with no audio driver, MIDI, or transport-protocol concerns — those
//! belong to a host built on top of it (see `modular_cli` for a minimal
//! one).

pub mod error;
pub mod fallback_clock;
pub mod graph;
pub mod ids;
pub mod meter;
pub mod module;
pub mod param;
pub mod param_handle;
pub mod port;
pub mod serialize;

pub mod modules;

pub use error::{EngineError, Result};
pub use graph::{Cable, Graph, StepReport};
pub use ids::{CableId, ModuleId, ParamHandleId};
pub use module::{BypassRoute, EngineHandle, Module, ModuleEvent, ProcessContext};
pub use port::{PortBuffer, MAX_CHANNELS};
