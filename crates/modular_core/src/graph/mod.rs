//! The graph container: topology storage, the worker pool, and the
//! per-block scheduling loop.

mod cable;
mod container;
mod module_slot;
mod worker;

pub use cable::Cable;
pub use container::{Graph, StepReport};
