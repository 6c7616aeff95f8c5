//! A small catalog of demonstration modules used by tests, the CLI's
//! example patches, and the integration test suite. Not the engine's
//! product surface — a real host brings its own module library.

mod clock;
mod gain;
mod mix;
mod sine;

pub use clock::Clock;
pub use gain::Gain;
pub use mix::Mix;
pub use sine::Sine;

use crate::serialize::ModuleRegistry;
use std::sync::Arc;

/// Populate `registry` with the demonstration catalog, for hosts (the CLI,
/// tests) that want `Graph::from_json` to understand patches built from it.
pub fn register_demo_modules(registry: &mut ModuleRegistry) {
    registry.register("sine", Arc::new(|| Box::new(Sine::new())));
    registry.register("gain", Arc::new(|| Box::new(Gain::new())));
    registry.register("mix", Arc::new(|| Box::new(Mix::new())));
    registry.register("clock", Arc::new(|| Box::new(Clock::new())));
}
