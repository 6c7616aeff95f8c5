//! The [`Module`] trait: the unit of DSP the graph schedules.
//!
//! A module declares a fixed port/param shape at construction time (the
//! graph never resizes it) and implements `process` to consume one frame's
//! worth of input voltages and parameter values, producing one frame's
//! worth of output voltages.

use crate::port::PortBuffer;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle and transport events delivered via [`Module::on_event`].
///
/// These arrive on the step-block thread, never mid-frame: the scheduler
/// drains a module's pending events immediately before that module's next
/// `process()` call, so a module never observes `Reset` and a stale output
/// buffer in the same frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    /// The module was just added to the graph and has not yet processed a
    /// frame.
    Added,
    /// The module is about to be removed from the graph; this is the last
    /// event it will receive.
    Removed,
    /// Host requested the module return to its initial state.
    Reset,
    /// Host requested randomized parameter/internal state.
    Randomize,
    /// The module was bypassed: `process` will not be called again until a
    /// matching `UnBypass`. Implementors that need the bypass passthrough
    /// behavior described by [`Module::bypass_routes`] don't need to do
    /// anything here; the scheduler applies the route itself.
    Bypass,
    UnBypass,
    /// The engine's sample rate changed; modules with sample-rate-dependent
    /// internal state (filter coefficients, oscillator phase increments)
    /// should recompute it here rather than every frame.
    SampleRateChange { sample_rate: f32 },
    /// Host is about to serialize the graph; gives the module a chance to
    /// flush any state it only updates lazily. Most modules ignore this.
    Save,
}

/// A direct input-to-output passthrough applied while a module is bypassed.
///
/// `BassBoost` bypassed should still pass audio through; `Clock` bypassed
/// should go silent. A module declares which routes make sense for it via
/// [`Module::bypass_routes`]; the scheduler copies `input` to `output`
/// verbatim for every declared route and skips `process` entirely.
#[derive(Debug, Clone, Copy)]
pub struct BypassRoute {
    pub input: usize,
    pub output: usize,
}

/// A module's narrow window into the engine while inside its own `process`.
///
/// Currently just [`Self::set_yield_workers`]: a CPU-heavy module (a
/// convolution reverb doing a big FFT this block, say) can shrink the
/// worker pool's spin-wait down to a condvar park for this block without
/// the host having to notice and do it from outside.
#[derive(Clone, Copy)]
pub struct EngineHandle<'a> {
    yield_workers: &'a AtomicBool,
}

impl<'a> EngineHandle<'a> {
    pub(crate) fn new(yield_workers: &'a AtomicBool) -> Self {
        Self { yield_workers }
    }

    /// A handle backed by nothing in particular, for constructing a
    /// [`ProcessContext`] outside a running worker pool (module unit tests).
    pub fn noop() -> EngineHandle<'static> {
        static NOOP: AtomicBool = AtomicBool::new(false);
        EngineHandle {
            yield_workers: &NOOP,
        }
    }

    pub fn set_yield_workers(&self, yield_workers: bool) {
        self.yield_workers.store(yield_workers, Ordering::Relaxed);
    }
}

/// Everything a module needs to produce one frame.
pub struct ProcessContext<'a> {
    pub inputs: &'a [PortBuffer],
    pub outputs: &'a mut [PortBuffer],
    /// Current (already-smoothed) value of each of the module's params, in
    /// declaration order.
    pub params: &'a [f32],
    pub sample_rate: f32,
    /// Global frame counter, monotonically increasing for the lifetime of
    /// the graph (wraps only after ~13 years at 48kHz).
    pub frame: u64,
    pub engine: EngineHandle<'a>,
}

/// The unit of DSP processed by the graph.
///
/// Implementors own their own internal state (oscillator phase, filter
/// memory, sequencer position) but never their port buffers — those live in
/// the graph's module slot so the scheduler can wire cables without
/// reaching into implementation-specific fields.
pub trait Module: Send {
    /// Stable type name, used in JSON serialization and diagnostics.
    fn module_type(&self) -> &'static str;

    fn num_inputs(&self) -> usize;
    fn num_outputs(&self) -> usize;

    fn num_params(&self) -> usize {
        0
    }

    /// Produce one frame of output from one frame of input and params.
    ///
    /// Must not block, allocate, or panic on well-formed input. A panic is
    /// caught at the worker boundary and reported as a module fault, but the
    /// module's internal state afterward is unspecified.
    fn process(&mut self, ctx: &mut ProcessContext);

    /// React to a lifecycle event. Default implementation ignores all
    /// events, which is correct for most stateless modules.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: ModuleEvent) {}

    /// Input/output pairs that should pass through verbatim while this
    /// module is bypassed. Empty (the default) means bypass silences all
    /// outputs.
    fn bypass_routes(&self) -> &[BypassRoute] {
        &[]
    }

    /// Serialize module-specific state beyond ports/params/cables (e.g. a
    /// sequencer's step pattern). Default produces no extra state.
    fn to_json(&self) -> Value {
        Value::Null
    }

    /// Restore module-specific state previously produced by `to_json`.
    /// Default ignores it.
    #[allow(unused_variables)]
    fn from_json(&mut self, data: &Value) {}
}
