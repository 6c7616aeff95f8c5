use crate::ids::ModuleId;
use crate::module::{Module, ModuleEvent};
use crate::param::{AtomicParam, Smoother};
use crate::port::PortRegister;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::AtomicU64;

/// Everything the graph keeps about one module, outside the module's own
/// trait-object state.
///
/// Split into a lock-free part ([`PortRegister`]s and [`AtomicParam`]s,
/// safely readable from any thread at any time) and a [`Mutex`]-guarded part
/// (the module itself, its smoothers, and bookkeeping that must be observed
/// consistently). Exactly one worker touches the mutex-guarded part at a
/// time, and always in the same thread for the module's whole block, so the
/// lock is never contended in practice — it exists for the type system, not
/// for real arbitration.
pub(crate) struct ModuleSlot {
    pub id: ModuleId,
    pub outputs: Vec<PortRegister>,
    /// `input_sources[i]` is the `(module, output port)` feeding input port
    /// `i`, or `None` if input `i` is unconnected. Wiring changes only
    /// happen between blocks (see [`crate::graph::container::Graph`]), so
    /// this lock is never contended while a block is in flight.
    pub input_sources: RwLock<Vec<Option<(ModuleId, usize)>>>,
    pub params: Vec<AtomicParam>,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub module_type: &'static str,
    pub state: Mutex<ModuleSlotState>,
    /// Frames of the current block this module has published so far.
    /// Reset to 0 by the coordinator before each block starts; bumped with
    /// `Release` ordering right after a frame's outputs are published, so a
    /// consumer's `Acquire` load pairs with it to make that frame's port
    /// writes visible before it reads them. This is what turns the "benign
    /// value race" on [`PortRegister`] into a deterministic one: a
    /// same-block forward cable (producer earlier in insertion order) always
    /// observes the current frame, never a stale one, because the consumer
    /// spins on this counter instead of just reading whatever happens to be
    /// there.
    pub frames_done: AtomicU64,
}

pub(crate) struct ModuleSlotState {
    pub module: Box<dyn Module>,
    pub smoothers: Vec<Smoother>,
    pub bypassed: bool,
    pub pending_events: Vec<ModuleEvent>,
}

impl ModuleSlot {
    pub fn new(id: ModuleId, mut module: Box<dyn Module>, sample_rate: f32) -> Self {
        let num_inputs = module.num_inputs();
        let num_outputs = module.num_outputs();
        let num_params = module.num_params();
        let module_type = module.module_type();

        module.on_event(ModuleEvent::Added);

        Self {
            id,
            outputs: (0..num_outputs).map(|_| PortRegister::new()).collect(),
            input_sources: RwLock::new(vec![None; num_inputs]),
            params: (0..num_params).map(|_| AtomicParam::new(0.0)).collect(),
            num_inputs,
            num_outputs,
            module_type,
            state: Mutex::new(ModuleSlotState {
                module,
                smoothers: (0..num_params)
                    .map(|_| Smoother::new(0.0, sample_rate))
                    .collect(),
                bypassed: false,
                pending_events: Vec::new(),
            }),
            frames_done: AtomicU64::new(0),
        }
    }
}
