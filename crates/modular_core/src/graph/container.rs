//! The [`Graph`]: the graph container component, C7.
//!
//! Holds the module/cable topology behind a [`parking_lot::RwLock`] and the
//! worker pool that processes it. Topology-mutating calls (`add_module`,
//! `add_cable`, ...) take the write lock; [`Graph::step_block`] takes the
//! read lock for the full duration of the block, so a block's topology is
//! frozen start to finish and concurrent mutation simply waits for the
//! in-flight block to finish — standard `RwLock` semantics, not bespoke
//! bookkeeping.

use crate::error::{EngineError, Result};
use crate::graph::cable::Cable;
use crate::graph::module_slot::ModuleSlot;
use crate::graph::worker::WorkerPool;
use crate::ids::{CableId, IdAllocator, ModuleId};
use crate::meter::{CpuLoad, CpuMeter};
use crate::module::{Module, ModuleEvent};
use crate::param_handle::{ModuleParam, ParamHandleRegistry};
use crate::port::PortBuffer;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct GraphState {
    pub modules: HashMap<ModuleId, Arc<ModuleSlot>>,
    pub order: Vec<ModuleId>,
    pub cables: HashMap<CableId, Cable>,
    pub sample_rate: f32,
    pub master_module: Option<ModuleId>,
}

/// Result of one [`Graph::step_block`] call.
#[derive(Debug, Default)]
pub struct StepReport {
    pub frames: usize,
    /// Modules that panicked during this block, along with their panic
    /// message. The module's internal state afterward is unspecified but
    /// the graph itself remains consistent.
    pub faults: Vec<(ModuleId, String)>,
}

pub struct Graph {
    pub(crate) state: RwLock<GraphState>,
    step_mutex: Mutex<()>,
    id_alloc: IdAllocator,
    pub param_handles: ParamHandleRegistry,
    pool: WorkerPool,
    meter: Mutex<CpuMeter>,
    frame_counter: AtomicU64,
    block_counter: AtomicU64,
}

impl Graph {
    pub fn new(sample_rate: f32, num_workers: usize) -> Self {
        Self {
            state: RwLock::new(GraphState {
                modules: HashMap::new(),
                order: Vec::new(),
                cables: HashMap::new(),
                sample_rate,
                master_module: None,
            }),
            step_mutex: Mutex::new(()),
            id_alloc: IdAllocator::new(),
            param_handles: ParamHandleRegistry::new(),
            pool: WorkerPool::new(num_workers),
            meter: Mutex::new(CpuMeter::new()),
            frame_counter: AtomicU64::new(0),
            block_counter: AtomicU64::new(0),
        }
    }

    /// Number of elapsed samples since the graph was created. Lock-free;
    /// safe to poll from a UI thread while a block is in flight.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    pub fn block_count(&self) -> u64 {
        self.block_counter.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> f32 {
        self.state.read().sample_rate
    }

    pub fn cpu_load(&self) -> CpuLoad {
        self.meter.lock().load()
    }

    /// Let the host trade scheduling latency for idle CPU usage: when set,
    /// workers block on a condvar between blocks instead of spin-waiting.
    /// Appropriate when the transport is paused or running far below
    /// real-time.
    pub fn set_yield_workers(&self, yield_workers: bool) {
        self.pool.set_yield_workers(yield_workers);
    }

    /// Current state of the yield-workers flag — flippable either by the
    /// host via [`Self::set_yield_workers`] or by a module itself from
    /// inside `process` via [`crate::module::EngineHandle::set_yield_workers`].
    pub fn yield_workers(&self) -> bool {
        self.pool.yield_workers()
    }

    // -- topology: modules -------------------------------------------------

    pub fn add_module(&self, module: Box<dyn Module>) -> ModuleId {
        let id = self.id_alloc.next_module();
        self.insert_module_with_id(id, module)
            .expect("freshly allocated module id cannot already be present");
        id
    }

    /// Shared by `add_module` (fresh id) and `serialize::from_json`
    /// (id restored verbatim from a saved patch). Errors rather than
    /// silently overwriting if `id` is already present — losing the
    /// existing slot would also orphan its cables and param handles.
    pub(crate) fn insert_module_with_id(&self, id: ModuleId, module: Box<dyn Module>) -> Result<()> {
        let sample_rate = {
            let state = self.state.read();
            if state.modules.contains_key(&id) {
                return Err(EngineError::DuplicateModuleId(id));
            }
            state.sample_rate
        };
        let slot = Arc::new(ModuleSlot::new(id, module, sample_rate));
        let mut state = self.state.write();
        if state.modules.contains_key(&id) {
            return Err(EngineError::DuplicateModuleId(id));
        }
        state.modules.insert(id, slot);
        state.order.push(id);
        self.id_alloc.observe(id.0);
        Ok(())
    }

    pub fn remove_module(&self, id: ModuleId) -> Result<()> {
        let mut state = self.state.write();
        let slot = state
            .modules
            .remove(&id)
            .ok_or(EngineError::UnknownModule(id))?;
        state.order.retain(|m| *m != id);
        let doomed: Vec<CableId> = state
            .cables
            .values()
            .filter(|c| c.source_module == id || c.target_module == id)
            .map(|c| c.id)
            .collect();
        for cable_id in doomed {
            let cable = state.cables.remove(&cable_id).expect("cable id came from state.cables");
            if let Some(target) = state.modules.get(&cable.target_module) {
                if let Some(slot) = target.input_sources.write().get_mut(cable.target_port) {
                    *slot = None;
                }
            }
        }
        if state.master_module == Some(id) {
            state.master_module = None;
        }
        drop(state);
        slot.state.lock().module.on_event(ModuleEvent::Removed);
        self.param_handles.remove_module(id);
        Ok(())
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.state.read().order.clone()
    }

    pub fn set_master(&self, module: Option<ModuleId>) -> Result<()> {
        let mut state = self.state.write();
        if let Some(id) = module {
            if !state.modules.contains_key(&id) {
                return Err(EngineError::UnknownModule(id));
            }
        }
        state.master_module = module;
        Ok(())
    }

    /// The module currently designated as master, if any. When set, an
    /// external driver (an audio callback, typically) is expected to call
    /// `step_block` itself; the fallback clock backs off while this is set.
    pub fn master_module(&self) -> Option<ModuleId> {
        self.state.read().master_module
    }

    /// The master module's current output ports, read directly from their
    /// lock-free registers — this is the "audio out" the fallback clock or
    /// a host audio callback pulls each block.
    pub fn master_outputs(&self) -> Option<Vec<PortBuffer>> {
        let state = self.state.read();
        let id = state.master_module?;
        let slot = state.modules.get(&id)?;
        Some(slot.outputs.iter().map(|o| o.snapshot()).collect())
    }

    // -- topology: cables ----------------------------------------------------

    pub fn add_cable(
        &self,
        source_module: ModuleId,
        source_port: usize,
        target_module: ModuleId,
        target_port: usize,
    ) -> Result<CableId> {
        let mut state = self.state.write();

        {
            let source = state
                .modules
                .get(&source_module)
                .ok_or(EngineError::UnknownModule(source_module))?;
            if source_port >= source.num_outputs {
                return Err(EngineError::UnknownOutputPort {
                    module: source_module,
                    port: source_port,
                });
            }
        }
        {
            let target = state
                .modules
                .get(&target_module)
                .ok_or(EngineError::UnknownModule(target_module))?;
            if target_port >= target.num_inputs {
                return Err(EngineError::UnknownInputPort {
                    module: target_module,
                    port: target_port,
                });
            }
            if target.input_sources.read()[target_port].is_some() {
                return Err(EngineError::InputPortAlreadyConnected {
                    module: target_module,
                    port: target_port,
                });
            }
        }

        let id = self.id_alloc.next_cable();
        let cable = Cable {
            id,
            source_module,
            source_port,
            target_module,
            target_port,
        };
        state.cables.insert(id, cable);

        let target_slot = state.modules.get(&target_module).unwrap();
        target_slot.input_sources.write()[target_port] = Some((source_module, source_port));

        Ok(id)
    }

    pub fn remove_cable(&self, id: CableId) -> Result<()> {
        let mut state = self.state.write();
        let cable = state.cables.remove(&id).ok_or(EngineError::UnknownCable(id))?;
        if let Some(target_slot) = state.modules.get(&cable.target_module) {
            if let Some(slot) = target_slot.input_sources.write().get_mut(cable.target_port) {
                *slot = None;
            }
        }
        Ok(())
    }

    pub fn cable_ids(&self) -> Vec<CableId> {
        self.state.read().cables.keys().copied().collect()
    }

    pub fn cables(&self) -> Vec<Cable> {
        self.state.read().cables.values().copied().collect()
    }

    // -- params --------------------------------------------------------------

    pub fn set_param(&self, module: ModuleId, param: usize, value: f32) -> Result<()> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        let atom = slot
            .params
            .get(param)
            .ok_or(EngineError::UnknownParam { module, param })?;
        atom.set(value);
        Ok(())
    }

    /// Current *smoothed* value, i.e. what `process` is actually reading
    /// this block, not the most recently set target.
    pub fn get_param(&self, module: ModuleId, param: usize) -> Result<f32> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        if param >= slot.params.len() {
            return Err(EngineError::UnknownParam { module, param });
        }
        Ok(slot.state.lock().smoothers[param].current())
    }

    pub fn set_param_by_handle(
        &self,
        handle: crate::ids::ParamHandleId,
        value: f32,
    ) -> Result<()> {
        let target = self
            .param_handles
            .resolve(handle)
            .ok_or(EngineError::UnknownParamHandle(handle))?;
        self.set_param(target.module, target.param, value)
    }

    pub fn register_param_handle(&self, module: ModuleId, param: usize) -> Result<crate::ids::ParamHandleId> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        if param >= slot.params.len() {
            return Err(EngineError::UnknownParam { module, param });
        }
        drop(state);
        Ok(self
            .param_handles
            .register(&self.id_alloc, ModuleParam { module, param }))
    }

    // -- lifecycle events ------------------------------------------------------

    pub fn bypass(&self, module: ModuleId, bypassed: bool) -> Result<()> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        let mut s = slot.state.lock();
        s.bypassed = bypassed;
        s.pending_events.push(if bypassed {
            ModuleEvent::Bypass
        } else {
            ModuleEvent::UnBypass
        });
        Ok(())
    }

    pub fn reset(&self, module: ModuleId) -> Result<()> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        slot.state.lock().pending_events.push(ModuleEvent::Reset);
        Ok(())
    }

    pub fn randomize(&self, module: ModuleId) -> Result<()> {
        let state = self.state.read();
        let slot = state
            .modules
            .get(&module)
            .ok_or(EngineError::UnknownModule(module))?;
        slot.state
            .lock()
            .pending_events
            .push(ModuleEvent::Randomize);
        Ok(())
    }

    pub fn set_sample_rate(&self, sample_rate: f32) {
        let mut state = self.state.write();
        for slot in state.modules.values() {
            let mut s = slot.state.lock();
            s.pending_events
                .push(ModuleEvent::SampleRateChange { sample_rate });
            for smoother in s.smoothers.iter_mut() {
                smoother.set_sample_rate(sample_rate);
            }
        }
        state.sample_rate = sample_rate;
    }

    // -- stepping --------------------------------------------------------------

    /// Advance the graph by `frames` samples.
    ///
    /// Only one `step_block` may run at a time (`step_mutex`); a second
    /// caller blocks until the first returns rather than corrupting the
    /// frame counter by interleaving.
    pub fn step_block(&self, frames: usize) -> StepReport {
        let _exclusive = self.step_mutex.lock();
        let started = Instant::now();

        let state = self.state.read();
        let sample_rate = state.sample_rate;
        let start_frame = self.frame_counter.load(Ordering::Relaxed);
        let modules: Vec<Arc<ModuleSlot>> = state
            .order
            .iter()
            .filter_map(|id| state.modules.get(id).cloned())
            .collect();

        let faults = self.pool.run_block(modules, frames, sample_rate, start_frame);
        drop(state);

        self.frame_counter
            .fetch_add(frames as u64, Ordering::Relaxed);
        self.block_counter.fetch_add(1, Ordering::Relaxed);

        let elapsed = started.elapsed();
        let block_duration = Duration::from_secs_f64(frames as f64 / sample_rate.max(1.0) as f64);
        self.meter.lock().record(elapsed, block_duration);

        for fault in &faults {
            tracing::error!(module = fault.module.0, message = %fault.message, "module panicked during process()");
        }

        StepReport {
            frames,
            faults: faults.into_iter().map(|f| (f.module, f.message)).collect(),
        }
    }
}
