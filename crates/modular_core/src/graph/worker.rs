//! The worker-thread pool that processes a block's modules in parallel.
//!
//! One pair of barriers brackets each block: workers spin (or, if
//! [`WorkerPool::set_yield_workers`] is set, block on a condvar) until the
//! coordinator publishes a [`BlockJob`] and releases the start barrier, then
//! race a shared atomic counter to claim modules one at a time until the
//! job is exhausted, then rendezvous again at the end barrier before the
//! coordinator is allowed to read results back out.

use crate::graph::module_slot::ModuleSlot;
use crate::module::{EngineHandle, ModuleEvent, ProcessContext};
use crate::port::PortBuffer;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const SPIN_LIMIT: u32 = 4_000;

/// A reusable sense-reversing barrier with a spin/condvar hybrid wait.
pub(crate) struct Barrier {
    total: usize,
    arrived: Mutex<usize>,
    condvar: Condvar,
    generation: AtomicUsize,
    yield_workers: Arc<AtomicBool>,
}

impl Barrier {
    fn new(total: usize, yield_workers: Arc<AtomicBool>) -> Self {
        Self {
            total,
            arrived: Mutex::new(0),
            condvar: Condvar::new(),
            generation: AtomicUsize::new(0),
            yield_workers,
        }
    }

    pub fn wait(&self) {
        let my_generation = self.generation.load(Ordering::Acquire);
        let mut arrived = self.arrived.lock();
        *arrived += 1;
        if *arrived == self.total {
            *arrived = 0;
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.condvar.notify_all();
            return;
        }
        drop(arrived);

        if !self.yield_workers.load(Ordering::Relaxed) {
            let mut spins = 0;
            while self.generation.load(Ordering::Acquire) == my_generation {
                core::hint::spin_loop();
                spins += 1;
                if spins >= SPIN_LIMIT {
                    break;
                }
            }
            if self.generation.load(Ordering::Acquire) != my_generation {
                return;
            }
        }

        let mut arrived = self.arrived.lock();
        while self.generation.load(Ordering::Acquire) == my_generation {
            self.condvar.wait(&mut arrived);
        }
    }
}

/// Snapshot of the modules a block will process, shared read-only across
/// workers for the block's duration.
pub(crate) struct BlockJob {
    pub modules: Vec<Arc<ModuleSlot>>,
    /// `module_index[&id]` is the position of that module in `modules`,
    /// built once per block so cable reads don't scan the module list per
    /// frame.
    pub module_index: std::collections::HashMap<crate::ids::ModuleId, usize>,
    pub frames: usize,
    pub sample_rate: f32,
    pub start_frame: u64,
    /// The pool's own yield-workers flag, threaded into each module's
    /// [`ProcessContext::engine`] so `process` can flip it from the inside.
    pub yield_workers: Arc<AtomicBool>,
}

impl BlockJob {
    pub fn new(
        modules: Vec<Arc<ModuleSlot>>,
        frames: usize,
        sample_rate: f32,
        start_frame: u64,
        yield_workers: Arc<AtomicBool>,
    ) -> Self {
        let module_index = modules.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        Self {
            modules,
            module_index,
            frames,
            sample_rate,
            start_frame,
            yield_workers,
        }
    }
}

/// A module raised a Rust panic during `process`. Carried back to the
/// coordinator so it can be turned into [`crate::error::EngineError::ModuleFault`]
/// instead of unwinding across the worker thread boundary.
pub(crate) struct ModuleFault {
    pub module: crate::ids::ModuleId,
    pub message: String,
}

pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    start_barrier: Arc<Barrier>,
    end_barrier: Arc<Barrier>,
    next_index: Arc<AtomicUsize>,
    job: Arc<Mutex<Option<Arc<BlockJob>>>>,
    faults: Arc<Mutex<Vec<ModuleFault>>>,
    yield_workers: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let yield_workers = Arc::new(AtomicBool::new(false));
        // +1: the coordinator participates in both barriers as a peer so it
        // can publish the job and then wait for completion symmetrically,
        // without a third synchronization primitive.
        let start_barrier = Arc::new(Barrier::new(num_workers + 1, yield_workers.clone()));
        let end_barrier = Arc::new(Barrier::new(num_workers + 1, yield_workers.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let next_index = Arc::new(AtomicUsize::new(0));
        let job: Arc<Mutex<Option<Arc<BlockJob>>>> = Arc::new(Mutex::new(None));
        let faults = Arc::new(Mutex::new(Vec::new()));

        let handles = (0..num_workers)
            .map(|_| {
                let start_barrier = start_barrier.clone();
                let end_barrier = end_barrier.clone();
                let shutdown = shutdown.clone();
                let next_index = next_index.clone();
                let job = job.clone();
                let faults = faults.clone();
                std::thread::Builder::new()
                    .name("modular-worker".into())
                    .spawn(move || {
                        worker_loop(start_barrier, end_barrier, shutdown, next_index, job, faults)
                    })
                    .expect("failed to spawn modular worker thread")
            })
            .collect();

        Self {
            handles,
            shutdown,
            start_barrier,
            end_barrier,
            next_index,
            job,
            faults,
            yield_workers,
        }
    }

    pub fn set_yield_workers(&self, yield_workers: bool) {
        self.yield_workers.store(yield_workers, Ordering::Relaxed);
    }

    pub fn yield_workers(&self) -> bool {
        self.yield_workers.load(Ordering::Relaxed)
    }

    /// Run one block to completion, processing every module in `modules`
    /// across `frames` frames. Blocks the calling thread until all workers
    /// finish. Returns any module panics caught along the way.
    pub fn run_block(
        &self,
        modules: Vec<Arc<ModuleSlot>>,
        frames: usize,
        sample_rate: f32,
        start_frame: u64,
    ) -> Vec<ModuleFault> {
        self.next_index.store(0, Ordering::Relaxed);
        // Every module starts this block having published 0 frames, so a
        // consumer that gets scheduled ahead of its producer waits instead
        // of reading a stale counter left over from the previous block.
        for slot in &modules {
            slot.frames_done.store(0, Ordering::Relaxed);
        }
        *self.job.lock() = Some(Arc::new(BlockJob::new(
            modules,
            frames,
            sample_rate,
            start_frame,
            self.yield_workers.clone(),
        )));

        self.start_barrier.wait();
        // The coordinator also claims modules so a single-worker
        // configuration (or a coordinator that's simply faster than the
        // pool getting scheduled) still makes progress immediately.
        drain_modules(&self.next_index, &self.job, &self.faults);
        self.end_barrier.wait();

        *self.job.lock() = None;
        std::mem::take(&mut *self.faults.lock())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Release any workers parked at the start barrier so they observe
        // the shutdown flag and exit.
        *self.job.lock() = None;
        self.start_barrier.wait();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    start_barrier: Arc<Barrier>,
    end_barrier: Arc<Barrier>,
    shutdown: Arc<AtomicBool>,
    next_index: Arc<AtomicUsize>,
    job: Arc<Mutex<Option<Arc<BlockJob>>>>,
    faults: Arc<Mutex<Vec<ModuleFault>>>,
) {
    loop {
        start_barrier.wait();
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        drain_modules(&next_index, &job, &faults);
        end_barrier.wait();
    }
}

/// Claim and process modules from the shared counter until the block's
/// module list is exhausted.
fn drain_modules(
    next_index: &AtomicUsize,
    job: &Mutex<Option<Arc<BlockJob>>>,
    faults: &Mutex<Vec<ModuleFault>>,
) {
    let job = match job.lock().clone() {
        Some(job) => job,
        None => return,
    };

    loop {
        let i = next_index.fetch_add(1, Ordering::Relaxed);
        if i >= job.modules.len() {
            break;
        }
        let slot = &job.modules[i];
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_module_block(i, slot, &job);
        }));
        if let Err(payload) = result {
            let message = panic_message(&payload);
            // A module that panicked mid-block may have stopped short of
            // publishing every frame. Anything cabled downstream of it is
            // spinning on `frames_done`, waiting for frames that will now
            // never come — mark the rest of the block done (on whatever was
            // last published, i.e. silence for frames it never reached) so
            // those consumers observe stale/silent input instead of hanging.
            slot.frames_done.store(job.frames as u64, Ordering::Release);
            faults.lock().push(ModuleFault {
                module: slot.id,
                message,
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "module panicked with a non-string payload".to_string()
    }
}

/// Spin (then yield) until `producer` has published at least `needed`
/// frames this block. Forward edges (producer earlier in insertion order)
/// need the current frame, so `needed` is `frame_offset + 1`; cables that
/// close a feedback cycle only need the previous one, so `needed` is
/// `frame_offset`, which is already satisfied before the block even starts.
/// Terminates: insertion order has no cycles among forward edges, so the
/// chain of producers a module can be waiting on always bottoms out at a
/// module with nothing left to wait for.
fn wait_for_frame(producer: &ModuleSlot, needed: u64) {
    if needed == 0 {
        return;
    }
    let mut spins = 0u32;
    while producer.frames_done.load(Ordering::Acquire) < needed {
        if spins < SPIN_LIMIT {
            core::hint::spin_loop();
            spins += 1;
        } else {
            std::thread::yield_now();
        }
    }
}

/// Read the current value of `input_sources[i]`'s cable at `frame_offset`,
/// waiting on the producer's publish counter so a same-block forward cable
/// reliably observes the current frame rather than whatever happened to be
/// in its `PortRegister` when this thread got around to looking.
fn read_cable(
    job: &BlockJob,
    my_index: usize,
    source: Option<(crate::ids::ModuleId, usize)>,
    frame_offset: usize,
) -> PortBuffer {
    let Some((module, port)) = source else {
        return PortBuffer::silent();
    };
    let Some(&producer_index) = job.module_index.get(&module) else {
        return PortBuffer::silent();
    };
    let producer = &job.modules[producer_index];
    let needed = if producer_index < my_index {
        frame_offset as u64 + 1
    } else {
        frame_offset as u64
    };
    wait_for_frame(producer, needed);
    producer.outputs[port].snapshot()
}

/// Step one module through every frame of the block.
///
/// Input voltages are pulled from the producer's [`crate::port::PortRegister`]
/// immediately before each frame, and this module's own outputs are
/// published immediately after — the "propagate cables" step from the data
/// model, expressed as a pull at the point of use rather than a separate
/// pass. Modules earlier in insertion order than their cable's producer
/// therefore see that frame's value; modules later (only possible via a
/// feedback cable) see the previous frame's.
fn process_module_block(my_index: usize, slot: &ModuleSlot, job: &BlockJob) {
    let mut state = slot.state.lock();
    let ModuleSlot {
        outputs,
        input_sources,
        params,
        num_inputs,
        num_outputs,
        ..
    } = slot;

    for event in state.pending_events.drain(..).collect::<Vec<_>>() {
        state.module.on_event(event);
    }

    if state.bypassed {
        apply_bypass(my_index, slot, &mut *state, job);
        return;
    }

    let mut input_bufs = vec![PortBuffer::silent(); *num_inputs];
    let mut output_bufs = vec![PortBuffer::silent(); *num_outputs];
    let mut param_vals = vec![0.0f32; params.len()];
    // Wiring is frozen for the block's duration; snapshot it once rather
    // than re-acquiring the lock every frame.
    let sources = input_sources.read().clone();

    for frame_offset in 0..job.frames {
        for (i, source) in sources.iter().enumerate() {
            input_bufs[i] = read_cable(job, my_index, *source, frame_offset);
        }

        for (i, param) in params.iter().enumerate() {
            param_vals[i] = state.smoothers[i].step(param.get());
        }

        for buf in output_bufs.iter_mut() {
            *buf = PortBuffer::silent();
        }

        let mut ctx = ProcessContext {
            inputs: &input_bufs,
            outputs: &mut output_bufs,
            params: &param_vals,
            sample_rate: job.sample_rate,
            frame: job.start_frame + frame_offset as u64,
            engine: EngineHandle::new(&job.yield_workers),
        };
        state.module.process(&mut ctx);

        for (port, buf) in outputs.iter().zip(output_bufs.iter()) {
            port.publish(buf);
        }
        slot.frames_done.store(frame_offset as u64 + 1, Ordering::Release);
    }
}

fn apply_bypass(
    my_index: usize,
    slot: &ModuleSlot,
    state: &mut crate::graph::module_slot::ModuleSlotState,
    job: &BlockJob,
) {
    let routes = state.module.bypass_routes().to_vec();
    let sources = slot.input_sources.read().clone();
    for frame_offset in 0..job.frames {
        for route in &routes {
            let source = sources.get(route.input).copied().flatten();
            let value = read_cable(job, my_index, source, frame_offset);
            if let Some(out) = slot.outputs.get(route.output) {
                out.publish(&value);
            }
        }
        slot.frames_done.store(frame_offset as u64 + 1, Ordering::Release);
    }
}
