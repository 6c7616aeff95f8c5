//! A free-running clock that steps the graph when no audio host is pulling
//! blocks through a callback — useful for headless operation (the CLI,
//! tests, a benchmark) and for keeping CV-only patches (no audio driver at
//! all) advancing in real time.
//!
//! Drifts less than a naive `sleep(block_duration)` loop because each
//! iteration sleeps to an absolute deadline rather than accumulating the
//! scheduling slop of repeated relative sleeps.
//!
//! Backs off whenever a master module is set: a master module means some
//! external driver (an audio callback, typically) has taken over calling
//! `step_block` itself, and the fallback clock idling in parallel would
//! double-step the graph.

use crate::graph::Graph;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Nominal block size used by the fallback clock. Hosts driving the graph
/// through their own audio callback choose their own block size; this only
/// applies when nothing else is stepping the graph.
pub const FALLBACK_BLOCK_FRAMES: usize = 256;

pub struct FallbackClock {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl FallbackClock {
    /// Spawn the clock thread. Stops automatically when dropped.
    pub fn spawn(graph: Arc<Graph>) -> Self {
        Self::spawn_with_block_size(graph, FALLBACK_BLOCK_FRAMES)
    }

    pub fn spawn_with_block_size(graph: Arc<Graph>, frames: usize) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = std::thread::Builder::new()
            .name("modular-fallback-clock".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while thread_running.load(Ordering::Relaxed) {
                    let sample_rate = graph.sample_rate().max(1.0);
                    let block_duration =
                        Duration::from_secs_f64(frames as f64 / sample_rate as f64);
                    deadline += block_duration;

                    if graph.master_module().is_some() {
                        // An external driver owns stepping now; idle until it
                        // gives the master back up, re-checking once a block.
                        let now = Instant::now();
                        if deadline > now {
                            std::thread::sleep(deadline - now);
                        } else {
                            deadline = now;
                        }
                        continue;
                    }

                    let report = graph.step_block(frames);
                    for (module, message) in &report.faults {
                        tracing::warn!(module = module.0, %message, "module fault during fallback-clock step");
                    }

                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else {
                        // We've fallen behind (likely because step_block
                        // itself overran the block budget). Resetting the
                        // deadline to "now" avoids a runaway catch-up burst
                        // of back-to-back blocks.
                        deadline = now;
                    }
                }
            })
            .expect("failed to spawn fallback clock thread");

        Self {
            handle: Some(handle),
            running,
        }
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FallbackClock {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
