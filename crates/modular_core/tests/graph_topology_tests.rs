//! Integration tests for graph topology: module/cable lifecycle, the
//! readers-writer lock's concurrency guarantees, serialization round
//! trips, and the master-module/fallback-clock handoff.

use modular_core::fallback_clock::FallbackClock;
use modular_core::module::{Module, ProcessContext};
use modular_core::param_handle::ModuleParam;
use modular_core::port::PortBuffer;
use modular_core::serialize::ModuleRegistry;
use modular_core::{modules, EngineError, Graph};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A trivial one-in/one-out module used wherever a test just needs *some*
/// module and doesn't care about its DSP.
struct Through;

impl Module for Through {
    fn module_type(&self) -> &'static str {
        "through"
    }
    fn num_inputs(&self) -> usize {
        1
    }
    fn num_outputs(&self) -> usize {
        1
    }
    fn process(&mut self, ctx: &mut ProcessContext) {
        ctx.outputs[0] = ctx.inputs[0];
    }
}

fn registry_with_through() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register("through", Arc::new(|| Box::new(Through)));
    registry
}

#[test]
fn add_and_remove_module_round_trips_membership() {
    let graph = Graph::new(48_000.0, 1);
    let id = graph.add_module(Box::new(Through));

    assert!(graph.module_ids().contains(&id));
    assert_eq!(graph.module_ids().len(), 1);

    graph.remove_module(id).unwrap();
    assert!(!graph.module_ids().contains(&id));
    assert_eq!(graph.module_ids().len(), 0);
}

#[test]
fn removing_unknown_module_is_an_error() {
    let graph = Graph::new(48_000.0, 1);
    let id = graph.add_module(Box::new(Through));
    graph.remove_module(id).unwrap();
    assert!(matches!(graph.remove_module(id), Err(EngineError::UnknownModule(_))));
}

#[test]
fn removing_an_endpoint_removes_its_cables() {
    let graph = Graph::new(48_000.0, 1);
    let a = graph.add_module(Box::new(Through));
    let b = graph.add_module(Box::new(Through));
    let cable = graph.add_cable(a, 0, b, 0).unwrap();

    assert_eq!(graph.cable_ids(), vec![cable]);

    graph.remove_module(b).unwrap();
    assert!(graph.cable_ids().is_empty());

    // The port is free again now that its cable is gone.
    let c = graph.add_module(Box::new(Through));
    graph.add_cable(a, 0, c, 0).unwrap();
}

#[test]
fn an_input_port_accepts_at_most_one_cable() {
    let graph = Graph::new(48_000.0, 1);
    let a = graph.add_module(Box::new(Through));
    let b = graph.add_module(Box::new(Through));
    let c = graph.add_module(Box::new(Through));

    graph.add_cable(a, 0, c, 0).unwrap();
    let err = graph.add_cable(b, 0, c, 0).unwrap_err();
    assert!(matches!(err, EngineError::InputPortAlreadyConnected { .. }));
}

#[test]
fn concurrent_readers_do_not_block_each_other() {
    let graph = Arc::new(Graph::new(48_000.0, 2));
    for _ in 0..8 {
        graph.add_module(Box::new(Through));
    }

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let graph = graph.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(graph.module_ids().len(), 8);
                    let _ = graph.cpu_load();
                }
            })
        })
        .collect();

    for r in readers {
        r.join().unwrap();
    }
}

#[test]
fn a_writer_never_corrupts_concurrent_mutation() {
    // Invariant 11: a writer is blocked by at most one in-flight writer or
    // step_block, never torn or lost — exercised here by having two threads
    // add modules concurrently and checking every module survives.
    let graph = Arc::new(Graph::new(48_000.0, 2));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let graph = graph.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    graph.add_module(Box::new(Through));
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }

    assert_eq!(graph.module_ids().len(), 200);
}

#[test]
fn step_block_excludes_concurrent_mutation() {
    // While a block is stepping, add_module still completes (it only needs
    // the write lock once the read-locked block finishes), and the graph
    // stays consistent either side of it.
    let graph = Arc::new(Graph::new(48_000.0, 2));
    for _ in 0..4 {
        graph.add_module(Box::new(Through));
    }

    let stepper = {
        let graph = graph.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                graph.step_block(64);
            }
        })
    };

    let mutator = {
        let graph = graph.clone();
        thread::spawn(move || {
            for _ in 0..20 {
                graph.add_module(Box::new(Through));
            }
        })
    };

    stepper.join().unwrap();
    mutator.join().unwrap();

    assert_eq!(graph.module_ids().len(), 24);
}

#[test]
fn round_trip_serialization_is_a_fixed_point() {
    let graph = Graph::new(48_000.0, 1);
    let registry = registry_with_through();

    let a = graph.add_module(Box::new(Through));
    let b = graph.add_module(Box::new(Through));
    let c = graph.add_module(Box::new(Through));
    graph.add_cable(a, 0, b, 0).unwrap();
    graph.add_cable(b, 0, c, 0).unwrap();
    graph.bypass(c, true).unwrap();
    graph.set_master(Some(a)).unwrap();

    let first = graph.to_json();

    graph.from_json(&first, &registry).unwrap();
    let second = graph.to_json();

    assert_eq!(first, second);
}

#[test]
fn round_trip_preserves_module_param_and_bypass_state() {
    // S4: 3 modules, 2 cables, 1 bypassed module, 1 param set to 0.73.
    let graph = Graph::new(48_000.0, 1);
    let mut registry = ModuleRegistry::new();
    modules::register_demo_modules(&mut registry);

    let sine = graph.add_module(Box::new(modules::Sine::new()));
    let gain = graph.add_module(Box::new(modules::Gain::new()));
    let mix = graph.add_module(Box::new(modules::Mix::new()));
    graph.add_cable(sine, 0, gain, 0).unwrap();
    graph.add_cable(gain, 0, mix, 0).unwrap();
    graph.set_param(gain, 0, 0.73).unwrap();
    graph.bypass(mix, true).unwrap();

    let json = graph.to_json();
    graph.from_json(&json, &registry).unwrap();

    let ids = graph.module_ids();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&sine));
    assert!(ids.contains(&gain));
    assert!(ids.contains(&mix));
    assert_eq!(graph.cable_ids().len(), 2);
    assert!((graph.get_param(gain, 0).unwrap() - 0.73).abs() < 1e-6);
}

#[test]
fn remove_module_while_fallback_clock_is_running() {
    // S3.
    let graph = Arc::new(Graph::new(48_000.0, 2));
    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(graph.add_module(Box::new(Through)));
    }
    for pair in ids.windows(2) {
        graph.add_cable(pair[0], 0, pair[1], 0).unwrap();
    }

    let clock = FallbackClock::spawn_with_block_size(graph.clone(), 64);
    thread::sleep(Duration::from_millis(100));

    graph.remove_module(ids[5]).unwrap();

    thread::sleep(Duration::from_millis(50));
    clock.stop();

    assert_eq!(graph.module_ids().len(), 9);
    assert!(!graph.module_ids().contains(&ids[5]));
    for cable in graph.cables() {
        assert_ne!(cable.source_module, ids[5]);
        assert_ne!(cable.target_module, ids[5]);
    }
}

#[test]
fn setting_a_master_module_pauses_the_fallback_clock() {
    // S5.
    let graph = Arc::new(Graph::new(48_000.0, 1));
    let m = graph.add_module(Box::new(Through));

    let clock = FallbackClock::spawn_with_block_size(graph.clone(), 64);
    thread::sleep(Duration::from_millis(50));
    assert!(graph.block_count() > 0, "fallback clock should be stepping with no master set");

    graph.set_master(Some(m)).unwrap();
    thread::sleep(Duration::from_millis(20));
    let paused_at = graph.block_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        graph.block_count(),
        paused_at,
        "fallback clock should idle once a master module owns stepping"
    );

    graph.set_master(None).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(graph.block_count() > paused_at, "fallback clock should resume once master is cleared");

    clock.stop();
}

#[test]
fn param_handle_rebind_moves_the_registered_target() {
    // S6, adapted to this registry's actual API: `rebind` repoints an
    // *existing* handle rather than minting a second handle that
    // invalidates the first by overwrite, since handle identity here is
    // stable for its whole lifetime. The equivalent guarantee holds: once
    // rebound, the handle resolves only to its new target and the old
    // target no longer reports this handle via `handle_for`.
    let graph = Graph::new(48_000.0, 1);
    let a = graph.add_module(Box::new(Through));
    let b = graph.add_module(Box::new(Through));

    let handle = graph.register_param_handle(a, 0).unwrap();
    assert_eq!(graph.param_handles.handle_for(ModuleParam { module: a, param: 0 }), Some(handle));

    graph.param_handles.rebind(handle, ModuleParam { module: b, param: 0 });

    assert_eq!(graph.param_handles.resolve(handle), Some(ModuleParam { module: b, param: 0 }));
    assert_eq!(graph.param_handles.handle_for(ModuleParam { module: a, param: 0 }), None);
}

#[test]
fn removing_a_module_drops_its_param_handles() {
    let graph = Graph::new(48_000.0, 1);
    let a = graph.add_module(Box::new(Through));
    let handle = graph.register_param_handle(a, 0).unwrap();

    graph.remove_module(a).unwrap();

    assert_eq!(graph.param_handles.resolve(handle), None);
}

#[test]
fn silent_unconnected_input_reads_as_a_single_zero_channel() {
    let mut buf = PortBuffer::silent();
    assert_eq!(buf.channels(), 1);
    assert_eq!(buf.get(0), 0.0);
    buf.set(2, 1.0);
    assert_eq!(buf.channels(), 3);
}
