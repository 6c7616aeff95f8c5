//! Loading a saved patch JSON file into a running [`Graph`].

use modular_core::serialize::ModuleRegistry;
use modular_core::{modules, Graph};
use std::path::Path;
use std::sync::Arc;

/// The module types the CLI knows how to reconstruct from JSON: just the
/// demonstration catalog. A product host would register its own module
/// library here instead.
pub fn demo_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_demo_modules(&mut registry);
    registry
}

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read patch {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("failed to parse patch {}: {e}", path.display()))
}

/// Build a fresh [`Graph`] and load `path` into it. `sample_rate` only seeds
/// the graph before the patch's own `sampleRate` field (if any) overwrites
/// it during `from_json`.
pub fn load_graph(path: &Path, sample_rate: f32, worker_threads: usize) -> Result<Arc<Graph>, String> {
    let data = read_json(path)?;
    let graph = Arc::new(Graph::new(sample_rate, worker_threads.max(1)));
    let registry = demo_registry();
    graph
        .from_json(&data, &registry)
        .map_err(|e| format!("failed to load patch {}: {e}", path.display()))?;
    Ok(graph)
}

/// Module/cable counts straight from the JSON, without building a graph —
/// for `list`/`validate`-style summaries.
pub fn describe(path: &Path) -> Result<(usize, usize), String> {
    let data = read_json(path)?;
    let modules = data
        .get("modules")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    let cables = data
        .get("cables")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    Ok((modules, cables))
}
