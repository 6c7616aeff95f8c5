//! A registry mapping host-facing names to `(module, param index)` pairs.
//!
//! Hosts that want to expose "the filter cutoff of the VCF I just added" to
//! a MIDI learn system or an automation lane don't want to track module ids
//! and param indices themselves. A [`ParamHandle`] is a stable token for
//! exactly one such pair; registering the same pair twice replaces the
//! previous handle for it rather than creating a second one.

use crate::ids::{IdAllocator, ModuleId, ParamHandleId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleParam {
    pub module: ModuleId,
    pub param: usize,
}

#[derive(Debug, Default)]
pub struct ParamHandleRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_handle: HashMap<ParamHandleId, ModuleParam>,
    by_target: HashMap<ModuleParam, ParamHandleId>,
}

impl ParamHandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `(module, param)`, returning its handle. If the pair already
    /// has a handle, that existing handle is returned unchanged — overwrite
    /// semantics apply to the reverse direction only (see
    /// [`Self::rebind`]).
    pub fn register(&self, alloc: &IdAllocator, target: ModuleParam) -> ParamHandleId {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_target.get(&target) {
            return *existing;
        }
        let handle = alloc.next_param_handle();
        inner.by_handle.insert(handle, target);
        inner.by_target.insert(target, handle);
        handle
    }

    /// Point an existing handle at a new target, overwriting whatever it
    /// previously referred to. The old target, if no longer referenced by
    /// any handle, is left in `by_target` pointing at a stale handle id and
    /// is pruned lazily — cheap to check, rare to hit. If some other handle
    /// already owned `target`, that handle is displaced: its `by_handle`
    /// entry is dropped so it no longer resolves to anything, keeping at
    /// most one live handle per target.
    pub fn rebind(&self, handle: ParamHandleId, target: ModuleParam) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.by_handle.insert(handle, target) {
            if inner.by_target.get(&old) == Some(&handle) {
                inner.by_target.remove(&old);
            }
        }
        if let Some(displaced) = inner.by_target.insert(target, handle) {
            if displaced != handle {
                inner.by_handle.remove(&displaced);
            }
        }
    }

    pub fn resolve(&self, handle: ParamHandleId) -> Option<ModuleParam> {
        self.inner.read().by_handle.get(&handle).copied()
    }

    pub fn handle_for(&self, target: ModuleParam) -> Option<ParamHandleId> {
        self.inner.read().by_target.get(&target).copied()
    }

    /// Drop every handle pointing at `module`. Called when a module is
    /// removed from the graph so stale handles don't silently resolve to a
    /// reused module id.
    pub fn remove_module(&self, module: ModuleId) {
        let mut inner = self.inner.write();
        inner.by_handle.retain(|_, t| t.module != module);
        inner.by_target.retain(|t, _| t.module != module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_for_same_target() {
        let alloc = IdAllocator::new();
        let reg = ParamHandleRegistry::new();
        let target = ModuleParam {
            module: ModuleId(1),
            param: 0,
        };
        let h1 = reg.register(&alloc, target);
        let h2 = reg.register(&alloc, target);
        assert_eq!(h1, h2);
    }

    #[test]
    fn rebind_overwrites_target() {
        let alloc = IdAllocator::new();
        let reg = ParamHandleRegistry::new();
        let a = ModuleParam {
            module: ModuleId(1),
            param: 0,
        };
        let b = ModuleParam {
            module: ModuleId(2),
            param: 1,
        };
        let handle = reg.register(&alloc, a);
        reg.rebind(handle, b);
        assert_eq!(reg.resolve(handle), Some(b));
    }

    #[test]
    fn rebind_onto_another_handles_target_invalidates_it() {
        let alloc = IdAllocator::new();
        let reg = ParamHandleRegistry::new();
        let target = ModuleParam {
            module: ModuleId(5),
            param: 0,
        };
        let elsewhere = ModuleParam {
            module: ModuleId(9),
            param: 0,
        };
        let h1 = reg.register(&alloc, target);
        let h2 = reg.register(&alloc, elsewhere);

        reg.rebind(h2, target);

        assert_eq!(reg.resolve(h2), Some(target));
        assert_eq!(reg.resolve(h1), None);
        assert_eq!(reg.handle_for(target), Some(h2));
    }

    #[test]
    fn remove_module_drops_its_handles() {
        let alloc = IdAllocator::new();
        let reg = ParamHandleRegistry::new();
        let target = ModuleParam {
            module: ModuleId(1),
            param: 0,
        };
        let handle = reg.register(&alloc, target);
        reg.remove_module(ModuleId(1));
        assert_eq!(reg.resolve(handle), None);
    }
}
