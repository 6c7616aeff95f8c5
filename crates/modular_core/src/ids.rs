//! Stable identifiers for graph entities.
//!
//! IDs are opaque `u64`s handed out by monotonic counters. They never alias
//! slot indices: a module removed and replaced by a new module never causes
//! an old `ModuleId` to refer to the wrong module.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(ModuleId);
id_type!(CableId);
id_type!(ParamHandleId);

/// Monotonic allocator shared by a [`crate::graph::Graph`].
///
/// A single counter backs all three ID kinds so that JSON round-trips can
/// restore it to `max(seen ids) + 1` without needing three separate fields.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_module(&self) -> ModuleId {
        ModuleId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_cable(&self) -> CableId {
        CableId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_param_handle(&self) -> ParamHandleId {
        ParamHandleId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Fast-forward the counter so future allocations never collide with an
    /// id loaded from JSON.
    pub fn observe(&self, seen: u64) {
        self.next.fetch_max(seen + 1, Ordering::Relaxed);
    }
}
