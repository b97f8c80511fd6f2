//! Core object model.
//!
//! - `Heap`, `Ref`, `Obj` - per-task object store and mark-sweep collector
//! - `Class`, `Slots` - class objects and their dispatch slots
//! - payload types for methods, code, frames, modules, errors and tasks

pub mod class;
pub mod heap;
pub mod value;

pub use class::{Class, Slot, Slots};
pub use heap::{Heap, HeapStats, Obj, ObjKind, Ref, Trace, Tracer};
pub use value::*;

use ahash::RandomState;
use hashbrown::HashMap;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

#[inline]
pub fn fast_map_new<K, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(RandomState::new())
}

#[inline]
pub fn fast_map_with_capacity<K, V>(cap: usize) -> FastHashMap<K, V> {
    HashMap::with_capacity_and_hasher(cap, RandomState::new())
}
