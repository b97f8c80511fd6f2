//! Per-task heap and mark-sweep collector.
//!
//! Every object lives in exactly one heap, and a heap belongs to exactly one
//! task. A `Ref` carries the id of its heap and the generation of its slot,
//! so a Ref that crosses into another task or outlives its object is caught
//! on first use.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

use super::class::{Class, MarkFn};
use super::value::{Code, ErrorObj, Frame, HashTable, Method, Module, TaskRef};
use crate::config::RuntimeConfig;

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to a heap object.
///
/// `Ref` is neither `Send` nor `Sync`: values cross tasks only as `Packed`
/// deep copies.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ref {
    heap: u32,
    slot: u32,
    generation: u32,
    _task_local: PhantomData<*const ()>,
}

impl Ref {
    #[inline]
    pub fn heap_id(self) -> u32 {
        self.heap
    }

    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref(h{}#{}.{})", self.heap, self.slot, self.generation)
    }
}

/// A heap object: its class plus the payload selected by that class.
pub struct Obj {
    pub class: Ref,
    pub kind: ObjKind,
}

pub enum ObjKind {
    /// Instance of a user class: `size` slots, initially nil.
    Object(Vec<Ref>),
    Class(Box<Class>),
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<[u8]>),
    Array(Vec<Ref>),
    Hash(HashTable),
    Method(Box<Method>),
    Code(Box<Code>),
    Frame(Box<Frame>),
    Module(Box<Module>),
    Task(TaskRef),
    /// Mutable cell; `None` means unbound.
    Var(Option<Ref>),
    Error(Box<ErrorObj>),
}

impl ObjKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjKind::Object(_) => "object",
            ObjKind::Class(_) => "class",
            ObjKind::Nil => "nil",
            ObjKind::Bool(_) => "bool",
            ObjKind::Int(_) => "int",
            ObjKind::Float(_) => "float",
            ObjKind::Str(_) => "str",
            ObjKind::Array(_) => "array",
            ObjKind::Hash(_) => "hash",
            ObjKind::Method(_) => "method",
            ObjKind::Code(_) => "code",
            ObjKind::Frame(_) => "frame",
            ObjKind::Module(_) => "module",
            ObjKind::Task(_) => "task",
            ObjKind::Var(_) => "var",
            ObjKind::Error(_) => "error",
        }
    }
}

/// Collects outgoing references while an object is being marked.
pub struct Tracer {
    gray: Vec<Ref>,
}

impl Tracer {
    #[inline]
    pub fn mark(&mut self, r: Ref) {
        self.gray.push(r);
    }

    #[inline]
    pub fn mark_opt(&mut self, r: Option<Ref>) {
        if let Some(r) = r {
            self.gray.push(r);
        }
    }

    #[inline]
    pub fn mark_all(&mut self, refs: &[Ref]) {
        self.gray.extend_from_slice(refs);
    }
}

/// Payload types that hold Refs report them through `trace`.
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub live: usize,
    pub collections: usize,
    pub freed_last: usize,
    pub freed_total: usize,
    pub threshold: usize,
}

struct Slot {
    generation: u32,
    obj: Option<Obj>,
}

pub struct Heap {
    id: u32,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    marks: Vec<u64>,
    roots: Vec<Ref>,
    live: usize,
    pub(crate) alloc_count: usize,
    pub(crate) gc_threshold: usize,
    min_threshold: usize,
    growth: f64,
    collections: usize,
    freed_last: usize,
    freed_total: usize,
    /// Recursion guard for display and comparison of nested containers.
    pub(crate) nesting: Cell<u32>,
}

impl Heap {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::with_capacity(1024),
            free_list: Vec::new(),
            marks: Vec::new(),
            roots: Vec::new(),
            live: 0,
            alloc_count: 0,
            gc_threshold: config.gc_threshold,
            min_threshold: config.gc_min_threshold,
            growth: config.gc_growth,
            collections: 0,
            freed_last: 0,
            freed_total: 0,
            nesting: Cell::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Allocate an object. Allocation never collects; collection runs only at
    /// VM safe points.
    pub fn alloc(&mut self, class: Ref, kind: ObjKind) -> Ref {
        self.check_foreign(class);
        self.alloc_count += 1;
        self.live += 1;
        let obj = Obj { class, kind };
        if let Some(slot) = self.free_list.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.obj = Some(obj);
            let generation = entry.generation;
            return self.make_ref(slot, generation);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, obj: Some(obj) });
        self.make_ref(slot, 0)
    }

    /// Allocate an object whose class is itself. Used once per heap for the
    /// class of classes.
    pub(crate) fn alloc_self_classed(&mut self, kind: ObjKind) -> Ref {
        let slot = self.slots.len() as u32;
        let r = self.make_ref(slot, 0);
        self.alloc_count += 1;
        self.live += 1;
        self.slots.push(Slot { generation: 0, obj: Some(Obj { class: r, kind }) });
        r
    }

    #[inline]
    fn make_ref(&self, slot: u32, generation: u32) -> Ref {
        Ref { heap: self.id, slot, generation, _task_local: PhantomData }
    }

    #[inline]
    fn check_foreign(&self, r: Ref) {
        if r.heap != self.id {
            fatal!("{r:?} belongs to heap {} but was used in heap {}", r.heap, self.id);
        }
    }

    /// True if `r` belongs to this heap and its object is still allocated.
    pub fn contains(&self, r: Ref) -> bool {
        r.heap == self.id
            && self
                .slots
                .get(r.slot as usize)
                .is_some_and(|s| s.generation == r.generation && s.obj.is_some())
    }

    pub fn get(&self, r: Ref) -> &Obj {
        self.check_foreign(r);
        match self.slots.get(r.slot as usize) {
            Some(Slot { generation, obj: Some(obj) }) if *generation == r.generation => obj,
            _ => fatal!("{r:?} refers to a collected object"),
        }
    }

    pub fn get_mut(&mut self, r: Ref) -> &mut Obj {
        self.check_foreign(r);
        match self.slots.get_mut(r.slot as usize) {
            Some(Slot { generation, obj: Some(obj) }) if *generation == r.generation => obj,
            _ => fatal!("{r:?} refers to a collected object"),
        }
    }

    #[inline]
    pub fn kind(&self, r: Ref) -> &ObjKind {
        &self.get(r).kind
    }

    #[inline]
    pub fn class_of(&self, r: Ref) -> Ref {
        self.get(r).class
    }

    /// Register a permanent root.
    pub fn add_root(&mut self, r: Ref) {
        self.check_foreign(r);
        self.roots.push(r);
    }

    pub fn remove_root(&mut self, r: Ref) {
        if let Some(pos) = self.roots.iter().rposition(|x| *x == r) {
            self.roots.swap_remove(pos);
        }
    }

    #[inline]
    pub fn should_collect(&self) -> bool {
        self.alloc_count >= self.gc_threshold
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live: self.live,
            collections: self.collections,
            freed_last: self.freed_last,
            freed_total: self.freed_total,
            threshold: self.gc_threshold,
        }
    }

    fn set_mark(&mut self, slot: u32) -> bool {
        let word = (slot >> 6) as usize;
        let bit = slot & 63;
        if word >= self.marks.len() {
            self.marks.resize(word + 1, 0);
        }
        let w = &mut self.marks[word];
        let mask = 1u64 << bit;
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        true
    }

    fn is_marked(&self, slot: u32) -> bool {
        let word = (slot >> 6) as usize;
        self.marks.get(word).is_some_and(|w| (w & (1u64 << (slot & 63))) != 0)
    }

    /// Mark functions of `class` and its ancestors, root class first.
    fn mark_chain(&self, class: Ref) -> SmallVec<[MarkFn; 4]> {
        let mut chain: SmallVec<[MarkFn; 4]> = SmallVec::new();
        let mut cur = Some(class);
        while let Some(c) = cur {
            let cls = self.class(c);
            if let Some(m) = cls.slots.mark {
                chain.push(m);
            }
            cur = cls.sup;
        }
        chain.reverse();
        chain
    }

    fn mark_from(&mut self, gray: Vec<Ref>) {
        let mut tracer = Tracer { gray };
        while let Some(r) = tracer.gray.pop() {
            // Validates heap id and generation.
            let class = self.get(r).class;
            if !self.set_mark(r.slot) {
                continue;
            }
            tracer.mark(class);
            let chain = self.mark_chain(class);
            let obj = self.get(r);
            for mark in chain {
                mark(obj, &mut tracer);
            }
        }
    }

    /// Run a full collection. `extra` holds the caller's roots (VM stack,
    /// frames, temporaries). Returns the number of objects freed.
    pub fn collect(&mut self, extra: impl IntoIterator<Item = Ref>) -> usize {
        self.marks.clear();
        let mut gray = self.roots.clone();
        gray.extend(extra);
        self.mark_from(gray);
        let freed = self.sweep();
        self.marks.clear();
        freed
    }

    fn sweep(&mut self) -> usize {
        let garbage: Vec<u32> = (0..self.slots.len() as u32)
            .filter(|&i| self.slots[i as usize].obj.is_some() && !self.is_marked(i))
            .collect();

        // Finalizers run while every garbage object is still in place, so a
        // dtor never observes a half-swept heap.
        for &slot in &garbage {
            let dtors = self.dtor_chain(slot);
            if let Some(obj) = self.slots[slot as usize].obj.as_mut() {
                for dtor in dtors {
                    dtor(obj);
                }
            }
        }

        for &slot in &garbage {
            let entry = &mut self.slots[slot as usize];
            entry.obj = None;
            entry.generation = entry.generation.wrapping_add(1);
        }

        self.free_list.clear();
        for (i, s) in self.slots.iter().enumerate() {
            if s.obj.is_none() {
                self.free_list.push(i as u32);
            }
        }
        // Reuse low slots first.
        self.free_list.reverse();

        let freed = garbage.len();
        self.live -= freed;
        self.alloc_count = 0;
        self.collections += 1;
        self.freed_last = freed;
        self.freed_total += freed;

        // Adaptive strategy: grow fast while the heap is small, slower once
        // it is large.
        let growth = if self.live > 1_000_000 { self.growth.min(1.5) } else { self.growth };
        self.gc_threshold = ((self.live as f64 * growth) as usize).max(self.min_threshold);
        freed
    }

    /// Dtors of the object's class chain, most derived first.
    fn dtor_chain(&self, slot: u32) -> SmallVec<[fn(&mut Obj); 2]> {
        let mut out: SmallVec<[fn(&mut Obj); 2]> = SmallVec::new();
        let Some(obj) = self.slots[slot as usize].obj.as_ref() else {
            return out;
        };
        let mut cur = Some(obj.class);
        while let Some(c) = cur {
            let Some(cls) = self.try_class(c) else { break };
            if let Some(d) = cls.slots.dtor {
                out.push(d);
            }
            cur = cls.sup;
        }
        out
    }
}
