//! Class objects and dispatch slots.
//!
//! Every operator, construction, attribute access and GC trace goes through a
//! slot on the receiver's class. Lookup walks the `sup` chain; `str` is the
//! exception and is only read from the receiver's own class.

use std::cmp::Ordering;
use std::fmt;

use super::heap::{Heap, Obj, ObjKind, Ref, Trace, Tracer};
use super::{FastHashMap, fast_map_new};
use crate::errors::Result;
use crate::task::pack::MAX_DEPTH;
use crate::vm::Vm;

/// Nesting past which `compare` gives up. Anything `pack` accepts stays
/// well below it.
const MAX_COMPARE_DEPTH: u32 = 2 * MAX_DEPTH as u32;

pub type CmpFn = fn(&Heap, Ref, Ref) -> Option<Ordering>;
pub type InitFn = fn(&mut Vm, Ref, &[Ref]) -> Result<Ref>;
pub type DtorFn = fn(&mut Obj);
pub type StrFn = fn(&Heap, Ref, &mut String);
pub type MarkFn = fn(&Obj, &mut Tracer);
pub type BinaryFn = fn(&mut Vm, Ref, Ref) -> Result<Ref>;
pub type CallFn = fn(&mut Vm, Ref, &[Ref]) -> Result<Ref>;
pub type GetAttrFn = fn(&mut Vm, Ref, &str) -> Result<Ref>;
pub type GetItemFn = fn(&mut Vm, Ref, Ref) -> Result<Ref>;
pub type NonzeroFn = fn(&Heap, Ref) -> bool;

/// Dispatch table of a class. `None` defers to the super class.
#[derive(Clone, Copy, Debug, Default)]
pub struct Slots {
    pub cmp: Option<CmpFn>,
    pub init: Option<InitFn>,
    pub dtor: Option<DtorFn>,
    pub str: Option<StrFn>,
    pub mark: Option<MarkFn>,
    pub add: Option<BinaryFn>,
    pub sub: Option<BinaryFn>,
    pub mul: Option<BinaryFn>,
    pub div: Option<BinaryFn>,
    pub call: Option<CallFn>,
    pub getattr: Option<GetAttrFn>,
    pub getitem: Option<GetItemFn>,
    pub nonzero: Option<NonzeroFn>,
}

/// Slot names, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Cmp,
    Init,
    Dtor,
    Str,
    Mark,
    Add,
    Sub,
    Mul,
    Div,
    Call,
    GetAttr,
    GetItem,
    Nonzero,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Cmp => "cmp",
            Slot::Init => "init",
            Slot::Dtor => "dtor",
            Slot::Str => "str",
            Slot::Mark => "mark",
            Slot::Add => "add (+)",
            Slot::Sub => "sub (-)",
            Slot::Mul => "mul (*)",
            Slot::Div => "div (/)",
            Slot::Call => "call",
            Slot::GetAttr => "getattr",
            Slot::GetItem => "getitem",
            Slot::Nonzero => "nonzero",
        })
    }
}

pub struct Class {
    pub name: String,
    pub sup: Option<Ref>,
    /// Number of Ref slots in each instance.
    pub size: usize,
    pub slots: Slots,
    /// Methods looked up by `getattr`, searched along the super chain.
    pub methods: FastHashMap<String, Ref>,
}

impl Class {
    pub fn new(name: impl Into<String>, sup: Option<Ref>, size: usize, slots: Slots) -> Self {
        Self { name: name.into(), sup, size, slots, methods: fast_map_new() }
    }
}

impl Trace for Class {
    fn trace(&self, t: &mut Tracer) {
        t.mark_opt(self.sup);
        for m in self.methods.values() {
            t.mark(*m);
        }
    }
}

impl Heap {
    /// The class payload of a class object. Anything else is fatal.
    pub fn class(&self, r: Ref) -> &Class {
        match self.kind(r) {
            ObjKind::Class(c) => c,
            other => fatal!("{r:?} is a {} where a class was required", other.kind_name()),
        }
    }

    pub fn try_class(&self, r: Ref) -> Option<&Class> {
        if !self.contains(r) {
            return None;
        }
        match self.kind(r) {
            ObjKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, r: Ref) -> &mut Class {
        match &mut self.get_mut(r).kind {
            ObjKind::Class(c) => c,
            other => fatal!("{r:?} is a {} where a class was required", other.kind_name()),
        }
    }

    /// Name of the class of `r`.
    pub fn class_name(&self, r: Ref) -> &str {
        &self.class(self.class_of(r)).name
    }

    /// First slot found walking from `class` up the super chain.
    pub fn find_slot<T>(&self, class: Ref, pick: impl Fn(&Slots) -> Option<T>) -> Option<T> {
        let mut cur = Some(class);
        while let Some(c) = cur {
            let cls = self.class(c);
            if let Some(f) = pick(&cls.slots) {
                return Some(f);
            }
            cur = cls.sup;
        }
        None
    }

    /// Like `find_slot`, but a miss along the whole chain is fatal.
    pub fn require_slot<T>(&self, class: Ref, slot: Slot, pick: impl Fn(&Slots) -> Option<T>) -> T {
        match self.find_slot(class, pick) {
            Some(f) => f,
            None => fatal!("class {} does not define the {slot} operator", self.class(class).name),
        }
    }

    pub fn lookup_method(&self, class: Ref, name: &str) -> Option<Ref> {
        let mut cur = Some(class);
        while let Some(c) = cur {
            let cls = self.class(c);
            if let Some(m) = cls.methods.get(name) {
                return Some(*m);
            }
            cur = cls.sup;
        }
        None
    }

    pub fn is_subclass(&self, class: Ref, ancestor: Ref) -> bool {
        let mut cur = Some(class);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.class(c).sup;
        }
        false
    }

    /// Three-way comparison through the `cmp` slots.
    ///
    /// Identity is always equal. Otherwise the left operand's chain is asked
    /// first, then the right operand's with the answer reversed. `None` means
    /// the pair is not comparable.
    pub fn compare(&self, a: Ref, b: Ref) -> Option<Ordering> {
        if a == b {
            return Some(Ordering::Equal);
        }
        let depth = self.nesting.get();
        if depth > MAX_COMPARE_DEPTH {
            return None;
        }
        self.nesting.set(depth + 1);
        let left = self.find_slot(self.class_of(a), |s| s.cmp).and_then(|cmp| cmp(self, a, b));
        let out = left.or_else(|| {
            self.find_slot(self.class_of(b), |s| s.cmp)
                .and_then(|cmp| cmp(self, b, a))
                .map(Ordering::reverse)
        });
        self.nesting.set(depth);
        out
    }

    pub fn equals(&self, a: Ref, b: Ref) -> bool {
        self.compare(a, b) == Some(Ordering::Equal)
    }

    /// Append the display form of `r` to `out` using its own class's `str`.
    pub fn write_display(&self, r: Ref, out: &mut String) {
        let depth = self.nesting.get();
        if depth > 64 {
            out.push_str("...");
            return;
        }
        let class = self.class_of(r);
        let Some(f) = self.class(class).slots.str else {
            fatal!("class {} does not define the {} operator", self.class(class).name, Slot::Str);
        };
        self.nesting.set(depth + 1);
        f(self, r, out);
        self.nesting.set(depth);
    }

    pub fn display(&self, r: Ref) -> String {
        let mut out = String::new();
        self.write_display(r, &mut out);
        out
    }

    /// Truthiness through the `nonzero` slot.
    pub fn truthy(&self, r: Ref) -> bool {
        let f = self.require_slot(self.class_of(r), Slot::Nonzero, |s| s.nonzero);
        f(self, r)
    }
}
