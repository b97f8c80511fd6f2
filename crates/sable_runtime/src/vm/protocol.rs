//! Object protocol entry points: every operator goes through a class slot.

use std::cmp::Ordering;

use super::Vm;
use crate::core::class::Slot;
use crate::core::heap::Ref;
use crate::errors::{Error, Result};

impl Vm {
    fn binary(&mut self, slot: Slot, a: Ref, b: Ref) -> Result<Ref> {
        let class = self.heap.class_of(a);
        let f = match slot {
            Slot::Add => self.heap.require_slot(class, slot, |s| s.add),
            Slot::Sub => self.heap.require_slot(class, slot, |s| s.sub),
            Slot::Mul => self.heap.require_slot(class, slot, |s| s.mul),
            _ => self.heap.require_slot(class, slot, |s| s.div),
        };
        f(self, a, b)
    }

    pub fn add(&mut self, a: Ref, b: Ref) -> Result<Ref> {
        self.binary(Slot::Add, a, b)
    }

    pub fn sub(&mut self, a: Ref, b: Ref) -> Result<Ref> {
        self.binary(Slot::Sub, a, b)
    }

    pub fn mul(&mut self, a: Ref, b: Ref) -> Result<Ref> {
        self.binary(Slot::Mul, a, b)
    }

    pub fn div(&mut self, a: Ref, b: Ref) -> Result<Ref> {
        self.binary(Slot::Div, a, b)
    }

    /// Ordering of `a` and `b`; an incomparable pair is an error.
    pub fn compare(&self, a: Ref, b: Ref) -> Result<Ordering> {
        self.heap.compare(a, b).ok_or_else(|| Error::NotComparable {
            left: self.heap.class_name(a).to_string(),
            right: self.heap.class_name(b).to_string(),
        })
    }

    /// Equality; incomparable values are unequal.
    pub fn equals(&self, a: Ref, b: Ref) -> bool {
        self.heap.equals(a, b)
    }

    pub fn truthy(&self, r: Ref) -> bool {
        self.heap.truthy(r)
    }

    pub fn getattr(&mut self, obj: Ref, name: &str) -> Result<Ref> {
        let f = self.heap.require_slot(self.heap.class_of(obj), Slot::GetAttr, |s| s.getattr);
        f(self, obj, name)
    }

    pub fn getitem(&mut self, obj: Ref, key: Ref) -> Result<Ref> {
        let f = self.heap.require_slot(self.heap.class_of(obj), Slot::GetItem, |s| s.getitem);
        f(self, obj, key)
    }

    /// Call any callable through its class's `call` slot.
    pub fn call(&mut self, callee: Ref, args: &[Ref]) -> Result<Ref> {
        let f = self.heap.require_slot(self.heap.class_of(callee), Slot::Call, |s| s.call);
        f(self, callee, args)
    }

    /// Construct an instance of `class` through the class chain's `init`.
    pub fn instantiate(&mut self, class: Ref, args: &[Ref]) -> Result<Ref> {
        let f = self.heap.require_slot(class, Slot::Init, |s| s.init);
        f(self, class, args)
    }

    /// Display form of `r` as a new string object.
    pub fn str_of(&mut self, r: Ref) -> Ref {
        let s = self.heap.display(r);
        self.new_str(&s)
    }

    /// Top-level call: runs to completion and reports any failure as
    /// `Error::Panic` carrying the raised value.
    pub fn invoke(&mut self, callee: Ref, args: &[Ref]) -> Result<Ref> {
        self.call(callee, args).map_err(|e| Error::Panic(self.error_to_panic(e)))
    }

    /// The value a failure raises: a panic's own value, or an Error object
    /// describing a recoverable error.
    pub fn error_to_panic(&mut self, e: Error) -> Ref {
        match e {
            Error::Panic(v) => v,
            other => {
                let message = other.to_string();
                self.new_error(message, None)
            }
        }
    }
}
