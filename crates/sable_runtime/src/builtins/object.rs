//! `Object`, the root class, and `Class`, the class of classes.
//!
//! `Object` supplies the defaults every class inherits: construction of
//! plain instances, method lookup for attributes, truthiness and tracing of
//! instance slots. It has no arithmetic and no `cmp`, so plain instances
//! compare equal only to themselves.

use crate::core::class::Slots;
use crate::core::heap::{Heap, Obj, ObjKind, Ref, Trace, Tracer};
use crate::errors::{Error, Result};
use crate::vm::Vm;

pub(super) fn object_slots() -> Slots {
    Slots {
        init: Some(object_init),
        str: Some(object_str),
        getattr: Some(object_getattr),
        nonzero: Some(always_true),
        mark: Some(object_mark),
        ..Slots::default()
    }
}

pub(super) fn class_slots() -> Slots {
    Slots {
        init: Some(class_init),
        str: Some(class_str),
        call: Some(class_call),
        getattr: Some(class_getattr),
        mark: Some(class_mark),
        ..Slots::default()
    }
}

/// Allocate `size` nil slots, then run a bytecode `init` method if the class
/// chain defines one.
fn object_init(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    let size = vm.heap.class(class).size;
    let nil = vm.nil();
    let inst = vm.heap.alloc(class, ObjKind::Object(vec![nil; size]));
    match vm.heap.lookup_method(class, "init") {
        Some(init) => {
            let bound = vm.bind(init, inst);
            vm.push_root(bound);
            let r = vm.call(bound, args);
            vm.pop_root();
            r?;
        }
        None if !args.is_empty() => {
            return Err(Error::Arity {
                method: format!("{}.init", vm.heap.class(class).name),
                expected: 0,
                got: args.len(),
            });
        }
        None => {}
    }
    Ok(inst)
}

fn always_true(_: &Heap, _: Ref) -> bool {
    true
}

fn object_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push('<');
    out.push_str(heap.class_name(r));
    out.push_str(" instance>");
}

/// Methods of the receiver's class chain, bound to the receiver.
pub(super) fn object_getattr(vm: &mut Vm, obj: Ref, name: &str) -> Result<Ref> {
    let class = vm.heap.class_of(obj);
    match vm.heap.lookup_method(class, name) {
        Some(m) => Ok(vm.bind(m, obj)),
        None => Err(Error::NoAttribute { class: vm.heap.class(class).name.clone(), name: name.to_string() }),
    }
}

fn object_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Object(slots) = &obj.kind {
        t.mark_all(slots);
    }
}

fn class_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str("<class ");
    out.push_str(&heap.class(r).name);
    out.push('>');
}

/// `Class(name, super, size)` defines a class like `class_new`.
fn class_init(vm: &mut Vm, _class: Ref, args: &[Ref]) -> Result<Ref> {
    super::natives::builtin_class_new(vm, args)
}

/// Calling a class constructs an instance.
fn class_call(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    vm.instantiate(class, args)
}

/// `name` and `super`, then the class's own method table unbound, then
/// methods of `Class` itself.
fn class_getattr(vm: &mut Vm, class: Ref, name: &str) -> Result<Ref> {
    match name {
        "name" => {
            let n = vm.heap.class(class).name.clone();
            return Ok(vm.new_str(&n));
        }
        "super" => return Ok(vm.heap.class(class).sup.unwrap_or(vm.core.nil)),
        _ => {}
    }
    if let Some(m) = vm.heap.lookup_method(class, name) {
        return Ok(m);
    }
    object_getattr(vm, class, name)
}

fn class_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Class(c) = &obj.kind {
        c.trace(t);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Registry, Runtime, RuntimeConfig};

    #[test]
    fn instances_get_nil_slots_and_bound_methods() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let object = vm.core().object;
        let point = vm.class_new("Point", Some(object), 2);
        let p = vm.instantiate(point, &[]).unwrap();
        let slots = vm.heap.instance_slots(p).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| vm.heap.is_nil(*s)));
        assert_eq!(vm.heap.display(p), "<Point instance>");
        assert_eq!(vm.heap.display(point), "<class Point>");

        let err = vm.getattr(p, "nope").unwrap_err();
        assert!(matches!(err, crate::Error::NoAttribute { .. }));
    }

    #[test]
    fn class_attributes() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let int = vm.core().int;
        let name = vm.getattr(int, "name").unwrap();
        assert_eq!(vm.heap.bytes(name), Some(&b"Int"[..]));
        let sup = vm.getattr(int, "super").unwrap();
        assert_eq!(sup, vm.core().object);
    }
}
