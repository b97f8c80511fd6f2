//! `Method`, `Code`, `Frame`, `Module` and `Var`.

use smallvec::SmallVec;

use super::{not_instantiable, type_mismatch};
use crate::core::class::Slots;
use crate::core::heap::{Heap, Obj, ObjKind, Ref, Trace, Tracer};
use crate::core::value::MethodKind;
use crate::errors::{Error, Result};
use crate::vm::Vm;

pub(super) fn method_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(method_str),
        call: Some(method_call),
        mark: Some(method_mark),
        ..Slots::default()
    }
}

pub(super) fn code_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(code_str),
        mark: Some(code_mark),
        ..Slots::default()
    }
}

pub(super) fn frame_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(frame_str),
        mark: Some(frame_mark),
        ..Slots::default()
    }
}

pub(super) fn module_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(module_str),
        getattr: Some(module_getattr),
        mark: Some(module_mark),
        ..Slots::default()
    }
}

pub(super) fn var_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(var_str),
        mark: Some(var_mark),
        ..Slots::default()
    }
}

/// Natives run directly with any bound receiver prepended; bytecode bodies
/// run in a nested interpreter loop.
fn method_call(vm: &mut Vm, callee: Ref, args: &[Ref]) -> Result<Ref> {
    let Some(m) = vm.heap.method(callee) else {
        return Err(type_mismatch(&vm.heap, "method", callee));
    };
    let MethodKind::Native(f) = m.kind else {
        return vm.call_bytecode(callee, args);
    };
    let receiver = m.receiver;
    match receiver {
        Some(recv) => {
            let mut full: SmallVec<[Ref; 8]> = SmallVec::with_capacity(args.len() + 1);
            full.push(recv);
            full.extend_from_slice(args);
            f(vm, &full)
        }
        None => f(vm, args),
    }
}

fn method_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str("<method ");
    if let Some(m) = heap.method(r) {
        out.push_str(&m.name);
        if m.receiver.is_some() {
            out.push_str(" (bound)");
        }
    }
    out.push('>');
}

fn method_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Method(m) = &obj.kind {
        m.trace(t);
    }
}

fn code_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str("<code ");
    if let Some(c) = heap.code(r) {
        out.push_str(&c.unit.name);
    }
    out.push('>');
}

fn code_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Code(c) = &obj.kind {
        c.trace(t);
    }
}

fn frame_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str("<frame ");
    if let Some(m) = heap.frame(r).and_then(|f| heap.method(f.method)) {
        out.push_str(&m.name);
    }
    out.push('>');
}

fn frame_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Frame(f) = &obj.kind {
        f.trace(t);
    }
}

fn module_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str("<module ");
    if let Some(m) = heap.module(r) {
        out.push_str(&m.name);
    }
    out.push('>');
}

/// Members of the module namespace.
fn module_getattr(vm: &mut Vm, module: Ref, name: &str) -> Result<Ref> {
    let Some(m) = vm.heap.module(module) else {
        return Err(type_mismatch(&vm.heap, "module", module));
    };
    match m.locals.get(name) {
        Some(var) => vm.heap.var_get(*var).ok_or_else(|| Error::Unbound(name.to_string())),
        None => Err(Error::NoAttribute { class: format!("module {}", m.name), name: name.to_string() }),
    }
}

fn module_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Module(m) = &obj.kind {
        m.trace(t);
    }
}

fn var_str(heap: &Heap, r: Ref, out: &mut String) {
    match heap.var_get(r) {
        Some(v) => {
            out.push_str("<var ");
            heap.write_display(v, out);
            out.push('>');
        }
        None => out.push_str("<var unbound>"),
    }
}

fn var_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Var(v) = &obj.kind {
        t.mark_opt(*v);
    }
}
