//! `Task` and `Error`.

use std::cmp::Ordering;

use super::{expect_args, not_instantiable, type_mismatch};
use crate::core::class::Slots;
use crate::core::heap::{Heap, Obj, ObjKind, Ref, Trace, Tracer};
use crate::errors::{Error, Result, messages};
use crate::vm::Vm;

pub(super) fn task_slots() -> Slots {
    Slots {
        init: Some(not_instantiable),
        str: Some(task_str),
        cmp: Some(task_cmp),
        dtor: Some(task_dtor),
        ..Slots::default()
    }
}

pub(super) fn error_slots() -> Slots {
    Slots {
        init: Some(error_init),
        str: Some(error_str),
        getattr: Some(error_getattr),
        mark: Some(error_mark),
        ..Slots::default()
    }
}

pub(super) fn install(vm: &mut Vm, task: Ref) {
    vm.define_native_method(task, "send", task_send);
    vm.define_native_method(task, "join", task_join);
    vm.define_native_method(task, "id", task_id);
}

fn task_str(heap: &Heap, r: Ref, out: &mut String) {
    if let Some(t) = heap.task(r) {
        out.push_str("<task #");
        let mut buf = itoa::Buffer::new();
        out.push_str(buf.format(t.handle.id()));
        if t.local {
            out.push_str(" (current)");
        }
        out.push('>');
    }
}

/// Two Task objects are equal when they name the same task.
fn task_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    let (x, y) = (heap.task(a)?, heap.task(b)?);
    x.handle.same(&y.handle).then_some(Ordering::Equal)
}

/// Drops this object's reference to the task's shared state.
fn task_dtor(obj: &mut Obj) {
    if let ObjKind::Task(_) = obj.kind {
        obj.kind = ObjKind::Nil;
    }
}

fn task_send(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Task.send", args, 2)?;
    vm.send(args[0], args[1])?;
    Ok(vm.nil())
}

fn task_join(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Task.join", args, 1)?;
    Ok(vm.join(args[0])?.value())
}

fn task_id(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Task.id", args, 1)?;
    let id = vm.task_handle(args[0])?.id();
    Ok(vm.new_int(id as i64))
}

/// `Error(message)` or `Error(message, cause)`.
fn error_init(vm: &mut Vm, _class: Ref, args: &[Ref]) -> Result<Ref> {
    let (msg, cause) = match args {
        [m] => (*m, None),
        [m, c] => (*m, Some(*c)),
        _ => return Err(Error::Arity { method: "Error".into(), expected: 1, got: args.len() }),
    };
    let Some(text) = vm.heap.str_lossy(msg) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_A_STRING, msg));
    };
    let text = text.into_owned();
    Ok(vm.new_error(text, cause))
}

fn error_str(heap: &Heap, r: Ref, out: &mut String) {
    if let Some(e) = heap.error(r) {
        out.push_str("Error: ");
        out.push_str(&e.message);
        if let Some(c) = e.cause {
            out.push_str(" (caused by ");
            heap.write_display(c, out);
            out.push(')');
        }
    }
}

/// `message`, `cause` and `backtrace` are read directly from the payload.
fn error_getattr(vm: &mut Vm, err: Ref, name: &str) -> Result<Ref> {
    let Some(e) = vm.heap.error(err) else {
        return Err(type_mismatch(&vm.heap, "error", err));
    };
    match name {
        "message" => {
            let m = e.message.clone();
            Ok(vm.new_str(&m))
        }
        "cause" => Ok(e.cause.unwrap_or(vm.core.nil)),
        "backtrace" => {
            let lines = e.backtrace.clone();
            let items = lines.iter().map(|l| vm.new_str(l)).collect();
            Ok(vm.new_array(items))
        }
        _ => super::object::object_getattr(vm, err, name),
    }
}

fn error_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Error(e) = &obj.kind {
        e.trace(t);
    }
}
