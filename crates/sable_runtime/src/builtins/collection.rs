//! `Array` and `Hash`.

use std::cmp::Ordering;

use super::{expect_args, type_mismatch};
use crate::core::class::Slots;
use crate::core::heap::{Heap, Obj, ObjKind, Ref, Trace, Tracer};
use crate::errors::{Error, Result, messages};
use crate::vm::Vm;

pub(super) fn array_slots() -> Slots {
    Slots {
        init: Some(array_init),
        str: Some(array_str),
        cmp: Some(array_cmp),
        add: Some(array_add),
        getitem: Some(array_getitem),
        nonzero: Some(array_nonzero),
        mark: Some(array_mark),
        ..Slots::default()
    }
}

pub(super) fn hash_slots() -> Slots {
    Slots {
        init: Some(hash_init),
        str: Some(hash_str),
        cmp: Some(hash_cmp),
        getitem: Some(hash_getitem),
        nonzero: Some(hash_nonzero),
        mark: Some(hash_mark),
        ..Slots::default()
    }
}

pub(super) fn install(vm: &mut Vm, array: Ref, hash: Ref) {
    vm.define_native_method(array, "push", array_push);
    vm.define_native_method(array, "pop", array_pop);
    vm.define_native_method(array, "len", array_len);
    vm.define_native_method(hash, "set", hash_set);
    vm.define_native_method(hash, "get", hash_get);
    vm.define_native_method(hash, "len", hash_len);
    vm.define_native_method(hash, "keys", hash_keys);
}

fn items_of<'a>(heap: &'a Heap, r: Ref) -> Result<&'a [Ref]> {
    heap.array(r).ok_or_else(|| type_mismatch(heap, messages::NOT_AN_ARRAY, r))
}

fn array_init(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    Ok(vm.heap.alloc(class, ObjKind::Array(args.to_vec())))
}

fn array_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push('[');
    for (i, item) in heap.array(r).unwrap_or_default().iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        heap.write_display(*item, out);
    }
    out.push(']');
}

/// Lexicographic; an incomparable element pair makes the arrays
/// incomparable.
fn array_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    let (xs, ys) = (heap.array(a)?, heap.array(b)?);
    for (x, y) in xs.iter().zip(ys) {
        match heap.compare(*x, *y)? {
            Ordering::Equal => {}
            other => return Some(other),
        }
    }
    Some(xs.len().cmp(&ys.len()))
}

fn array_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.array(r).is_some_and(|a| !a.is_empty())
}

fn array_add(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    let mut out = items_of(&vm.heap, a)?.to_vec();
    out.extend_from_slice(items_of(&vm.heap, b)?);
    Ok(vm.new_array(out))
}

fn array_getitem(vm: &mut Vm, arr: Ref, key: Ref) -> Result<Ref> {
    let Some(i) = vm.heap.int(key) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, key));
    };
    let items = items_of(&vm.heap, arr)?;
    usize::try_from(i)
        .ok()
        .and_then(|idx| items.get(idx).copied())
        .ok_or(Error::IndexOutOfRange { index: i, len: items.len() })
}

fn array_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Array(items) = &obj.kind {
        t.mark_all(items);
    }
}

fn array_push(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Array.push", args, 2)?;
    let Some(items) = vm.heap.array_mut(args[0]) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_AN_ARRAY, args[0]));
    };
    items.push(args[1]);
    Ok(args[0])
}

fn array_pop(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Array.pop", args, 1)?;
    let nil = vm.nil();
    match vm.heap.array_mut(args[0]) {
        Some(items) => Ok(items.pop().unwrap_or(nil)),
        None => Err(type_mismatch(&vm.heap, messages::NOT_AN_ARRAY, args[0])),
    }
}

fn array_len(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Array.len", args, 1)?;
    let n = items_of(&vm.heap, args[0])?.len();
    Ok(vm.new_int(n as i64))
}

fn hash_init(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    expect_args("Hash", args, 0)?;
    Ok(vm.heap.alloc(class, ObjKind::Hash(Default::default())))
}

fn hash_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push('{');
    if let Some(h) = heap.hash(r) {
        for (i, (k, v)) in h.keys.iter().zip(&h.values).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            heap.write_display(*k, out);
            out.push_str(": ");
            heap.write_display(*v, out);
        }
    }
    out.push('}');
}

/// Equality only: same keys mapping to equal values.
fn hash_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    let (x, y) = (heap.hash(a)?, heap.hash(b)?);
    if x.len() != y.len() {
        return None;
    }
    for (k, v) in x.keys.iter().zip(&x.values) {
        let pos = y.position(heap, *k)?;
        if !heap.equals(*v, y.values[pos]) {
            return None;
        }
    }
    Some(Ordering::Equal)
}

fn hash_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.hash(r).is_some_and(|h| !h.is_empty())
}

fn hash_getitem(vm: &mut Vm, hash: Ref, key: Ref) -> Result<Ref> {
    let Some(h) = vm.heap.hash(hash) else {
        return Err(type_mismatch(&vm.heap, "hash", hash));
    };
    match h.position(&vm.heap, key) {
        Some(i) => Ok(h.values[i]),
        None => Err(Error::NoItem { class: vm.heap.class_name(hash).to_string(), key: vm.heap.display(key) }),
    }
}

fn hash_mark(obj: &Obj, t: &mut Tracer) {
    if let ObjKind::Hash(h) = &obj.kind {
        h.trace(t);
    }
}

fn hash_set(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Hash.set", args, 3)?;
    vm.hash_set(args[0], args[1], args[2])?;
    Ok(args[0])
}

/// `get(key)` is nil for a missing key, unlike indexing.
fn hash_get(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Hash.get", args, 2)?;
    match vm.getitem(args[0], args[1]) {
        Err(Error::NoItem { .. }) => Ok(vm.nil()),
        other => other,
    }
}

fn hash_len(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Hash.len", args, 1)?;
    let Some(h) = vm.heap.hash(args[0]) else {
        return Err(type_mismatch(&vm.heap, "hash", args[0]));
    };
    let n = h.len();
    Ok(vm.new_int(n as i64))
}

fn hash_keys(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Hash.keys", args, 1)?;
    let Some(h) = vm.heap.hash(args[0]) else {
        return Err(type_mismatch(&vm.heap, "hash", args[0]));
    };
    let keys = h.keys.clone();
    Ok(vm.new_array(keys))
}
