//! `Str`: immutable byte strings, displayed as UTF-8.

use std::cmp::Ordering;

use super::{expect_args, type_mismatch};
use crate::core::class::Slots;
use crate::core::heap::{Heap, Ref};
use crate::errors::{Error, Result, messages};
use crate::vm::Vm;

pub(super) fn str_slots() -> Slots {
    Slots {
        init: Some(str_init),
        str: Some(str_str),
        cmp: Some(str_cmp),
        add: Some(str_add),
        mul: Some(str_mul),
        getitem: Some(str_getitem),
        nonzero: Some(str_nonzero),
        ..Slots::default()
    }
}

pub(super) fn install(vm: &mut Vm, class: Ref) {
    vm.define_native_method(class, "len", str_len);
}

fn bytes_of<'a>(heap: &'a Heap, r: Ref) -> Result<&'a [u8]> {
    heap.bytes(r).ok_or_else(|| type_mismatch(heap, messages::NOT_A_STRING, r))
}

/// `Str()` is empty, `Str(x)` is the display form of `x`.
fn str_init(vm: &mut Vm, _class: Ref, args: &[Ref]) -> Result<Ref> {
    match args {
        [] => Ok(vm.new_str("")),
        [v] => {
            if vm.heap.bytes(*v).is_some() {
                return Ok(*v);
            }
            Ok(vm.str_of(*v))
        }
        _ => Err(Error::Arity { method: "Str".into(), expected: 1, got: args.len() }),
    }
}

fn str_str(heap: &Heap, r: Ref, out: &mut String) {
    if let Some(b) = heap.bytes(r) {
        out.push_str(&String::from_utf8_lossy(b));
    }
}

fn str_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    Some(heap.bytes(a)?.cmp(heap.bytes(b)?))
}

fn str_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.bytes(r).is_some_and(|b| !b.is_empty())
}

fn str_add(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    let lhs = bytes_of(&vm.heap, a)?;
    let rhs = bytes_of(&vm.heap, b)?;
    let mut out = Vec::with_capacity(lhs.len() + rhs.len());
    out.extend_from_slice(lhs);
    out.extend_from_slice(rhs);
    Ok(vm.new_bytes(out))
}

fn str_mul(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    let Some(n) = vm.heap.int(b) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, b));
    };
    let out = bytes_of(&vm.heap, a)?.repeat(n.max(0) as usize);
    Ok(vm.new_bytes(out))
}

/// One-byte string at an integer index.
fn str_getitem(vm: &mut Vm, s: Ref, key: Ref) -> Result<Ref> {
    let Some(i) = vm.heap.int(key) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, key));
    };
    let bytes = bytes_of(&vm.heap, s)?;
    match usize::try_from(i).ok().and_then(|idx| bytes.get(idx)) {
        Some(b) => {
            let b = *b;
            Ok(vm.new_bytes(vec![b]))
        }
        None => Err(Error::IndexOutOfRange { index: i, len: bytes.len() }),
    }
}

fn str_len(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("Str.len", args, 1)?;
    let n = bytes_of(&vm.heap, args[0])?.len();
    Ok(vm.new_int(n as i64))
}
