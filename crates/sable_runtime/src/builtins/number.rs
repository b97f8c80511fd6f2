//! `Nil`, `Bool`, `Int` and `Float`.
//!
//! Mixed int/float arithmetic promotes to float. Integer arithmetic wraps on
//! overflow; integer division by zero is an error, float division follows
//! IEEE 754.

use std::cmp::Ordering;

use super::{expect_args, type_mismatch};
use crate::core::class::Slots;
use crate::core::heap::{Heap, ObjKind, Ref};
use crate::errors::{Error, Result, messages};
use crate::vm::Vm;

pub(super) fn nil_slots() -> Slots {
    Slots {
        init: Some(nil_init),
        str: Some(nil_str),
        nonzero: Some(nil_nonzero),
        ..Slots::default()
    }
}

pub(super) fn bool_slots() -> Slots {
    Slots {
        init: Some(bool_init),
        str: Some(bool_str),
        cmp: Some(bool_cmp),
        nonzero: Some(bool_nonzero),
        ..Slots::default()
    }
}

pub(super) fn int_slots() -> Slots {
    Slots {
        init: Some(int_init),
        str: Some(int_str),
        cmp: Some(num_cmp),
        add: Some(num_add),
        sub: Some(num_sub),
        mul: Some(num_mul),
        div: Some(num_div),
        nonzero: Some(int_nonzero),
        ..Slots::default()
    }
}

pub(super) fn float_slots() -> Slots {
    Slots {
        init: Some(float_init),
        str: Some(float_str),
        cmp: Some(num_cmp),
        add: Some(num_add),
        sub: Some(num_sub),
        mul: Some(num_mul),
        div: Some(num_div),
        nonzero: Some(float_nonzero),
        ..Slots::default()
    }
}

#[derive(Clone, Copy, Debug)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }
}

fn num(heap: &Heap, r: Ref) -> Option<Num> {
    match heap.kind(r) {
        ObjKind::Int(i) => Some(Num::I(*i)),
        ObjKind::Float(f) => Some(Num::F(*f)),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

fn arith(vm: &mut Vm, a: Ref, b: Ref, op: Arith) -> Result<Ref> {
    let Some(x) = num(&vm.heap, a) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_A_NUMBER, a));
    };
    let Some(y) = num(&vm.heap, b) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_A_NUMBER, b));
    };
    match (x, y) {
        (Num::I(x), Num::I(y)) => {
            let v = match op {
                Arith::Add => x.wrapping_add(y),
                Arith::Sub => x.wrapping_sub(y),
                Arith::Mul => x.wrapping_mul(y),
                Arith::Div => {
                    if y == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    x.wrapping_div(y)
                }
            };
            Ok(vm.new_int(v))
        }
        _ => {
            let (x, y) = (x.as_f64(), y.as_f64());
            let v = match op {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Div => x / y,
            };
            Ok(vm.new_float(v))
        }
    }
}

fn num_add(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    arith(vm, a, b, Arith::Add)
}

fn num_sub(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    arith(vm, a, b, Arith::Sub)
}

fn num_mul(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    arith(vm, a, b, Arith::Mul)
}

fn num_div(vm: &mut Vm, a: Ref, b: Ref) -> Result<Ref> {
    arith(vm, a, b, Arith::Div)
}

fn num_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    match (num(heap, a)?, num(heap, b)?) {
        (Num::I(x), Num::I(y)) => Some(x.cmp(&y)),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

fn bool_cmp(heap: &Heap, a: Ref, b: Ref) -> Option<Ordering> {
    Some(heap.bool(a)?.cmp(&heap.bool(b)?))
}

fn int_str(heap: &Heap, r: Ref, out: &mut String) {
    if let Some(i) = heap.int(r) {
        let mut buf = itoa::Buffer::new();
        out.push_str(buf.format(i));
    }
}

fn float_str(heap: &Heap, r: Ref, out: &mut String) {
    if let Some(f) = heap.float(r) {
        let mut buf = ryu::Buffer::new();
        out.push_str(buf.format(f));
    }
}

fn bool_str(heap: &Heap, r: Ref, out: &mut String) {
    out.push_str(if heap.bool(r).unwrap_or(false) { "true" } else { "false" });
}

fn nil_str(_: &Heap, _: Ref, out: &mut String) {
    out.push_str("nil");
}

fn nil_nonzero(_: &Heap, _: Ref) -> bool {
    false
}

fn bool_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.bool(r).unwrap_or(false)
}

fn int_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.int(r).is_some_and(|i| i != 0)
}

fn float_nonzero(heap: &Heap, r: Ref) -> bool {
    heap.float(r).is_some_and(|f| f != 0.0)
}

fn nil_init(vm: &mut Vm, _class: Ref, args: &[Ref]) -> Result<Ref> {
    expect_args("Nil", args, 0)?;
    Ok(vm.nil())
}

fn bool_init(vm: &mut Vm, _class: Ref, args: &[Ref]) -> Result<Ref> {
    match args {
        [] => Ok(vm.bool(false)),
        [v] => Ok(vm.bool(vm.heap.truthy(*v))),
        _ => Err(Error::Arity { method: "Bool".into(), expected: 1, got: args.len() }),
    }
}

fn int_init(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    let v = match args {
        [] => 0,
        [v] => match vm.heap.kind(*v) {
            ObjKind::Int(i) => *i,
            ObjKind::Float(f) => *f as i64,
            ObjKind::Bool(b) => i64::from(*b),
            ObjKind::Str(s) => match std::str::from_utf8(s).ok().and_then(|s| s.trim().parse().ok()) {
                Some(i) => i,
                None => return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, *v)),
            },
            _ => return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, *v)),
        },
        _ => return Err(Error::Arity { method: "Int".into(), expected: 1, got: args.len() }),
    };
    Ok(vm.heap.alloc(class, ObjKind::Int(v)))
}

fn float_init(vm: &mut Vm, class: Ref, args: &[Ref]) -> Result<Ref> {
    let v = match args {
        [] => 0.0,
        [v] => match vm.heap.kind(*v) {
            ObjKind::Int(i) => *i as f64,
            ObjKind::Float(f) => *f,
            ObjKind::Str(s) => match std::str::from_utf8(s).ok().and_then(|s| s.trim().parse().ok()) {
                Some(f) => f,
                None => return Err(type_mismatch(&vm.heap, messages::NOT_A_NUMBER, *v)),
            },
            _ => return Err(type_mismatch(&vm.heap, messages::NOT_A_NUMBER, *v)),
        },
        _ => return Err(Error::Arity { method: "Float".into(), expected: 1, got: args.len() }),
    };
    Ok(vm.heap.alloc(class, ObjKind::Float(v)))
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use crate::{Error, Registry, Runtime, RuntimeConfig};

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let a = vm.new_int(7);
        let b = vm.new_float(0.5);
        let sum = vm.add(a, b).unwrap();
        assert_eq!(vm.heap.float(sum), Some(7.5));
        let two = vm.new_int(2);
        let q = vm.div(a, two).unwrap();
        assert_eq!(vm.heap.int(q), Some(3));
        assert_eq!(vm.heap.display(sum), "7.5");
    }

    #[test]
    fn integer_division_by_zero_is_recoverable() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let a = vm.new_int(1);
        let z = vm.new_int(0);
        assert!(matches!(vm.div(a, z), Err(Error::DivisionByZero)));
    }

    #[test]
    fn numbers_compare_across_kinds() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let one = vm.new_int(1);
        let also_one = vm.new_float(1.0);
        let two = vm.new_int(2);
        assert!(vm.equals(one, also_one));
        assert_eq!(vm.compare(two, also_one).unwrap(), Ordering::Greater);
        let s = vm.new_str("1");
        assert!(!vm.equals(one, s));
        assert!(matches!(vm.compare(one, s), Err(Error::NotComparable { .. })));
    }

    #[test]
    fn int_constructor_parses_strings() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let int = vm.core().int;
        let s = vm.new_str(" 42 ");
        let n = vm.instantiate(int, &[s]).unwrap();
        assert_eq!(vm.heap.int(n), Some(42));
        let bad = vm.new_str("x");
        assert!(vm.instantiate(int, &[bad]).is_err());
    }
}
