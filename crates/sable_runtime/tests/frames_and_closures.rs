mod common;

use common::{boot, int_of, method};
use sable_runtime::core::fast_map_new;
use sable_runtime::{Assembler, MethodKind, Op};

#[test]
fn fresh_frame_has_one_unbound_var_per_local() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("three");
    asm.param("a").local("b").local("c");
    asm.emit(Op::PushNil);
    asm.emit(Op::Return);
    let m = method(vm, asm.finish());

    let frame = vm.build_frame(m).unwrap();
    let f = vm.heap.frame(frame).unwrap();
    assert_eq!(f.method, m);
    assert_eq!(f.locals.len(), 3);
    assert!(f.free.is_empty());
    for name in ["a", "b", "c"] {
        let var = f.locals[name];
        assert_eq!(vm.heap.var_get(var), None, "{name} should start unbound");
    }
    let vars: Vec<_> = f.locals.values().copied().collect();
    for (i, a) in vars.iter().enumerate() {
        for b in &vars[i + 1..] {
            assert_ne!(a, b, "locals must not share a Var");
        }
    }
}

#[test]
fn closure_bindings_alias_frame_vars() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("inner");
    asm.local("x").local("y");
    asm.push_name("x");
    asm.emit(Op::Return);
    let unit = asm.finish();
    let code = vm.load_code(unit.into());

    let seven = vm.new_int(7);
    let shared = vm.new_var(Some(seven));
    let mut bindings = fast_map_new();
    bindings.insert("x".to_string(), shared);
    let closure = vm.new_method("inner", MethodKind::Closure { code, module: None, bindings }, None);

    let frame = vm.build_frame(closure).unwrap();
    let f = vm.heap.frame(frame).unwrap();
    assert_eq!(f.locals.len(), 2);
    assert_eq!(f.locals["x"], shared);
    assert_ne!(f.locals["y"], shared);
    assert_eq!(vm.heap.var_get(f.locals["y"]), None);

    let v = vm.invoke(closure, &[]).unwrap();
    assert_eq!(v, seven);
}

/// counter() { x = 1; bump = fn() { x = x + 1; return x }; bump(); bump(); return x }
#[test]
fn closures_write_through_to_the_enclosing_frame() {
    let mut rt = boot();
    let vm = rt.vm();

    let mut inner = Assembler::new("bump");
    inner.freevar("x");
    inner.push_name("x");
    inner.push_int(1);
    inner.emit(Op::Add);
    inner.store_name("x");
    inner.push_name("x");
    inner.emit(Op::Return);
    let bump = inner.finish();

    let mut asm = Assembler::new("counter");
    asm.local("x").local("bump");
    asm.push_int(1);
    asm.store_name("x");
    asm.make_closure(bump);
    asm.store_name("bump");
    for _ in 0..2 {
        asm.push_name("bump");
        asm.call(0);
        asm.emit(Op::Pop);
    }
    asm.push_name("x");
    asm.emit(Op::Return);
    let counter = method(vm, asm.finish());

    let v = vm.invoke(counter, &[]).unwrap();
    assert_eq!(int_of(vm, v), 3);
}

/// A closure returned from its defining frame keeps the captured Var alive.
#[test]
fn captured_vars_outlive_their_frame() {
    let mut rt = boot();
    let vm = rt.vm();

    let mut inner = Assembler::new("get");
    inner.freevar("secret");
    inner.push_name("secret");
    inner.emit(Op::Return);
    let get = inner.finish();

    let mut asm = Assembler::new("make");
    asm.local("secret");
    asm.push_str("kept");
    asm.store_name("secret");
    asm.make_closure(get);
    asm.emit(Op::Return);
    let make = method(vm, asm.finish());

    let closure = vm.invoke(make, &[]).unwrap();
    vm.push_root(closure);
    vm.collect();
    let v = vm.invoke(closure, &[]).unwrap();
    vm.pop_root();
    assert_eq!(vm.heap.display(v), "kept");
}

#[test]
fn capturing_an_unknown_name_panics() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut inner = Assembler::new("orphan");
    inner.freevar("ghost");
    inner.emit(Op::PushNil);
    inner.emit(Op::Return);
    let orphan = inner.finish();

    let mut asm = Assembler::new("outer");
    asm.make_closure(orphan);
    asm.emit(Op::Return);
    let outer = method(vm, asm.finish());
    let err = vm.invoke(outer, &[]).unwrap_err();
    let e = vm.heap.error(err.panic_value().unwrap()).unwrap();
    assert_eq!(e.message, "unbound name `ghost`");
}
