//! Global native functions.

use super::{expect_args, type_mismatch};
use crate::core::heap::Ref;
use crate::errors::{Error, Result, messages};
use crate::vm::Vm;

fn string_arg(vm: &Vm, r: Ref) -> Result<String> {
    match vm.heap.str_lossy(r) {
        Some(s) => Ok(s.into_owned()),
        None => Err(type_mismatch(&vm.heap, messages::NOT_A_STRING, r)),
    }
}

/// Display each argument, space separated, followed by a newline.
pub(super) fn builtin_print(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    let mut line = String::new();
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        vm.heap.write_display(*a, &mut line);
    }
    line.push('\n');
    vm.write_output(&line);
    Ok(vm.nil())
}

pub(super) fn builtin_str(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("str", args, 1)?;
    Ok(vm.str_of(args[0]))
}

/// `class_new(name, super, size)`; a nil super makes a root class.
pub(super) fn builtin_class_new(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("class_new", args, 3)?;
    let name = string_arg(vm, args[0])?;
    let sup = if vm.heap.is_nil(args[1]) {
        None
    } else if vm.heap.try_class(args[1]).is_some() {
        Some(args[1])
    } else {
        return Err(type_mismatch(&vm.heap, messages::NOT_A_CLASS, args[1]));
    };
    let Some(size) = vm.heap.int(args[2]).and_then(|n| usize::try_from(n).ok()) else {
        return Err(type_mismatch(&vm.heap, messages::NOT_AN_INT, args[2]));
    };
    Ok(vm.class_new(&name, sup, size))
}

/// `define(class, name, method)` adds a method to a class's table.
pub(super) fn builtin_define(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("define", args, 3)?;
    if vm.heap.try_class(args[0]).is_none() {
        return Err(type_mismatch(&vm.heap, messages::NOT_A_CLASS, args[0]));
    }
    let name = string_arg(vm, args[1])?;
    vm.define_method(args[0], &name, args[2]);
    Ok(args[0])
}

pub(super) fn builtin_import(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("import", args, 1)?;
    let name = string_arg(vm, args[0])?;
    vm.import(&name)
}

/// `error(message)` or `error(message, cause)` builds an Error without
/// raising it.
pub(super) fn builtin_error(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    let error_class = vm.core.error;
    vm.instantiate(error_class, args)
}

/// Raise `value` as the current task's panic.
pub(super) fn builtin_panic(_vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("panic", args, 1)?;
    Err(Error::Panic(args[0]))
}

/// Collect now; returns the number of objects freed.
pub(super) fn builtin_gc(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("gc", args, 0)?;
    let freed = vm.collect();
    Ok(vm.new_int(freed as i64))
}

pub(super) fn builtin_spawn(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("spawn", args, 1)?;
    vm.spawn(args[0])
}

pub(super) fn builtin_send(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("send", args, 2)?;
    vm.send(args[0], args[1])?;
    Ok(vm.nil())
}

pub(super) fn builtin_recv(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("recv", args, 0)?;
    vm.recv()
}

/// The joined task's return value, or its panic value.
pub(super) fn builtin_join(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("join", args, 1)?;
    Ok(vm.join(args[0])?.value())
}

pub(super) fn builtin_current_task(vm: &mut Vm, args: &[Ref]) -> Result<Ref> {
    expect_args("current_task", args, 0)?;
    Ok(vm.current_task())
}

#[cfg(test)]
mod tests {
    use crate::{Registry, Runtime, RuntimeConfig};

    #[test]
    fn print_writes_display_forms() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let print = vm.global("print").unwrap();
        let s = vm.new_str("x =");
        let n = vm.new_int(3);
        vm.call(print, &[s, n]).unwrap();
        assert_eq!(vm.take_output(), "x = 3\n");
    }

    #[test]
    fn class_new_native_registers_the_class() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let class_new = vm.global("class_new").unwrap();
        let name = vm.new_str("Widget");
        let object = vm.core().object;
        let size = vm.new_int(1);
        let c = vm.call(class_new, &[name, object, size]).unwrap();
        assert_eq!(vm.class_named("Widget"), Some(c));
        assert_eq!(vm.heap.class(c).size, 1);
        assert!(vm.class_names().any(|n| n == "Widget"));
    }
}
