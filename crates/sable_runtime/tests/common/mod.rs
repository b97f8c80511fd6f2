#![allow(dead_code)]

use std::process::{Command, Output};

use sable_runtime::{Assembler, CodeUnit, Op, Ref, Registry, Runtime, RuntimeConfig, Vm};

/// Set in the environment of a re-run test binary that should take the
/// fatal path.
pub const FATAL_CHILD: &str = "SABLE_TEST_FATAL_CHILD";

pub fn boot() -> Runtime {
    Runtime::boot(Registry::default(), RuntimeConfig::default())
}

pub fn boot_with(config: RuntimeConfig) -> Runtime {
    Runtime::boot(Registry::default(), config)
}

/// A module-less bytecode method over `unit`.
pub fn method(vm: &mut Vm, unit: CodeUnit) -> Ref {
    vm.new_bytecode_method(unit, None)
}

/// init(self, n) { if n > 0 { Node(n - 1) } }
///
/// Every level re-enters the interpreter through the class's `call` slot.
pub fn node_init_unit() -> CodeUnit {
    let mut asm = Assembler::new("init");
    asm.param("self").param("n");
    let done = asm.new_label();
    asm.push_name("n");
    asm.push_int(0);
    asm.emit(Op::Gt);
    asm.jump(Op::JumpIfFalse, done);
    asm.push_name("Node");
    asm.push_name("n");
    asm.push_int(1);
    asm.emit(Op::Sub);
    asm.call(1);
    asm.emit(Op::Pop);
    asm.resolve(done);
    asm.emit(Op::PushNil);
    asm.emit(Op::Return);
    asm.finish()
}

pub fn int_of(vm: &Vm, r: Ref) -> i64 {
    match vm.heap.int(r) {
        Some(i) => i,
        None => panic!("expected an int, got {}", vm.heap.display(r)),
    }
}

pub fn in_fatal_child() -> bool {
    std::env::var_os(FATAL_CHILD).is_some()
}

/// Re-run only `test` from the current test binary with `FATAL_CHILD` set.
pub fn run_fatal_child(test: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(FATAL_CHILD, "1")
        .output()
        .unwrap()
}

/// The child must have aborted and reported `needle` on stderr.
pub fn assert_aborted_with(out: &Output, needle: &str) {
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!out.status.success(), "child exited cleanly; stderr:\n{stderr}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(out.status.signal(), Some(6), "expected SIGABRT; stderr:\n{stderr}");
    }
    assert!(stderr.contains("fatal: "), "no fatal report in:\n{stderr}");
    assert!(stderr.contains(needle), "`{needle}` not in:\n{stderr}");
}
