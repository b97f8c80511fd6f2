mod common;

use common::{boot, int_of, method, node_init_unit};
use sable_runtime::{Assembler, Error, Joined, Op, PackError, TaskState};

#[test]
fn send_to_self_then_recv() {
    let mut rt = boot();
    let vm = rt.vm();
    let me = vm.current_task();
    let v = vm.new_int(42);
    vm.send(me, v).unwrap();
    assert_eq!(vm.task().pending_messages(), 1);
    let got = vm.recv().unwrap();
    assert_ne!(got, v);
    assert_eq!(int_of(vm, got), 42);
    assert_eq!(vm.task().pending_messages(), 0);
}

#[test]
fn send_to_self_then_recv_from_bytecode() {
    let mut rt = boot();
    let vm = rt.vm();
    // echo() { send(current_task(), 42); return recv() }
    let mut asm = Assembler::new("echo");
    asm.push_name("send");
    asm.push_name("current_task");
    asm.call(0);
    asm.push_int(42);
    asm.call(2);
    asm.emit(Op::Pop);
    asm.push_name("recv");
    asm.call(0);
    asm.emit(Op::Return);
    let echo = method(vm, asm.finish());

    let v = vm.invoke(echo, &[]).unwrap();
    assert_eq!(int_of(vm, v), 42);

    // The same program in a spawned task.
    let t = vm.spawn(echo).unwrap();
    let joined = vm.join(t).unwrap();
    assert!(!joined.is_panic());
    assert_eq!(int_of(vm, joined.value()), 42);
}

#[test]
fn task_handles_round_trip_with_one_more_reference() {
    let mut rt = boot();
    let vm = rt.vm();
    let t = vm.current_task();
    let handle = vm.task_handle(t).unwrap().clone();
    let before = handle.ref_count();

    let packed = vm.pack(t).unwrap();
    assert_eq!(handle.ref_count(), before + 1);
    let back = vm.unpack(packed).unwrap();
    assert_eq!(handle.ref_count(), before + 1);

    assert_ne!(back, t);
    assert!(vm.task_handle(back).unwrap().same(&handle));
    assert!(vm.equals(t, back));
}

#[test]
fn messages_from_one_sender_arrive_in_order() {
    let mut rt = boot();
    let vm = rt.vm();

    // worker() { t = recv(); send(t, 1); send(t, 2); send(t, 3) }
    let mut asm = Assembler::new("worker");
    asm.local("t");
    asm.push_name("recv");
    asm.call(0);
    asm.store_name("t");
    for k in 1..=3 {
        asm.push_name("send");
        asm.push_name("t");
        asm.push_int(k);
        asm.call(2);
        asm.emit(Op::Pop);
    }
    let worker = method(vm, asm.finish());

    let child = vm.spawn(worker).unwrap();
    let me = vm.current_task();
    vm.send(child, me).unwrap();
    let got: Vec<i64> = (0..3)
        .map(|_| {
            let r = vm.recv().unwrap();
            int_of(vm, r)
        })
        .collect();
    assert_eq!(got, [1, 2, 3]);

    let joined = vm.join(child).unwrap();
    assert_eq!(joined, Joined::Returned(vm.nil()));
}

#[test]
fn join_returns_the_result_and_is_repeatable() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("answer");
    asm.push_int(6);
    asm.push_int(7);
    asm.emit(Op::Mul);
    asm.emit(Op::Return);
    let answer = method(vm, asm.finish());

    let t = vm.spawn(answer).unwrap();
    let first = vm.join(t).unwrap();
    assert!(!first.is_panic());
    assert_eq!(int_of(vm, first.value()), 42);
    assert_eq!(vm.task_handle(t).unwrap().state(), TaskState::Joined);

    let second = vm.join(t).unwrap();
    assert_eq!(int_of(vm, second.value()), 42);
    assert_eq!(rt.process().unjoined(), 0);
}

#[test]
fn a_panicking_task_does_not_take_down_its_joiner() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("crash");
    asm.push_int(1);
    asm.push_int(0);
    asm.emit(Op::Div);
    asm.emit(Op::Return);
    let crash = method(vm, asm.finish());

    let t = vm.spawn(crash).unwrap();
    let joined = vm.join(t).unwrap();
    assert!(joined.is_panic());
    let e = vm.heap.error(joined.value()).unwrap();
    assert_eq!(e.message, "division by zero");
    assert_eq!(e.backtrace, vec!["crash @2".to_string()]);

    // The joiner carries on.
    let a = vm.new_int(2);
    let b = vm.new_int(3);
    let sum = vm.add(a, b).unwrap();
    assert_eq!(int_of(vm, sum), 5);
}

#[test]
fn raised_values_travel_to_the_joiner() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("raise");
    asm.push_name("panic");
    asm.push_str("boom");
    asm.call(1);
    let raise = method(vm, asm.finish());
    let t = vm.spawn(raise).unwrap();
    let join = vm.global("join").unwrap();
    let v = vm.call(join, &[t]).unwrap();
    assert_eq!(vm.heap.display(v), "boom");
}

#[test]
fn deep_constructor_recursion_panics_only_its_task() {
    let mut rt = boot();
    let vm = rt.vm();
    // worker() { define(class_new("Node", Object, 0), "init", <init>); return Node(5000) }
    let mut asm = Assembler::new("worker");
    asm.push_name("define");
    asm.push_name("class_new");
    asm.push_str("Node");
    asm.push_name("Object");
    asm.push_int(0);
    asm.call(3);
    asm.push_str("init");
    asm.make_closure(node_init_unit());
    asm.call(3);
    asm.emit(Op::Pop);
    asm.push_name("Node");
    asm.push_int(5000);
    asm.call(1);
    asm.emit(Op::Return);
    let worker = method(vm, asm.finish());

    let t = vm.spawn(worker).unwrap();
    let joined = vm.join(t).unwrap();
    assert!(joined.is_panic());
    let e = vm.heap.error(joined.value()).unwrap();
    assert!(e.message.starts_with("stack overflow"), "{}", e.message);
}

#[test]
fn joining_yourself_or_main_is_an_error() {
    let mut rt = boot();
    let vm = rt.vm();
    let me = vm.current_task();
    assert!(matches!(vm.join(me), Err(Error::JoinSelf)));

    // worker() { return join(recv()) }
    let mut asm = Assembler::new("worker");
    asm.push_name("join");
    asm.push_name("recv");
    asm.call(0);
    asm.call(1);
    asm.emit(Op::Return);
    let worker = method(vm, asm.finish());
    let child = vm.spawn(worker).unwrap();
    vm.send(child, me).unwrap();
    let joined = vm.join(child).unwrap();
    assert!(joined.is_panic());
    let e = vm.heap.error(joined.value()).unwrap();
    assert_eq!(e.message, "the main task cannot be joined");
}

#[test]
fn spawn_opcode_starts_a_task() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("seven");
    asm.push_int(7);
    asm.emit(Op::Return);
    let seven = method(vm, asm.finish());
    vm.set_global("seven", seven);

    // main() { t = spawn seven; return join(t) }
    let mut asm = Assembler::new("main");
    asm.local("t");
    asm.push_name("seven");
    asm.emit(Op::Spawn);
    asm.store_name("t");
    asm.push_name("join");
    asm.push_name("t");
    asm.call(1);
    asm.emit(Op::Return);
    let main = method(vm, asm.finish());
    let v = vm.invoke(main, &[]).unwrap();
    assert_eq!(int_of(vm, v), 7);
}

#[test]
fn instances_cannot_be_sent() {
    let mut rt = boot();
    let vm = rt.vm();
    let object = vm.core().object;
    let point = vm.class_new("Point", Some(object), 0);
    let p = vm.instantiate(point, &[]).unwrap();
    let me = vm.current_task();
    match vm.send(me, p) {
        Err(Error::Pack(PackError::Unsendable(class))) => assert_eq!(class, "Point"),
        other => panic!("expected an unsendable error, got {other:?}"),
    }
    assert!(matches!(vm.spawn(p), Err(Error::Pack(_))));
    assert_eq!(vm.task().pending_messages(), 0);
}

#[test]
fn collected_task_objects_release_their_handle() {
    let mut rt = boot();
    let vm = rt.vm();
    let gc = vm.global("gc").unwrap();
    let t = vm.spawn(gc).unwrap();
    vm.join(t).unwrap();
    let handle = vm.task_handle(t).unwrap().clone();
    assert_eq!(handle.ref_count(), 2);
    vm.collect();
    assert_eq!(handle.ref_count(), 1);
}

#[test]
fn unread_messages_are_dropped_when_a_task_finishes() {
    let mut rt = boot();
    let vm = rt.vm();
    // loner() { send(current_task(), current_task()) }
    let mut asm = Assembler::new("loner");
    asm.push_name("send");
    asm.push_name("current_task");
    asm.call(0);
    asm.push_name("current_task");
    asm.call(0);
    asm.call(2);
    asm.emit(Op::Pop);
    asm.emit(Op::PushNil);
    asm.emit(Op::Return);
    let loner = method(vm, asm.finish());

    let t = vm.spawn(loner).unwrap();
    vm.join(t).unwrap();
    let handle = vm.task_handle(t).unwrap().clone();
    assert_eq!(handle.pending_messages(), 0);
    // This clone and the task object in our heap.
    assert_eq!(handle.ref_count(), 2);

    // Later sends are dropped too.
    let v = vm.new_int(1);
    vm.send(t, v).unwrap();
    assert_eq!(handle.pending_messages(), 0);
}

#[test]
fn shutdown_waits_for_tasks_nobody_joined() {
    let mut rt = boot();
    let vm = rt.vm();
    let mut asm = Assembler::new("quick");
    asm.emit(Op::PushNil);
    asm.emit(Op::Return);
    let quick = method(vm, asm.finish());
    let t = vm.spawn(quick).unwrap();
    let handle = vm.task_handle(t).unwrap().clone();
    assert_eq!(rt.shutdown(), 1);
    assert_eq!(handle.state(), TaskState::Joined);
}
