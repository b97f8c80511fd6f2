mod common;

use common::boot;

#[test]
fn reachable_objects_survive_and_garbage_is_reclaimed() {
    let mut rt = boot();
    let vm = rt.vm();
    vm.collect();
    let baseline = vm.heap.live_count();

    let items: Vec<_> = (0..100).map(|i| vm.new_int(i)).collect();
    let kept = vm.new_array(items.clone());
    vm.set_global("kept", kept);
    for i in 0..1000 {
        vm.new_str(&format!("garbage {i}"));
    }

    let freed = vm.collect();
    assert_eq!(freed, 1000);
    assert_eq!(vm.heap.live_count(), baseline + 101);
    assert!(vm.heap.contains(kept));
    assert!(items.iter().all(|r| vm.heap.contains(*r)));
    assert!(vm.heap.display(kept).starts_with("[0, 1, 2"));
}

#[test]
fn repeated_cycles_do_not_leak() {
    let mut rt = boot();
    let vm = rt.vm();
    vm.collect();
    let baseline = vm.heap.live_count();
    let freed_before = vm.stats().freed_total;
    for round in 0..5 {
        for i in 0..500 {
            let n = vm.new_int(i);
            let s = vm.new_str("x");
            vm.new_array(vec![n, s]);
        }
        assert_eq!(vm.collect(), 1500, "round {round}");
        assert_eq!(vm.heap.live_count(), baseline);
    }
    let stats = vm.stats();
    assert_eq!(stats.freed_total - freed_before, 7500);
    assert_eq!(stats.freed_last, 1500);
}

#[test]
fn unreachable_cycles_are_collected() {
    let mut rt = boot();
    let vm = rt.vm();
    vm.collect();
    let a = vm.new_array(Vec::new());
    let b = vm.new_array(vec![a]);
    vm.heap.array_mut(a).unwrap().push(b);
    assert_eq!(vm.collect(), 2);
    assert!(!vm.heap.contains(a));
    assert!(!vm.heap.contains(b));
}

#[test]
fn temporary_roots_pin_values() {
    let mut rt = boot();
    let vm = rt.vm();
    let s = vm.new_str("pinned");
    vm.push_root(s);
    vm.collect();
    assert!(vm.heap.contains(s));
    vm.pop_root();
    vm.collect();
    assert!(!vm.heap.contains(s));
}

#[test]
fn instance_slots_and_class_methods_are_traced() {
    let mut rt = boot();
    let vm = rt.vm();
    let object = vm.core().object;
    let node = vm.class_new("Node", Some(object), 1);
    let payload = vm.new_str("payload");
    let n = vm.instantiate(node, &[]).unwrap();
    vm.heap.instance_slots_mut(n).unwrap()[0] = payload;
    vm.define_method(node, "sample", n);
    vm.collect();
    // Node is in the class registry; its method table reaches the instance.
    assert!(vm.heap.contains(n));
    assert!(vm.heap.contains(payload));
}

#[test]
fn freed_slots_are_reused_with_a_new_generation() {
    let mut rt = boot();
    let vm = rt.vm();
    vm.collect();
    let old = vm.new_int(1);
    vm.collect();
    let new = vm.new_int(2);
    assert_eq!(old.slot(), new.slot());
    assert_ne!(old, new);
    assert!(!vm.heap.contains(old));
}
