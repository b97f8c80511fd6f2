//! Builtin classes and global natives.

mod collection;
mod method;
mod natives;
mod number;
mod object;
mod string;
mod task;

use crate::core::class::{Class, Slots};
use crate::core::heap::{Heap, ObjKind, Ref};
use crate::core::value::NativeFn;
use crate::errors::{Error, Result};
use crate::vm::Vm;

/// The builtin classes and singletons of one heap.
#[derive(Clone, Copy, Debug)]
pub struct Core {
    pub object: Ref,
    pub class: Ref,
    pub nil_class: Ref,
    pub bool_class: Ref,
    pub int: Ref,
    pub float: Ref,
    pub str: Ref,
    pub array: Ref,
    pub hash: Ref,
    pub method: Ref,
    pub code: Ref,
    pub frame: Ref,
    pub module: Ref,
    pub task: Ref,
    pub var: Ref,
    pub error: Ref,
    pub nil: Ref,
    pub true_: Ref,
    pub false_: Ref,
}

impl Core {
    pub fn classes(&self) -> [Ref; 16] {
        [
            self.object,
            self.class,
            self.nil_class,
            self.bool_class,
            self.int,
            self.float,
            self.str,
            self.array,
            self.hash,
            self.method,
            self.code,
            self.frame,
            self.module,
            self.task,
            self.var,
            self.error,
        ]
    }
}

/// Create the builtin classes and singletons in a fresh heap and root them.
///
/// `Class` is its own class. Its super class, `Object`, does not exist yet
/// when `Class` is allocated, so the link is set afterwards.
pub(crate) fn bootstrap(heap: &mut Heap) -> Core {
    let class = heap.alloc_self_classed(ObjKind::Class(Box::new(Class::new(
        "Class",
        None,
        0,
        object::class_slots(),
    ))));
    let object = heap.alloc(class, ObjKind::Class(Box::new(Class::new("Object", None, 0, object::object_slots()))));
    heap.class_mut(class).sup = Some(object);

    let mut sub = |name: &str, slots: Slots| {
        heap.alloc(class, ObjKind::Class(Box::new(Class::new(name, Some(object), 0, slots))))
    };
    let nil_class = sub("Nil", number::nil_slots());
    let bool_class = sub("Bool", number::bool_slots());
    let int = sub("Int", number::int_slots());
    let float = sub("Float", number::float_slots());
    let str = sub("Str", string::str_slots());
    let array = sub("Array", collection::array_slots());
    let hash = sub("Hash", collection::hash_slots());
    let method = sub("Method", method::method_slots());
    let code = sub("Code", method::code_slots());
    let frame = sub("Frame", method::frame_slots());
    let module = sub("Module", method::module_slots());
    let task = sub("Task", task::task_slots());
    let var = sub("Var", method::var_slots());
    let error = sub("Error", task::error_slots());

    let nil = heap.alloc(nil_class, ObjKind::Nil);
    let true_ = heap.alloc(bool_class, ObjKind::Bool(true));
    let false_ = heap.alloc(bool_class, ObjKind::Bool(false));

    let core = Core {
        object,
        class,
        nil_class,
        bool_class,
        int,
        float,
        str,
        array,
        hash,
        method,
        code,
        frame,
        module,
        task,
        var,
        error,
        nil,
        true_,
        false_,
    };
    for r in core.classes() {
        heap.add_root(r);
    }
    for r in [nil, true_, false_] {
        heap.add_root(r);
    }
    core
}

/// Native methods on the builtin classes.
pub(crate) fn install_methods(vm: &mut Vm) {
    let core = vm.core;
    string::install(vm, core.str);
    collection::install(vm, core.array, core.hash);
    task::install(vm, core.task);
}

pub type BuiltinFn = NativeFn;

/// Global natives, collected by providers and installed into a VM.
pub struct BuiltinRegistry {
    entries: Vec<(String, BuiltinFn)>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, name: &str, fun: BuiltinFn) {
        self.entries.push((name.to_string(), fun));
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn install_into(self, vm: &mut Vm) {
        for (name, fun) in self.entries {
            let m = vm.new_native(&name, fun);
            vm.set_global(&name, m);
        }
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub trait BuiltinProvider {
    fn install(&self, registry: &mut BuiltinRegistry);
}

pub struct StdBuiltinProvider;

impl BuiltinProvider for StdBuiltinProvider {
    fn install(&self, registry: &mut BuiltinRegistry) {
        registry.register("print", natives::builtin_print);
        registry.register("str", natives::builtin_str);
        registry.register("class_new", natives::builtin_class_new);
        registry.register("define", natives::builtin_define);
        registry.register("import", natives::builtin_import);
        registry.register("error", natives::builtin_error);
        registry.register("panic", natives::builtin_panic);
        registry.register("gc", natives::builtin_gc);
        // tasks
        registry.register("spawn", natives::builtin_spawn);
        registry.register("send", natives::builtin_send);
        registry.register("recv", natives::builtin_recv);
        registry.register("join", natives::builtin_join);
        registry.register("current_task", natives::builtin_current_task);
    }
}

pub(crate) fn type_mismatch(heap: &Heap, expected: &'static str, found: Ref) -> Error {
    Error::TypeMismatch { expected, found: heap.class_name(found).to_string() }
}

pub(crate) fn expect_args(name: &str, args: &[Ref], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::Arity { method: name.to_string(), expected, got: args.len() });
    }
    Ok(())
}

/// `init` for classes that only the runtime itself creates.
pub(crate) fn not_instantiable(vm: &mut Vm, class: Ref, _args: &[Ref]) -> Result<Ref> {
    Err(Error::NotInstantiable(vm.heap.class(class).name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn class_is_its_own_class_and_inherits_object() {
        let mut heap = Heap::new(&RuntimeConfig::default());
        let core = bootstrap(&mut heap);
        assert_eq!(heap.class_of(core.class), core.class);
        assert_eq!(heap.class(core.class).sup, Some(core.object));
        assert_eq!(heap.class(core.object).sup, None);
        for c in core.classes() {
            assert_eq!(heap.class_of(c), core.class);
            assert!(heap.is_subclass(c, core.object));
        }
    }

    #[test]
    fn bootstrap_objects_survive_collection() {
        let mut heap = Heap::new(&RuntimeConfig::default());
        let core = bootstrap(&mut heap);
        let live = heap.live_count();
        assert_eq!(heap.collect([]), 0);
        assert_eq!(heap.live_count(), live);
        assert!(heap.contains(core.nil));
    }
}
