//! Bytecode virtual machine.
//!
//! One `Vm` per task. It owns the task's heap, operand stack and frame
//! stack, plus the class registry, global namespace and module table that
//! act as GC roots.

mod dispatch;
mod frame;
mod protocol;

use std::sync::Arc;

use indexmap::IndexMap;
use sable_ir::{CodeUnit, Constant};

pub(crate) use frame::ActiveFrame;

use crate::builtins::{self, BuiltinProvider, BuiltinRegistry, Core, StdBuiltinProvider};
use crate::config::RuntimeConfig;
use crate::core::class::{Class, Slots};
use crate::core::heap::{Heap, HeapStats, ObjKind, Ref};
use crate::core::value::{Code, ErrorObj, HashTable, Method, MethodKind, Module, NativeFn, TaskRef};
use crate::core::{FastHashMap, fast_map_new, fast_map_with_capacity};
use crate::errors::{Error, Result, messages};
use crate::module::Member;
use crate::runtime::Process;
use crate::task::pack::Packed;
use crate::task::{self, Joined, Outcome, TaskHandle};

pub struct Vm {
    pub heap: Heap,
    pub(crate) core: Core,
    pub(crate) stack: Vec<Ref>,
    pub(crate) frames: Vec<ActiveFrame>,
    temp_roots: Vec<Ref>,
    classes: IndexMap<String, Ref>,
    globals: FastHashMap<String, Ref>,
    modules: FastHashMap<String, Ref>,
    process: Arc<Process>,
    task: TaskHandle,
    pub(crate) config: RuntimeConfig,
    ticks: usize,
    /// Interpreter loops currently running on the Rust stack.
    native_depth: usize,
    output: String,
}

impl Vm {
    pub(crate) fn new(process: Arc<Process>, task: TaskHandle) -> Self {
        let config = process.config;
        let mut heap = Heap::new(&config);
        let core = builtins::bootstrap(&mut heap);
        let mut vm = Self {
            heap,
            core,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(32),
            temp_roots: Vec::new(),
            classes: IndexMap::new(),
            globals: fast_map_new(),
            modules: fast_map_new(),
            process,
            task,
            config,
            ticks: 0,
            native_depth: 0,
            output: String::new(),
        };
        for class in core.classes() {
            let name = vm.heap.class(class).name.clone();
            vm.classes.insert(name, class);
        }
        builtins::install_methods(&mut vm);
        let mut registry = BuiltinRegistry::new();
        StdBuiltinProvider.install(&mut registry);
        registry.install_into(&mut vm);
        trace!(config.trace, task, "task {} heap {} ready", vm.task.id(), vm.heap.id());
        vm
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Text written by `print` since the last call.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    // ==================== Allocation ====================

    #[inline]
    pub fn nil(&self) -> Ref {
        self.core.nil
    }

    #[inline]
    pub fn bool(&self, b: bool) -> Ref {
        if b { self.core.true_ } else { self.core.false_ }
    }

    pub fn new_int(&mut self, i: i64) -> Ref {
        self.heap.alloc(self.core.int, ObjKind::Int(i))
    }

    pub fn new_float(&mut self, f: f64) -> Ref {
        self.heap.alloc(self.core.float, ObjKind::Float(f))
    }

    pub fn new_str(&mut self, s: &str) -> Ref {
        self.new_bytes(s.as_bytes())
    }

    pub fn new_bytes(&mut self, bytes: impl Into<Box<[u8]>>) -> Ref {
        self.heap.alloc(self.core.str, ObjKind::Str(bytes.into()))
    }

    pub fn new_array(&mut self, items: Vec<Ref>) -> Ref {
        self.heap.alloc(self.core.array, ObjKind::Array(items))
    }

    pub fn new_hash(&mut self) -> Ref {
        self.heap.alloc(self.core.hash, ObjKind::Hash(HashTable::default()))
    }

    /// Insert or replace `key` in a hash.
    pub fn hash_set(&mut self, hash: Ref, key: Ref, value: Ref) -> Result<()> {
        let Some(table) = self.heap.hash(hash) else {
            return Err(builtins::type_mismatch(&self.heap, "hash", hash));
        };
        match table.position(&self.heap, key) {
            Some(i) => {
                if let Some(t) = self.heap.hash_mut(hash) {
                    t.values[i] = value;
                }
            }
            None => {
                if let Some(t) = self.heap.hash_mut(hash) {
                    t.keys.push(key);
                    t.values.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn new_var(&mut self, value: Option<Ref>) -> Ref {
        self.heap.alloc(self.core.var, ObjKind::Var(value))
    }

    /// An Error object carrying the current backtrace.
    pub fn new_error(&mut self, message: impl Into<String>, cause: Option<Ref>) -> Ref {
        let backtrace = self.backtrace();
        self.alloc_error(message.into(), cause, backtrace)
    }

    pub(crate) fn alloc_error(&mut self, message: String, cause: Option<Ref>, backtrace: Vec<String>) -> Ref {
        self.heap.alloc(
            self.core.error,
            ObjKind::Error(Box::new(ErrorObj { message, cause, backtrace })),
        )
    }

    pub fn new_method(&mut self, name: impl Into<String>, kind: MethodKind, receiver: Option<Ref>) -> Ref {
        self.heap.alloc(
            self.core.method,
            ObjKind::Method(Box::new(Method { name: name.into(), kind, receiver })),
        )
    }

    pub fn new_native(&mut self, name: &str, f: NativeFn) -> Ref {
        self.new_method(name, MethodKind::Native(f), None)
    }

    /// Copy of `method` bound to `receiver`.
    pub fn bind(&mut self, method: Ref, receiver: Ref) -> Ref {
        let Some(m) = self.heap.method(method) else {
            fatal!("bind: {method:?} is a {}", self.heap.kind(method).kind_name());
        };
        let mut bound = m.clone();
        bound.receiver = Some(receiver);
        self.heap.alloc(self.core.method, ObjKind::Method(Box::new(bound)))
    }

    pub(crate) fn new_task_ref(&mut self, handle: TaskHandle) -> Ref {
        let local = handle.same(&self.task);
        self.heap.alloc(self.core.task, ObjKind::Task(TaskRef { handle, local }))
    }

    /// Load a code unit into this heap, materializing its constant pool.
    pub fn load_code(&mut self, unit: Arc<CodeUnit>) -> Ref {
        let mut consts = Vec::with_capacity(unit.consts.len());
        for c in &unit.consts {
            let r = match c {
                Constant::Nil => self.nil(),
                Constant::Int(i) => self.new_int(*i),
                Constant::Float(f) => self.new_float(*f),
                Constant::Str(s) => self.new_str(s),
                Constant::Code(inner) => self.load_code(Arc::clone(inner)),
            };
            consts.push(r);
        }
        self.heap.alloc(self.core.code, ObjKind::Code(Box::new(Code { unit, consts })))
    }

    /// A bytecode method over `unit` resolving globals in `module`.
    pub fn new_bytecode_method(&mut self, unit: impl Into<Arc<CodeUnit>>, module: Option<Ref>) -> Ref {
        let unit = unit.into();
        let name = unit.name.clone();
        let code = self.load_code(unit);
        self.new_method(name, MethodKind::Bytecode { code, module }, None)
    }

    pub(crate) fn code_unit(&self, code: Ref) -> Arc<CodeUnit> {
        match self.heap.code(code) {
            Some(c) => Arc::clone(&c.unit),
            None => fatal!("{code:?} is a {} where code was required", self.heap.kind(code).kind_name()),
        }
    }

    pub(crate) fn module_name(&self, module: Ref) -> String {
        match self.heap.module(module) {
            Some(m) => m.name.clone(),
            None => fatal!("{module:?} is a {} where a module was required", self.heap.kind(module).kind_name()),
        }
    }

    // ==================== Classes and names ====================

    /// Create a class and register it by name. The new class starts with
    /// the super class's own `str` slot; every other slot is inherited
    /// through the chain.
    pub fn class_new(&mut self, name: &str, sup: Option<Ref>, size: usize) -> Ref {
        let str_slot = sup.and_then(|s| self.heap.class(s).slots.str);
        let class = Class::new(name, sup, size, Slots { str: str_slot, ..Slots::default() });
        let r = self.heap.alloc(self.core.class, ObjKind::Class(Box::new(class)));
        self.classes.insert(name.to_string(), r);
        trace!(self.config.trace, vm, "class {name} defined");
        r
    }

    pub fn class_named(&self, name: &str) -> Option<Ref> {
        self.classes.get(name).copied()
    }

    /// Registered class names in definition order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn define_method(&mut self, class: Ref, name: &str, method: Ref) {
        self.heap.class_mut(class).methods.insert(name.to_string(), method);
    }

    pub fn define_native_method(&mut self, class: Ref, name: &str, f: NativeFn) {
        let m = self.new_native(name, f);
        self.define_method(class, name, m);
    }

    pub fn set_global(&mut self, name: &str, value: Ref) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Ref> {
        self.globals.get(name).copied()
    }

    // ==================== Modules ====================

    /// Materialize a registered module in this task, once.
    pub fn import(&mut self, name: &str) -> Result<Ref> {
        if let Some(m) = self.modules.get(name) {
            return Ok(*m);
        }
        let Some(spec) = self.process.registry.get(name) else {
            return Err(Error::NoModule(name.to_string()));
        };
        let module = self.heap.alloc(
            self.core.module,
            ObjKind::Module(Box::new(Module {
                name: name.to_string(),
                locals: fast_map_with_capacity(spec.len()),
            })),
        );
        // Registered first so members can refer back to it.
        self.modules.insert(name.to_string(), module);
        for (member, def) in spec.members() {
            let method = match def {
                Member::Native(f) => self.new_native(member, *f),
                Member::Code(unit) => self.new_bytecode_method(Arc::clone(unit), Some(module)),
            };
            let var = self.new_var(Some(method));
            if let Some(m) = self.heap.module_mut(module) {
                m.locals.insert(member.clone(), var);
            }
        }
        trace!(self.config.trace, module, "imported {name} ({} members)", spec.len());
        Ok(module)
    }

    // ==================== GC ====================

    /// Keep `r` alive across allocations that may reach a safe point.
    pub fn push_root(&mut self, r: Ref) {
        self.temp_roots.push(r);
    }

    pub fn pop_root(&mut self) {
        self.temp_roots.pop();
    }

    /// Run a full collection now. Returns the number of objects freed.
    pub fn collect(&mut self) -> usize {
        let mut extra = Vec::with_capacity(
            self.stack.len() + self.frames.len() * 4 + self.temp_roots.len() + self.classes.len(),
        );
        extra.extend_from_slice(&self.stack);
        for f in &self.frames {
            extra.push(f.frame);
            extra.push(f.method);
            extra.push(f.code);
            extra.extend(f.module);
        }
        extra.extend_from_slice(&self.temp_roots);
        extra.extend(self.classes.values().copied());
        extra.extend(self.globals.values().copied());
        extra.extend(self.modules.values().copied());
        let freed = self.heap.collect(extra);
        trace!(
            self.config.trace,
            gc,
            "heap {}: freed {freed}, live {}, next threshold {}",
            self.heap.id(),
            self.heap.live_count(),
            self.heap.stats().threshold
        );
        freed
    }

    // ==================== Tasks ====================

    pub fn task(&self) -> &TaskHandle {
        &self.task
    }

    pub fn task_handle(&self, r: Ref) -> Result<&TaskHandle> {
        match self.heap.task(r) {
            Some(t) => Ok(&t.handle),
            None => Err(builtins::type_mismatch(&self.heap, messages::NOT_A_TASK, r)),
        }
    }

    pub fn current_task(&mut self) -> Ref {
        self.new_task_ref(self.task.clone())
    }

    /// Start a task that calls `callable` with no arguments.
    pub fn spawn(&mut self, callable: Ref) -> Result<Ref> {
        let packed = self.pack(callable)?;
        let handle = task::spawn(&self.process, packed);
        Ok(self.new_task_ref(handle))
    }

    /// Deep-copy `value` into the mailbox of `target`.
    pub fn send(&mut self, target: Ref, value: Ref) -> Result<()> {
        let handle = self.task_handle(target)?.clone();
        let packed = self.pack(value)?;
        trace!(self.config.trace, task, "task {} -> task {}", self.task.id(), handle.id());
        handle.post(packed);
        Ok(())
    }

    /// Block until this task's mailbox has a message.
    pub fn recv(&mut self) -> Result<Ref> {
        let packed = self.task.take();
        self.unpack(packed)
    }

    /// Wait for `target` to finish and unpack its outcome.
    pub fn join(&mut self, target: Ref) -> Result<Joined> {
        let handle = self.task_handle(target)?.clone();
        if handle.same(&self.task) {
            return Err(Error::JoinSelf);
        }
        if handle.is_main() {
            return Err(Error::JoinMain);
        }
        let outcome = handle.wait();
        self.process.untrack(&handle);
        match outcome {
            Some(Outcome::Returned(p)) => Ok(Joined::Returned(self.unpack(p)?)),
            Some(Outcome::Panicked(p)) => Ok(Joined::Panicked(self.unpack(p)?)),
            None => fatal!("task {} exited without an outcome", handle.id()),
        }
    }

    /// Entry point of a spawned task.
    pub(crate) fn run_entry(&mut self, callable: Packed) -> Outcome {
        let result = self.unpack(callable).and_then(|c| self.invoke(c, &[]));
        match result {
            Ok(value) => match self.pack(value) {
                Ok(p) => Outcome::Returned(p),
                Err(e) => {
                    trace!(self.config.trace, task, "task {} result dropped: {e}", self.task.id());
                    Outcome::Returned(Packed::Nil)
                }
            },
            Err(e) => {
                let value = self.error_to_panic(e);
                let packed = self.pack(value).unwrap_or_else(|_| Packed::Error {
                    message: self.heap.display(value),
                    cause: None,
                    backtrace: Vec::new(),
                });
                Outcome::Panicked(packed)
            }
        }
    }
}
