//! Payload types for the builtin object kinds.

use std::sync::Arc;

use sable_ir::CodeUnit;

use super::heap::{Heap, ObjKind, Ref, Trace, Tracer};
use super::FastHashMap;
use crate::errors::Result;
use crate::task::TaskHandle;
use crate::vm::Vm;

/// Signature of natively implemented methods. A bound receiver, if any, is
/// passed as `args[0]`.
pub type NativeFn = fn(&mut Vm, &[Ref]) -> Result<Ref>;

/// Insertion-ordered association list compared with the `cmp` protocol.
#[derive(Default)]
pub struct HashTable {
    pub keys: Vec<Ref>,
    pub values: Vec<Ref>,
}

impl HashTable {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the key equal to `key`. Keys that are not comparable with it
    /// never match, so mixed key types live side by side.
    pub fn position(&self, heap: &Heap, key: Ref) -> Option<usize> {
        self.keys.iter().position(|k| heap.equals(*k, key))
    }
}

impl Trace for HashTable {
    fn trace(&self, t: &mut Tracer) {
        t.mark_all(&self.keys);
        t.mark_all(&self.values);
    }
}

#[derive(Clone)]
pub enum MethodKind {
    Native(NativeFn),
    /// Bytecode body resolving globals in `module`.
    Bytecode { code: Ref, module: Option<Ref> },
    /// Bytecode body plus captured Vars, by name.
    Closure { code: Ref, module: Option<Ref>, bindings: FastHashMap<String, Ref> },
}

#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub kind: MethodKind,
    /// Bound receiver, passed ahead of the call arguments.
    pub receiver: Option<Ref>,
}

impl Method {
    pub fn code(&self) -> Option<Ref> {
        match &self.kind {
            MethodKind::Native(_) => None,
            MethodKind::Bytecode { code, .. } | MethodKind::Closure { code, .. } => Some(*code),
        }
    }

    pub fn module(&self) -> Option<Ref> {
        match &self.kind {
            MethodKind::Native(_) => None,
            MethodKind::Bytecode { module, .. } | MethodKind::Closure { module, .. } => *module,
        }
    }
}

impl Trace for Method {
    fn trace(&self, t: &mut Tracer) {
        t.mark_opt(self.receiver);
        match &self.kind {
            MethodKind::Native(_) => {}
            MethodKind::Bytecode { code, module } => {
                t.mark(*code);
                t.mark_opt(*module);
            }
            MethodKind::Closure { code, module, bindings } => {
                t.mark(*code);
                t.mark_opt(*module);
                for v in bindings.values() {
                    t.mark(*v);
                }
            }
        }
    }
}

/// A loaded code unit: the shared instruction stream plus its constant pool
/// materialized in this heap.
pub struct Code {
    pub unit: Arc<CodeUnit>,
    pub consts: Vec<Ref>,
}

impl Trace for Code {
    fn trace(&self, t: &mut Tracer) {
        t.mark_all(&self.consts);
    }
}

/// Activation record. Each declared local owns one Var; closure freevars
/// alias the Vars they were captured from.
pub struct Frame {
    pub method: Ref,
    pub locals: FastHashMap<String, Ref>,
    pub free: FastHashMap<String, Ref>,
}

impl Frame {
    pub fn var(&self, name: &str) -> Option<Ref> {
        self.locals.get(name).or_else(|| self.free.get(name)).copied()
    }
}

impl Trace for Frame {
    fn trace(&self, t: &mut Tracer) {
        t.mark(self.method);
        for v in self.locals.values().chain(self.free.values()) {
            t.mark(*v);
        }
    }
}

/// Materialized module: name plus a namespace of Vars.
pub struct Module {
    pub name: String,
    pub locals: FastHashMap<String, Ref>,
}

impl Trace for Module {
    fn trace(&self, t: &mut Tracer) {
        for v in self.locals.values() {
            t.mark(*v);
        }
    }
}

pub struct ErrorObj {
    pub message: String,
    pub cause: Option<Ref>,
    /// Innermost frame first.
    pub backtrace: Vec<String>,
}

impl Trace for ErrorObj {
    fn trace(&self, t: &mut Tracer) {
        t.mark_opt(self.cause);
    }
}

/// Heap-side holder of a task handle. `local` is true when the handle names
/// the task owning this heap.
pub struct TaskRef {
    pub handle: TaskHandle,
    pub local: bool,
}

// Typed views. `None` when the object has a different kind.
impl Heap {
    pub fn int(&self, r: Ref) -> Option<i64> {
        match self.kind(r) {
            ObjKind::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn float(&self, r: Ref) -> Option<f64> {
        match self.kind(r) {
            ObjKind::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn bool(&self, r: Ref) -> Option<bool> {
        match self.kind(r) {
            ObjKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_nil(&self, r: Ref) -> bool {
        matches!(self.kind(r), ObjKind::Nil)
    }

    pub fn bytes(&self, r: Ref) -> Option<&[u8]> {
        match self.kind(r) {
            ObjKind::Str(b) => Some(b),
            _ => None,
        }
    }

    pub fn array(&self, r: Ref) -> Option<&[Ref]> {
        match self.kind(r) {
            ObjKind::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, r: Ref) -> Option<&mut Vec<Ref>> {
        match &mut self.get_mut(r).kind {
            ObjKind::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn hash(&self, r: Ref) -> Option<&HashTable> {
        match self.kind(r) {
            ObjKind::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn hash_mut(&mut self, r: Ref) -> Option<&mut HashTable> {
        match &mut self.get_mut(r).kind {
            ObjKind::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn method(&self, r: Ref) -> Option<&Method> {
        match self.kind(r) {
            ObjKind::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn code(&self, r: Ref) -> Option<&Code> {
        match self.kind(r) {
            ObjKind::Code(c) => Some(c),
            _ => None,
        }
    }

    pub fn frame(&self, r: Ref) -> Option<&Frame> {
        match self.kind(r) {
            ObjKind::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn module(&self, r: Ref) -> Option<&Module> {
        match self.kind(r) {
            ObjKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn module_mut(&mut self, r: Ref) -> Option<&mut Module> {
        match &mut self.get_mut(r).kind {
            ObjKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn error(&self, r: Ref) -> Option<&ErrorObj> {
        match self.kind(r) {
            ObjKind::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn task(&self, r: Ref) -> Option<&TaskRef> {
        match self.kind(r) {
            ObjKind::Task(t) => Some(t),
            _ => None,
        }
    }

    pub fn instance_slots(&self, r: Ref) -> Option<&[Ref]> {
        match self.kind(r) {
            ObjKind::Object(slots) => Some(slots),
            _ => None,
        }
    }

    pub fn instance_slots_mut(&mut self, r: Ref) -> Option<&mut Vec<Ref>> {
        match &mut self.get_mut(r).kind {
            ObjKind::Object(slots) => Some(slots),
            _ => None,
        }
    }

    /// Contents of a Var. `None` if unbound; fatal if `var` is not a Var.
    pub fn var_get(&self, var: Ref) -> Option<Ref> {
        match self.kind(var) {
            ObjKind::Var(v) => *v,
            other => fatal!("{var:?} is a {} where a var was required", other.kind_name()),
        }
    }

    pub fn var_set(&mut self, var: Ref, value: Ref) {
        match &mut self.get_mut(var).kind {
            ObjKind::Var(v) => *v = Some(value),
            other => fatal!("{var:?} is a {} where a var was required", other.kind_name()),
        }
    }

    /// UTF-8 view of a string object, replacing invalid sequences.
    pub fn str_lossy(&self, r: Ref) -> Option<std::borrow::Cow<'_, str>> {
        self.bytes(r).map(String::from_utf8_lossy)
    }
}
