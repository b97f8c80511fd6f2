//! Thread-safe deep copies of heap values.
//!
//! `Packed` is what crosses task boundaries: spawn arguments, mailbox
//! messages and join outcomes. Packing walks the value graph of the sender's
//! heap; unpacking rebuilds an equal graph in the receiver's heap. Methods
//! travel as their shared code unit plus the name of their module, which is
//! re-imported on the receiving side. A task handle travels as another
//! strong reference to the same task.

use std::sync::Arc;

use sable_ir::CodeUnit;
use thiserror::Error;

use super::TaskHandle;
use crate::core::heap::{ObjKind, Ref};
use crate::core::value::{Method, MethodKind, NativeFn};
use crate::core::fast_map_with_capacity;
use crate::errors::Result;
use crate::vm::Vm;

/// Deepest nesting accepted while packing; also stops self-referencing
/// containers.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("{0} values cannot be sent between tasks")]
    Unsendable(String),
    #[error("value nests deeper than {max} levels", max = MAX_DEPTH)]
    TooDeep,
}

#[derive(Clone, Debug)]
pub enum Packed {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<[u8]>),
    Array(Vec<Packed>),
    Hash(Vec<(Packed, Packed)>),
    Error { message: String, cause: Option<Box<Packed>>, backtrace: Vec<String> },
    Method(Box<PackedMethod>),
    Task(TaskHandle),
}

#[derive(Clone, Debug)]
pub struct PackedMethod {
    pub name: String,
    pub body: PackedBody,
    pub receiver: Option<Packed>,
}

#[derive(Clone, Debug)]
pub enum PackedBody {
    Native(NativeFn),
    Bytecode { unit: Arc<CodeUnit>, module: Option<String> },
    /// Captured Vars by name; `None` for a Var that was still unbound.
    Closure { unit: Arc<CodeUnit>, module: Option<String>, bindings: Vec<(String, Option<Packed>)> },
}

impl Vm {
    /// Deep-copy `value` into a thread-safe form.
    pub fn pack(&self, value: Ref) -> Result<Packed, PackError> {
        self.pack_at(value, 0)
    }

    fn pack_at(&self, r: Ref, depth: usize) -> Result<Packed, PackError> {
        if depth > MAX_DEPTH {
            return Err(PackError::TooDeep);
        }
        let next = depth + 1;
        Ok(match self.heap.kind(r) {
            ObjKind::Nil => Packed::Nil,
            ObjKind::Bool(b) => Packed::Bool(*b),
            ObjKind::Int(i) => Packed::Int(*i),
            ObjKind::Float(f) => Packed::Float(*f),
            ObjKind::Str(b) => Packed::Str(b.clone()),
            ObjKind::Array(items) => Packed::Array(
                items
                    .iter()
                    .map(|item| self.pack_at(*item, next))
                    .collect::<Result<_, _>>()?,
            ),
            ObjKind::Hash(h) => {
                let mut pairs = Vec::with_capacity(h.len());
                for (k, v) in h.keys.iter().zip(&h.values) {
                    pairs.push((self.pack_at(*k, next)?, self.pack_at(*v, next)?));
                }
                Packed::Hash(pairs)
            }
            ObjKind::Error(e) => Packed::Error {
                message: e.message.clone(),
                cause: e.cause.map(|c| self.pack_at(c, next)).transpose()?.map(Box::new),
                backtrace: e.backtrace.clone(),
            },
            ObjKind::Method(m) => Packed::Method(Box::new(self.pack_method(m, next)?)),
            ObjKind::Task(t) => Packed::Task(t.handle.clone()),
            ObjKind::Object(_)
            | ObjKind::Class(_)
            | ObjKind::Code(_)
            | ObjKind::Frame(_)
            | ObjKind::Module(_)
            | ObjKind::Var(_) => {
                return Err(PackError::Unsendable(self.heap.class_name(r).to_string()));
            }
        })
    }

    fn pack_method(&self, m: &Method, depth: usize) -> Result<PackedMethod, PackError> {
        let receiver = m.receiver.map(|r| self.pack_at(r, depth)).transpose()?;
        let body = match &m.kind {
            MethodKind::Native(f) => PackedBody::Native(*f),
            MethodKind::Bytecode { code, module } => PackedBody::Bytecode {
                unit: self.code_unit(*code),
                module: module.map(|m| self.module_name(m)),
            },
            MethodKind::Closure { code, module, bindings } => {
                let mut packed = Vec::with_capacity(bindings.len());
                for (name, var) in bindings {
                    let value = self.heap.var_get(*var).map(|v| self.pack_at(v, depth)).transpose()?;
                    packed.push((name.clone(), value));
                }
                packed.sort_by(|a, b| a.0.cmp(&b.0));
                PackedBody::Closure {
                    unit: self.code_unit(*code),
                    module: module.map(|m| self.module_name(m)),
                    bindings: packed,
                }
            }
        };
        Ok(PackedMethod { name: m.name.clone(), body, receiver })
    }

    /// Rebuild a packed value in this task's heap.
    pub fn unpack(&mut self, packed: Packed) -> Result<Ref> {
        Ok(match packed {
            Packed::Nil => self.nil(),
            Packed::Bool(b) => self.bool(b),
            Packed::Int(i) => self.new_int(i),
            Packed::Float(f) => self.new_float(f),
            Packed::Str(bytes) => self.new_bytes(bytes),
            Packed::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.unpack(item)?);
                }
                self.new_array(out)
            }
            Packed::Hash(pairs) => {
                let hash = self.new_hash();
                for (k, v) in pairs {
                    let k = self.unpack(k)?;
                    let v = self.unpack(v)?;
                    self.hash_set(hash, k, v)?;
                }
                hash
            }
            Packed::Error { message, cause, backtrace } => {
                let cause = match cause {
                    Some(c) => Some(self.unpack(*c)?),
                    None => None,
                };
                self.alloc_error(message, cause, backtrace)
            }
            Packed::Method(m) => self.unpack_method(*m)?,
            Packed::Task(handle) => self.new_task_ref(handle),
        })
    }

    fn unpack_method(&mut self, m: PackedMethod) -> Result<Ref> {
        let receiver = match m.receiver {
            Some(r) => Some(self.unpack(r)?),
            None => None,
        };
        let kind = match m.body {
            PackedBody::Native(f) => MethodKind::Native(f),
            PackedBody::Bytecode { unit, module } => {
                let module = module.map(|name| self.import(&name)).transpose()?;
                let code = self.load_code(unit);
                MethodKind::Bytecode { code, module }
            }
            PackedBody::Closure { unit, module, bindings } => {
                let module = module.map(|name| self.import(&name)).transpose()?;
                let code = self.load_code(unit);
                let mut vars = fast_map_with_capacity(bindings.len());
                for (name, value) in bindings {
                    let value = match value {
                        Some(v) => Some(self.unpack(v)?),
                        None => None,
                    };
                    let var = self.new_var(value);
                    vars.insert(name, var);
                }
                MethodKind::Closure { code, module, bindings: vars }
            }
        };
        Ok(self.new_method(m.name, kind, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Registry, Runtime, RuntimeConfig};

    #[test]
    fn scalars_survive_a_round_trip() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let s = vm.new_str("héllo");
        let f = vm.new_float(2.5);
        let arr = vm.new_array(vec![s, f]);
        let packed = vm.pack(arr).unwrap();
        let back = vm.unpack(packed).unwrap();
        assert_ne!(back, arr);
        assert!(vm.heap.equals(back, arr));
    }

    #[test]
    fn class_instances_are_not_sendable() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let object = vm.core().object;
        let point = vm.class_new("Point", Some(object), 2);
        let p = vm.instantiate(point, &[]).unwrap();
        assert_eq!(vm.pack(p).unwrap_err(), PackError::Unsendable("Point".into()));
        assert_eq!(vm.pack(point).unwrap_err(), PackError::Unsendable("Class".into()));
    }

    #[test]
    fn deepest_packable_value_still_compares_equal() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let mut v = vm.new_int(7);
        for _ in 0..MAX_DEPTH {
            v = vm.new_array(vec![v]);
        }
        let packed = vm.pack(v).unwrap();
        let back = vm.unpack(packed).unwrap();
        assert!(vm.heap.equals(back, v));

        let deeper = vm.new_array(vec![v]);
        assert_eq!(vm.pack(deeper).unwrap_err(), PackError::TooDeep);
    }

    #[test]
    fn self_containing_array_is_too_deep() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let arr = vm.new_array(Vec::new());
        vm.heap.array_mut(arr).unwrap().push(arr);
        assert_eq!(vm.pack(arr).unwrap_err(), PackError::TooDeep);
    }
}
