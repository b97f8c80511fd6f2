//! Call frames.

use std::sync::Arc;

use sable_ir::CodeUnit;

use super::Vm;
use crate::builtins;
use crate::core::heap::{ObjKind, Ref};
use crate::core::value::{Frame, MethodKind};
use crate::core::{FastHashMap, fast_map_new, fast_map_with_capacity};
use crate::errors::{Error, Result};

/// Interpreter-side view of a running frame. The heap `Frame` object holds
/// the locals; this holds the cursor.
pub(crate) struct ActiveFrame {
    pub frame: Ref,
    pub method: Ref,
    pub code: Ref,
    pub module: Option<Ref>,
    pub unit: Arc<CodeUnit>,
    pub ip: usize,
    /// Operand stack height when the frame was entered.
    pub base: usize,
}

struct Callee {
    code: Ref,
    module: Option<Ref>,
    receiver: Option<Ref>,
    bindings: Option<FastHashMap<String, Ref>>,
}

impl Vm {
    fn callee(&self, method: Ref) -> Result<Callee> {
        let Some(m) = self.heap.method(method) else {
            return Err(builtins::type_mismatch(&self.heap, "method", method));
        };
        match &m.kind {
            MethodKind::Native(_) => Err(Error::TypeMismatch {
                expected: "bytecode method",
                found: format!("native method {}", m.name),
            }),
            MethodKind::Bytecode { code, module } => Ok(Callee {
                code: *code,
                module: *module,
                receiver: m.receiver,
                bindings: None,
            }),
            MethodKind::Closure { code, module, bindings } => Ok(Callee {
                code: *code,
                module: *module,
                receiver: m.receiver,
                bindings: Some(bindings.clone()),
            }),
        }
    }

    pub(crate) fn is_bytecode_method(&self, r: Ref) -> bool {
        match self.heap.kind(r) {
            ObjKind::Method(m) => !matches!(m.kind, MethodKind::Native(_)),
            _ => false,
        }
    }

    /// Build a fresh Frame for `method` with every local unbound, except
    /// names the method's closure bindings alias.
    pub fn build_frame(&mut self, method: Ref) -> Result<Ref> {
        let callee = self.callee(method)?;
        let unit = self.code_unit(callee.code);
        Ok(self.alloc_frame(method, &unit, callee.bindings.as_ref()))
    }

    fn alloc_frame(
        &mut self,
        method: Ref,
        unit: &CodeUnit,
        bindings: Option<&FastHashMap<String, Ref>>,
    ) -> Ref {
        let mut locals = fast_map_with_capacity(unit.locals.len());
        for name in &unit.locals {
            let var = match bindings.and_then(|b| b.get(name)) {
                Some(v) => *v,
                None => self.new_var(None),
            };
            locals.insert(name.clone(), var);
        }
        let mut free = fast_map_new();
        if let Some(b) = bindings {
            for name in &unit.freevars {
                if locals.contains_key(name) {
                    continue;
                }
                if let Some(v) = b.get(name) {
                    free.insert(name.clone(), *v);
                }
            }
        }
        self.heap.alloc(self.core.frame, ObjKind::Frame(Box::new(Frame { method, locals, free })))
    }

    /// Push a frame for a bytecode method and bind its parameters. A bound
    /// receiver fills the first parameter.
    pub(crate) fn enter(&mut self, method: Ref, args: &[Ref]) -> Result<()> {
        if self.call_depth() >= self.config.max_frames {
            return Err(Error::StackOverflow(self.frames.len()));
        }
        let callee = self.callee(method)?;
        let unit = self.code_unit(callee.code);
        let argc = args.len() + usize::from(callee.receiver.is_some());
        if argc != unit.arity as usize {
            return Err(Error::Arity {
                method: unit.name.clone(),
                expected: unit.arity as usize,
                got: argc,
            });
        }
        let frame = self.alloc_frame(method, &unit, callee.bindings.as_ref());
        let values = callee.receiver.into_iter().chain(args.iter().copied());
        for (name, value) in unit.params().iter().zip(values) {
            let var = self.heap.frame(frame).and_then(|f| f.locals.get(name.as_str()).copied());
            if let Some(var) = var {
                self.heap.var_set(var, value);
            }
        }
        trace!(self.config.trace, vm, "enter {} (depth {})", unit.name, self.frames.len() + 1);
        self.frames.push(ActiveFrame {
            frame,
            method,
            code: callee.code,
            module: callee.module,
            unit,
            ip: 0,
            base: self.stack.len(),
        });
        Ok(())
    }

    /// Frames from innermost outward, as `name @ip`.
    pub fn backtrace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|f| format!("{} @{}", f.unit.name, f.ip.saturating_sub(1)))
            .collect()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }
}
