//! Instruction dispatch loop.

use std::cmp::Ordering;

use sable_ir::Op;
use smallvec::SmallVec;

use super::{ActiveFrame, Vm};
use crate::core::fast_map_with_capacity;
use crate::core::heap::Ref;
use crate::core::value::MethodKind;
use crate::errors::{Error, Result};

type Args = SmallVec<[Ref; 8]>;

impl Vm {
    /// Call a bytecode method and run it to completion.
    pub(crate) fn call_bytecode(&mut self, method: Ref, args: &[Ref]) -> Result<Ref> {
        if self.native_depth >= self.config.max_native_depth {
            return Err(Error::StackOverflow(self.frames.len()));
        }
        let floor = self.frames.len();
        self.enter(method, args)?;
        self.native_depth += 1;
        let result = self.run(floor);
        self.native_depth -= 1;
        result
    }

    /// Frames plus the interpreter loops nested inside the outermost one.
    pub(crate) fn call_depth(&self) -> usize {
        self.frames.len() + self.native_depth.saturating_sub(1)
    }

    /// Run until the frame at index `floor` returns. A failure unwinds every
    /// frame above `floor` and comes back as `Error::Panic`.
    pub(crate) fn run(&mut self, floor: usize) -> Result<Ref> {
        let stack_floor = match self.frames.get(floor) {
            Some(f) => f.base,
            None => fatal!("run: no frame at depth {floor}"),
        };
        match self.execute(floor) {
            Ok(v) => Ok(v),
            Err(e) => {
                // The backtrace is taken before the frames go away.
                let value = self.error_to_panic(e);
                trace!(self.config.trace, vm, "unwinding to depth {floor}: {}", self.heap.display(value));
                self.frames.truncate(floor);
                self.stack.truncate(stack_floor);
                Err(Error::Panic(value))
            }
        }
    }

    fn top(&self) -> &ActiveFrame {
        match self.frames.last() {
            Some(f) => f,
            None => fatal!("no active frame"),
        }
    }

    fn top_mut(&mut self) -> &mut ActiveFrame {
        match self.frames.last_mut() {
            Some(f) => f,
            None => fatal!("no active frame"),
        }
    }

    /// Fatal unless the current frame has at least `n` operands.
    #[inline]
    fn need(&self, n: usize) {
        let f = self.top();
        if self.stack.len() < f.base + n {
            fatal!("operand stack underflow in `{}` at {}", f.unit.name, f.ip.saturating_sub(1));
        }
    }

    #[inline]
    fn pop(&mut self) -> Ref {
        self.need(1);
        match self.stack.pop() {
            Some(v) => v,
            None => fatal!("operand stack underflow"),
        }
    }

    #[inline]
    fn peek(&self, depth: usize) -> Ref {
        self.need(depth + 1);
        self.stack[self.stack.len() - 1 - depth]
    }

    fn pop_n(&mut self, n: usize) -> Vec<Ref> {
        self.need(n);
        self.stack.split_off(self.stack.len() - n)
    }

    /// Replace the top `n` operands with `value`.
    fn replace(&mut self, n: usize, value: Ref) {
        self.stack.truncate(self.stack.len() - n);
        self.stack.push(value);
    }

    fn constant(&self, idx: u8) -> Ref {
        let f = self.top();
        match self.heap.code(f.code).and_then(|c| c.consts.get(idx as usize)) {
            Some(c) => *c,
            None => fatal!("constant {idx} out of range in `{}`", f.unit.name),
        }
    }

    fn name_at(&self, idx: u8) -> &str {
        let f = self.top();
        match f.unit.names.get(idx as usize) {
            Some(n) => n,
            None => fatal!("name {idx} out of range in `{}`", f.unit.name),
        }
    }

    /// Var bound to `name` in the current frame or its module.
    fn scoped_var(&self, name: &str) -> Option<Ref> {
        let f = self.top();
        if let Some(var) = self.heap.frame(f.frame).and_then(|fr| fr.var(name)) {
            return Some(var);
        }
        f.module
            .and_then(|m| self.heap.module(m))
            .and_then(|m| m.locals.get(name).copied())
    }

    /// Frame locals, then the module namespace, then globals, then classes.
    fn load_name(&self, idx: u8) -> Result<Ref> {
        let name = self.name_at(idx);
        if let Some(var) = self.scoped_var(name) {
            return self.heap.var_get(var).ok_or_else(|| Error::Unbound(name.to_string()));
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(*v);
        }
        if let Some(c) = self.classes.get(name) {
            return Ok(*c);
        }
        Err(Error::Unbound(name.to_string()))
    }

    /// Frame local when declared, else the module namespace, else globals
    /// for module-less methods.
    fn store_name(&mut self, idx: u8, value: Ref) {
        let name = self.name_at(idx);
        if let Some(var) = self.scoped_var(name) {
            self.heap.var_set(var, value);
            return;
        }
        let name = name.to_string();
        match self.top().module {
            Some(module) => {
                let var = self.new_var(Some(value));
                if let Some(m) = self.heap.module_mut(module) {
                    m.locals.insert(name, var);
                }
            }
            None => {
                self.globals.insert(name, value);
            }
        }
    }

    fn make_closure(&mut self, code: Ref) -> Result<Ref> {
        let unit = self.code_unit(code);
        let module = self.top().module;
        let mut bindings = fast_map_with_capacity(unit.freevars.len());
        for name in &unit.freevars {
            let Some(var) = self.scoped_var(name) else {
                return Err(Error::Unbound(name.clone()));
            };
            bindings.insert(name.clone(), var);
        }
        Ok(self.new_method(unit.name.clone(), MethodKind::Closure { code, module, bindings }, None))
    }

    /// Pop the current frame. Returns the value once `floor` is reached,
    /// otherwise pushes it for the caller.
    fn leave(&mut self, value: Ref, floor: usize) -> Option<Ref> {
        let Some(f) = self.frames.pop() else {
            fatal!("return with no active frame");
        };
        self.stack.truncate(f.base);
        trace!(self.config.trace, vm, "leave {}", f.unit.name);
        if self.frames.len() <= floor {
            Some(value)
        } else {
            self.stack.push(value);
            None
        }
    }

    fn execute(&mut self, floor: usize) -> Result<Ref> {
        let interval = self.config.gc_check_interval.max(1);
        loop {
            self.ticks = self.ticks.wrapping_add(1);
            if self.ticks % interval == 0 && self.heap.should_collect() {
                self.collect();
            }

            let top = self.top_mut();
            let Some(&instr) = top.unit.code.get(top.ip) else {
                // Running off the end returns nil.
                let nil = self.nil();
                match self.leave(nil, floor) {
                    Some(v) => return Ok(v),
                    None => continue,
                }
            };
            top.ip += 1;
            let Some(op) = instr.op() else {
                fatal!("invalid opcode 0x{:02x} in `{}`", instr.opcode_byte(), top.unit.name);
            };

            match op {
                Op::PushConst => {
                    let c = self.constant(instr.arg1());
                    self.stack.push(c);
                }
                Op::PushName => {
                    let v = self.load_name(instr.arg1())?;
                    self.stack.push(v);
                }
                Op::StoreName => {
                    let v = self.pop();
                    self.store_name(instr.arg1(), v);
                }
                Op::PushNil => {
                    let nil = self.nil();
                    self.stack.push(nil);
                }
                Op::Dup => {
                    let v = self.peek(0);
                    self.stack.push(v);
                }
                Op::Pop => {
                    self.pop();
                }

                Op::Jump => self.top_mut().ip = instr.operand() as usize,
                Op::JumpIfTrue | Op::JumpIfFalse => {
                    let cond = self.pop();
                    if self.heap.truthy(cond) == (op == Op::JumpIfTrue) {
                        self.top_mut().ip = instr.operand() as usize;
                    }
                }
                Op::Return => {
                    let v = self.pop();
                    if let Some(v) = self.leave(v, floor) {
                        return Ok(v);
                    }
                }

                Op::MakeArray => {
                    let items = self.pop_n(instr.arg1() as usize);
                    let arr = self.new_array(items);
                    self.stack.push(arr);
                }
                Op::MakeHash => {
                    let n = instr.arg1() as usize * 2;
                    self.need(n);
                    let hash = self.new_hash();
                    let start = self.stack.len() - n;
                    for i in (start..self.stack.len()).step_by(2) {
                        let (k, v) = (self.stack[i], self.stack[i + 1]);
                        self.hash_set(hash, k, v)?;
                    }
                    self.replace(n, hash);
                }
                Op::MakeClosure => {
                    let code = self.constant(instr.arg1());
                    let m = self.make_closure(code)?;
                    self.stack.push(m);
                }

                Op::GetAttr => {
                    let obj = self.peek(0);
                    let name = self.name_at(instr.arg1()).to_string();
                    let v = self.getattr(obj, &name)?;
                    self.replace(1, v);
                }
                Op::GetItem => {
                    let (obj, key) = (self.peek(1), self.peek(0));
                    let v = self.getitem(obj, key)?;
                    self.replace(2, v);
                }
                Op::Call => {
                    let argc = instr.arg1() as usize;
                    self.need(argc + 1);
                    let at = self.stack.len() - argc - 1;
                    let callee = self.stack[at];
                    let args: Args = SmallVec::from_slice(&self.stack[at + 1..]);
                    if self.is_bytecode_method(callee) {
                        self.stack.truncate(at);
                        self.enter(callee, &args)?;
                    } else {
                        // Arguments stay on the stack, rooted, during the call.
                        let v = self.call(callee, &args)?;
                        self.replace(argc + 1, v);
                    }
                }
                Op::GetClass => {
                    let v = self.pop();
                    let class = self.heap.class_of(v);
                    self.stack.push(class);
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    let (a, b) = (self.peek(1), self.peek(0));
                    let v = match op {
                        Op::Add => self.add(a, b)?,
                        Op::Sub => self.sub(a, b)?,
                        Op::Mul => self.mul(a, b)?,
                        _ => self.div(a, b)?,
                    };
                    self.replace(2, v);
                }
                Op::Eq | Op::Neq => {
                    let b = self.pop();
                    let a = self.pop();
                    let eq = self.heap.equals(a, b);
                    let v = self.bool(eq == (op == Op::Eq));
                    self.stack.push(v);
                }
                Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                    let (a, b) = (self.peek(1), self.peek(0));
                    let ord = self.compare(a, b)?;
                    let r = match op {
                        Op::Gt => ord == Ordering::Greater,
                        Op::Gte => ord != Ordering::Less,
                        Op::Lt => ord == Ordering::Less,
                        _ => ord != Ordering::Greater,
                    };
                    let v = self.bool(r);
                    self.replace(2, v);
                }
                Op::Not => {
                    let v = self.pop();
                    let r = self.bool(!self.heap.truthy(v));
                    self.stack.push(r);
                }

                Op::Spawn => {
                    let callable = self.peek(0);
                    let t = self.spawn(callable)?;
                    self.replace(1, t);
                }
            }
        }
    }
}
