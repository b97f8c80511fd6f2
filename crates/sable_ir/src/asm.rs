//! Instruction emission with forward-jump labels.
//!
//! A jump to a label that is not resolved yet records its position in the
//! label's patch list. Resolving the label binds it to the current address
//! and rewrites the address field of every recorded jump. Misuse (resolving
//! twice, finishing with pending jumps, pool overflow) is a compiler bug and
//! panics.

use crate::code::{CodeUnit, Constant};
use crate::instr::{Instr, ADDR_MAX};
use crate::op::{Op, OperandFormat};

/// Handle to a jump target inside one `Assembler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Default)]
struct LabelState {
    addr: Option<u32>,
    pending: Vec<usize>,
}

#[derive(Debug)]
pub struct Assembler {
    unit: CodeUnit,
    labels: Vec<LabelState>,
}

impl Assembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { unit: CodeUnit::new(name), labels: Vec::new() }
    }

    /// Declare a parameter. Parameters must be declared before plain locals.
    pub fn param(&mut self, name: &str) -> &mut Self {
        assert_eq!(
            self.unit.locals.len(),
            self.unit.arity as usize,
            "parameter `{name}` declared after a local"
        );
        self.unit.locals.push(name.to_string());
        self.unit.arity = self
            .unit
            .arity
            .checked_add(1)
            .expect("more than 255 parameters");
        self
    }

    pub fn local(&mut self, name: &str) -> &mut Self {
        if !self.unit.locals.iter().any(|l| l == name) {
            self.unit.locals.push(name.to_string());
        }
        self
    }

    pub fn freevar(&mut self, name: &str) -> &mut Self {
        if !self.unit.freevars.iter().any(|l| l == name) {
            self.unit.freevars.push(name.to_string());
        }
        self
    }

    /// Add a constant and return its pool index.
    pub fn constant(&mut self, c: Constant) -> u8 {
        let idx = self.unit.consts.len();
        assert!(idx <= u8::MAX as usize, "constant pool overflow in `{}`", self.unit.name);
        self.unit.consts.push(c);
        idx as u8
    }

    /// Intern a name and return its pool index.
    pub fn name(&mut self, name: &str) -> u8 {
        if let Some(pos) = self.unit.names.iter().position(|n| n == name) {
            return pos as u8;
        }
        let idx = self.unit.names.len();
        assert!(idx <= u8::MAX as usize, "name pool overflow in `{}`", self.unit.name);
        self.unit.names.push(name.to_string());
        idx as u8
    }

    /// Address of the next instruction.
    #[inline]
    pub fn here(&self) -> u32 {
        self.unit.code.len() as u32
    }

    fn push(&mut self, i: Instr) -> usize {
        let pos = self.unit.code.len();
        assert!(pos as u32 <= ADDR_MAX, "code unit `{}` is too long", self.unit.name);
        self.unit.code.push(i);
        pos
    }

    /// Emit an instruction without operands.
    pub fn emit(&mut self, op: Op) -> usize {
        debug_assert_eq!(op.format(), OperandFormat::None, "{op:?} takes an operand");
        self.push(Instr::simple(op))
    }

    /// Emit an instruction whose first 8-bit operand is `a1`.
    pub fn emit_arg(&mut self, op: Op, a1: u8) -> usize {
        debug_assert_eq!(op.format(), OperandFormat::Args, "{op:?} does not take arguments");
        self.push(Instr::args(op, a1, 0, 0))
    }

    pub fn push_const(&mut self, c: Constant) -> usize {
        let idx = self.constant(c);
        self.emit_arg(Op::PushConst, idx)
    }

    pub fn push_int(&mut self, i: i64) -> usize {
        self.push_const(Constant::Int(i))
    }

    pub fn push_str(&mut self, s: &str) -> usize {
        self.push_const(Constant::Str(s.to_string()))
    }

    pub fn push_name(&mut self, name: &str) -> usize {
        let idx = self.name(name);
        self.emit_arg(Op::PushName, idx)
    }

    pub fn store_name(&mut self, name: &str) -> usize {
        let idx = self.name(name);
        self.emit_arg(Op::StoreName, idx)
    }

    pub fn get_attr(&mut self, name: &str) -> usize {
        let idx = self.name(name);
        self.emit_arg(Op::GetAttr, idx)
    }

    pub fn call(&mut self, argc: u8) -> usize {
        self.emit_arg(Op::Call, argc)
    }

    pub fn make_closure(&mut self, unit: CodeUnit) -> usize {
        let idx = self.constant(Constant::Code(std::sync::Arc::new(unit)));
        self.emit_arg(Op::MakeClosure, idx)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() - 1)
    }

    /// Emit a jump to `label`, patching later if the label is still open.
    pub fn jump(&mut self, op: Op, label: Label) -> usize {
        assert!(op.is_jump(), "{op:?} is not a jump");
        let known = self.labels[label.0].addr;
        match known {
            Some(addr) => self.push(Instr::addr(op, addr)),
            None => {
                let pos = self.push(Instr::addr(op, 0));
                self.labels[label.0].pending.push(pos);
                pos
            }
        }
    }

    /// Bind `label` to the current address and back-patch pending jumps.
    pub fn resolve(&mut self, label: Label) {
        let addr = self.here();
        let state = &mut self.labels[label.0];
        assert!(state.addr.is_none(), "label {} resolved twice", label.0);
        state.addr = Some(addr);
        for pos in std::mem::take(&mut state.pending) {
            let i = self.unit.code[pos];
            self.unit.code[pos] = i.with_addr(addr);
        }
    }

    pub fn label_addr(&self, label: Label) -> Option<u32> {
        self.labels[label.0].addr
    }

    /// Borrow the unit under construction.
    pub fn unit(&self) -> &CodeUnit {
        &self.unit
    }

    pub fn finish(self) -> CodeUnit {
        for (idx, state) in self.labels.iter().enumerate() {
            assert!(
                state.pending.is_empty(),
                "label {idx} has {} unresolved jump(s) in `{}`",
                state.pending.len(),
                self.unit.name
            );
        }
        self.unit
    }
}
