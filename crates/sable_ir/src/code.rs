//! Compiled method bodies.

use std::sync::Arc;

use crate::instr::Instr;

/// Constant pool entry. The runtime materializes each entry into a heap
/// value when the unit is loaded into a task.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Int(i64),
    Float(f64),
    Str(String),
    Code(Arc<CodeUnit>),
}

/// One compiled method body plus its constant and name pools.
///
/// The first `arity` entries of `locals` are the parameters, in call order.
/// `freevars` lists names the body reads from an enclosing scope; they are
/// bound when a closure is made from this unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeUnit {
    pub name: String,
    pub code: Vec<Instr>,
    pub consts: Vec<Constant>,
    pub names: Vec<String>,
    pub locals: Vec<String>,
    pub freevars: Vec<String>,
    pub arity: u8,
}

impl CodeUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn params(&self) -> &[String] {
        &self.locals[..(self.arity as usize).min(self.locals.len())]
    }

    /// Serialize the instruction stream as little-endian words.
    pub fn code_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() * 4);
        for i in &self.code {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out
    }

    /// Render one instruction per line, `addr: instr`.
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (addr, i) in self.code.iter().enumerate() {
            let _ = writeln!(out, "{addr:>4}: {i}");
        }
        out
    }
}
