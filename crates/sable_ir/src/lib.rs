//! Compiler-facing artifacts for the sable runtime.
//!
//! Everything in this crate is heap independent and `Send + Sync`, so a
//! compiled unit can be shared by every task through an `Arc`:
//! - `Op` / `Instr` - the packed 32-bit instruction word
//! - `CodeUnit` / `Constant` - one compiled method body with its pools
//! - `Assembler` / `Label` - emission helper with forward-jump patching

mod asm;
mod code;
mod instr;
mod op;

pub use asm::{Assembler, Label};
pub use code::{CodeUnit, Constant};
pub use instr::{Instr, ADDR_MAX};
pub use op::{Op, OperandFormat};
