//! Opcode table.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// How the 24-bit operand field of an instruction is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandFormat {
    /// No operand; the field is zero.
    None,
    /// Three packed 8-bit operands (only `arg1` is used by the current set).
    Args,
    /// One 24-bit absolute instruction address.
    Addr,
}

/// Opcodes. The byte values are part of the wire format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum Op {
    // ============ Stack ============
    PushConst = 0x01, // push consts[arg1]
    PushName = 0x02,  // push value bound to names[arg1]
    StoreName = 0x03, // pop into names[arg1]
    PushNil = 0x04,
    Dup = 0x05,
    Pop = 0x06,

    // ============ Control flow ============
    Jump = 0x10,
    JumpIfTrue = 0x11, // pops the condition
    JumpIfFalse = 0x12,
    Return = 0x13,

    // ============ Construction ============
    MakeArray = 0x20,   // arg1 = element count
    MakeHash = 0x21,    // arg1 = pair count
    MakeClosure = 0x22, // arg1 = Code constant

    // ============ Object protocol ============
    GetAttr = 0x30, // arg1 = name
    GetItem = 0x31,
    Call = 0x32, // arg1 = argc
    GetClass = 0x33,

    // ============ Arithmetic / comparison ============
    Add = 0x40,
    Sub = 0x41,
    Mul = 0x42,
    Div = 0x43,
    Eq = 0x48,
    Neq = 0x49,
    Gt = 0x4a,
    Gte = 0x4b,
    Lt = 0x4c,
    Lte = 0x4d,
    Not = 0x4e,

    // ============ Concurrency ============
    Spawn = 0x50,
}

impl Op {
    pub fn format(self) -> OperandFormat {
        match self {
            Op::PushConst
            | Op::PushName
            | Op::StoreName
            | Op::MakeArray
            | Op::MakeHash
            | Op::MakeClosure
            | Op::GetAttr
            | Op::Call => OperandFormat::Args,
            Op::Jump | Op::JumpIfTrue | Op::JumpIfFalse => OperandFormat::Addr,
            _ => OperandFormat::None,
        }
    }

    #[inline]
    pub fn is_jump(self) -> bool {
        self.format() == OperandFormat::Addr
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::PushConst => "push_const",
            Op::PushName => "push_name",
            Op::StoreName => "store_name",
            Op::PushNil => "push_nil",
            Op::Dup => "dup",
            Op::Pop => "pop",
            Op::Jump => "jump",
            Op::JumpIfTrue => "jump_if_true",
            Op::JumpIfFalse => "jump_if_false",
            Op::Return => "return",
            Op::MakeArray => "make_array",
            Op::MakeHash => "make_hash",
            Op::MakeClosure => "make_closure",
            Op::GetAttr => "getattr",
            Op::GetItem => "getitem",
            Op::Call => "call",
            Op::GetClass => "get_class",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::Not => "not",
            Op::Spawn => "spawn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_values_round_trip() {
        for byte in 0..=u8::MAX {
            if let Ok(op) = Op::try_from(byte) {
                assert_eq!(u8::from(op), byte);
            }
        }
        assert!(Op::try_from(0x00).is_err());
        assert!(Op::try_from(0xff).is_err());
    }

    #[test]
    fn only_jumps_take_addresses() {
        assert!(Op::Jump.is_jump());
        assert!(Op::JumpIfFalse.is_jump());
        assert!(!Op::Call.is_jump());
        assert_eq!(Op::Add.format(), OperandFormat::None);
    }
}
