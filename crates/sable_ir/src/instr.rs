//! Packed instruction word: `[opcode:8][operand:24]`.
//!
//! The operand field is read either as one 24-bit jump address or as three
//! 8-bit operands `arg1` (bits 16..24), `arg2` (bits 8..16) and `arg3`
//! (bits 0..8). Operand values index the owning `CodeUnit`'s pools.

use std::fmt;

use crate::op::{Op, OperandFormat};

/// Largest encodable jump address.
pub const ADDR_MAX: u32 = 0x00ff_ffff;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instr(pub u32);

impl Instr {
    #[inline]
    pub const fn args(op: Op, a1: u8, a2: u8, a3: u8) -> Self {
        Self(((op as u32) << 24) | ((a1 as u32) << 16) | ((a2 as u32) << 8) | a3 as u32)
    }

    #[inline]
    pub const fn simple(op: Op) -> Self {
        Self((op as u32) << 24)
    }

    #[inline]
    pub fn addr(op: Op, addr: u32) -> Self {
        assert!(addr <= ADDR_MAX, "jump address {addr} does not fit in 24 bits");
        Self(((op as u32) << 24) | addr)
    }

    #[inline]
    pub const fn opcode_byte(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Decode the opcode; `None` for bytes outside the table.
    #[inline]
    pub fn op(self) -> Option<Op> {
        Op::try_from(self.opcode_byte()).ok()
    }

    #[inline]
    pub const fn operand(self) -> u32 {
        self.0 & ADDR_MAX
    }

    #[inline]
    pub const fn arg1(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn arg2(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn arg3(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub fn with_addr(self, addr: u32) -> Self {
        assert!(addr <= ADDR_MAX, "jump address {addr} does not fit in 24 bits");
        Self((self.0 & !ADDR_MAX) | addr)
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.op() else {
            return write!(f, "<bad opcode 0x{:02x}>", self.opcode_byte());
        };
        match op.format() {
            OperandFormat::None => f.write_str(op.mnemonic()),
            OperandFormat::Args => write!(f, "{} {}", op.mnemonic(), self.arg1()),
            OperandFormat::Addr => write!(f, "{} @{}", op.mnemonic(), self.operand()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_lives_in_the_high_byte() {
        let i = Instr::args(Op::Call, 3, 0, 0);
        assert_eq!(i.0, 0x3203_0000);
        assert_eq!(i.op(), Some(Op::Call));
        assert_eq!(i.arg1(), 3);
    }

    #[test]
    fn three_operands_pack_in_order() {
        let i = Instr::args(Op::PushConst, 0xaa, 0xbb, 0xcc);
        assert_eq!(i.0, 0x01aa_bbcc);
        assert_eq!((i.arg1(), i.arg2(), i.arg3()), (0xaa, 0xbb, 0xcc));
    }

    #[test]
    fn address_uses_full_24_bits() {
        let i = Instr::addr(Op::Jump, ADDR_MAX);
        assert_eq!(i.operand(), ADDR_MAX);
        assert_eq!(i.op(), Some(Op::Jump));
        assert_eq!(i.with_addr(7).operand(), 7);
        assert_eq!(i.with_addr(7).op(), Some(Op::Jump));
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_address_is_rejected() {
        let _ = Instr::addr(Op::Jump, ADDR_MAX + 1);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Instr::args(Op::GetAttr, 2, 0, 0).to_string(), "getattr 2");
        assert_eq!(Instr::addr(Op::JumpIfFalse, 12).to_string(), "jump_if_false @12");
        assert_eq!(Instr::simple(Op::Add).to_string(), "add");
        assert_eq!(Instr(0xff00_0000).to_string(), "<bad opcode 0xff>");
    }
}
