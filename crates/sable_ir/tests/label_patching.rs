use proptest::prelude::*;
use sable_ir::{Assembler, Constant, Op};

proptest! {
    #[test]
    fn pending_jumps_land_on_the_resolved_address(
        layout in proptest::collection::vec((0usize..3, 0usize..4), 1..24),
        tail in 0usize..8,
    ) {
        let mut asm = Assembler::new("prop");
        let target = asm.new_label();
        let mut jumps = Vec::new();
        for (kind, filler) in &layout {
            for _ in 0..*filler {
                asm.emit(Op::PushNil);
            }
            let op = [Op::Jump, Op::JumpIfTrue, Op::JumpIfFalse][*kind];
            jumps.push((asm.jump(op, target), op));
        }
        for _ in 0..tail {
            asm.emit(Op::Pop);
        }
        let expected = asm.here();
        asm.resolve(target);
        let unit = asm.finish();
        for (pos, op) in jumps {
            prop_assert_eq!(unit.code[pos].operand(), expected);
            prop_assert_eq!(unit.code[pos].op(), Some(op));
        }
    }
}

#[test]
fn if_else_shape_assembles() {
    // if x { 1 } else { 2 }
    let mut asm = Assembler::new("choose");
    asm.param("x");
    let else_ = asm.new_label();
    let end = asm.new_label();
    asm.push_name("x");
    let jf = asm.jump(Op::JumpIfFalse, else_);
    asm.push_int(1);
    let jend = asm.jump(Op::Jump, end);
    asm.resolve(else_);
    asm.push_int(2);
    asm.resolve(end);
    asm.emit(Op::Return);
    let unit = asm.finish();

    assert_eq!(unit.code[jf].operand(), 4);
    assert_eq!(unit.code[jend].operand(), 5);
    assert_eq!(unit.consts, vec![Constant::Int(1), Constant::Int(2)]);
    assert_eq!(unit.code_bytes().len(), unit.code.len() * 4);
    assert!(unit.disassemble().contains("jump_if_false @4"));
}
