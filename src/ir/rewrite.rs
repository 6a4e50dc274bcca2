//! Generic per-block instruction rewriting.
//!
//! `regalloc::spill` and `regalloc::reg_stats::drop_unreferenced_regs`
//! both need to replace a block's instruction list with a new one built
//! instruction-by-instruction, sometimes emitting zero, one, or several
//! instructions per input instruction. This combinator is the one place
//! that pattern is written down: each pass is itself a small
//! per-instruction generator that gets flattened back into a block.

use crate::ir::bbl::Bbl;
use crate::ir::instruction::Instruction;

/// Replace every instruction in `bbl` by applying `f` to each one in
/// turn, in order, and concatenating the results.
///
/// `f` may return zero instructions (to delete), one (the common case),
/// or several (to insert spill code around the original instruction).
pub fn rewrite_block(bbl: &mut Bbl, mut f: impl FnMut(Instruction) -> Vec<Instruction>) {
    let old = std::mem::take(bbl.instructions_mut());
    let mut new = Vec::with_capacity(old.len());
    for ins in old {
        new.extend(f(ins));
    }
    *bbl.instructions_mut() = new;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::Operand;

    #[test]
    fn can_delete_and_duplicate() {
        let mut b = Bbl::new("b");
        b.push(Instruction::new(1, vec![]));
        b.push(Instruction::new(2, vec![]));
        b.push(Instruction::new(3, vec![]));

        rewrite_block(&mut b, |ins| match ins.opcode() {
            1 => vec![],
            2 => vec![ins.clone(), ins],
            _ => vec![ins],
        });

        let ops: Vec<_> = b.instructions().iter().map(Instruction::opcode).collect();
        assert_eq!(ops, vec![2, 2, 3]);
    }

    #[test]
    fn preserves_operands() {
        let mut b = Bbl::new("b");
        let r = crate::ir::entities::Reg::new(0);
        b.push(Instruction::new(1, vec![Operand::Reg(r)]));
        rewrite_block(&mut b, |ins| vec![ins]);
        assert_eq!(b.instructions()[0].operands()[0].as_reg(), Some(r));
    }
}
