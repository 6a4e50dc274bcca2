//! AArch64 (A64) backend.

pub mod opcodes;
pub mod registers;

use crate::ir::entities::Reg as RegRef;
use crate::ir::instruction::{Instruction, Operand};
use crate::isa::CalleeContract;
use crate::regalloc::spill::SpillCodegen;

/// AAPCS64: integer argument/return registers `x0`-`x7`, caller-saved
/// temporaries `x9`-`x15`. Matches the standard procedure-call standard
/// used by every AArch64 ELF target this crate writes.
pub static AAPCS64_ARG_REGS: [u16; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
pub static AAPCS64_CALLER_SAVED: [u16; 7] = [9, 10, 11, 12, 13, 14, 15];

/// The callee contract for a standard AAPCS64 call: every integer
/// argument register may be read by the callee, `x0`/`x1` carry the
/// result, and the caller-saved bank is free for the callee to clobber.
pub static AAPCS64_CONTRACT: CalleeContract<'static> = CalleeContract {
    cpu_live_in: &AAPCS64_ARG_REGS,
    cpu_live_out: &[0, 1],
    cpu_live_clobber: &AAPCS64_CALLER_SAVED,
};

/// `SpillCodegen` backed by the `ld_spill`/`st_spill` pseudo-opcodes.
pub struct Aarch64SpillCodegen;

impl SpillCodegen for Aarch64SpillCodegen {
    fn load_from_slot(&self, reg: RegRef, slot: u32) -> Instruction {
        Instruction::new(
            opcodes::LD_SPILL as u16,
            vec![Operand::Reg(reg), Operand::Imm(slot as i64 * 8)],
        )
    }

    fn store_to_slot(&self, reg: RegRef, slot: u32) -> Instruction {
        Instruction::new(
            opcodes::ST_SPILL as u16,
            vec![Operand::Reg(reg), Operand::Imm(slot as i64 * 8)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_codegen_emits_sp_relative_slots() {
        let codegen = Aarch64SpillCodegen;
        let r = RegRef::new(3);
        let load = codegen.load_from_slot(r, 2);
        assert_eq!(load.opcode(), opcodes::LD_SPILL as u16);
        assert_eq!(load.operands(), &[Operand::Reg(r), Operand::Imm(16)]);
    }
}
