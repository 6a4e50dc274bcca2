//! AArch32 (A32) backend.

pub mod opcodes;
pub mod registers;

use crate::ir::entities::Reg as RegRef;
use crate::ir::instruction::{Instruction, Operand};
use crate::isa::CalleeContract;
use crate::regalloc::spill::SpillCodegen;

/// AAPCS32: integer argument/return registers `r0`-`r3`, caller-saved
/// temporaries `r0`-`r3`/`r12`.
pub static AAPCS32_ARG_REGS: [u16; 4] = [0, 1, 2, 3];
pub static AAPCS32_CALLER_SAVED: [u16; 5] = [0, 1, 2, 3, 12];

pub static AAPCS32_CONTRACT: CalleeContract<'static> = CalleeContract {
    cpu_live_in: &AAPCS32_ARG_REGS,
    cpu_live_out: &[0],
    cpu_live_clobber: &AAPCS32_CALLER_SAVED,
};

/// `SpillCodegen` backed by the `ld_spill`/`st_spill` pseudo-opcodes.
pub struct Aarch32SpillCodegen;

impl SpillCodegen for Aarch32SpillCodegen {
    fn load_from_slot(&self, reg: RegRef, slot: u32) -> Instruction {
        Instruction::new(
            opcodes::LD_SPILL as u16,
            vec![Operand::Reg(reg), Operand::Imm(slot as i64 * 4)],
        )
    }

    fn store_to_slot(&self, reg: RegRef, slot: u32) -> Instruction {
        Instruction::new(
            opcodes::ST_SPILL as u16,
            vec![Operand::Reg(reg), Operand::Imm(slot as i64 * 4)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spill_codegen_emits_sp_relative_word_slots() {
        let codegen = Aarch32SpillCodegen;
        let r = RegRef::new(1);
        let store = codegen.store_to_slot(r, 3);
        assert_eq!(store.opcode(), opcodes::ST_SPILL as u16);
        assert_eq!(store.operands(), &[Operand::Reg(r), Operand::Imm(12)]);
    }
}
