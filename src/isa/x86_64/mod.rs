//! x86-64 (AMD64) backend.

pub mod opcodes;
pub mod registers;

use crate::ir::entities::Reg as RegRef;
use crate::ir::instruction::{Instruction, Operand};
use crate::isa::CalleeContract;
use crate::regalloc::spill::SpillCodegen;

/// System V AMD64 ABI: integer argument registers `rdi`, `rsi`, `rdx`,
/// `rcx`, `r8`, `r9`, return in `rax`/`rdx`, caller-saved temporaries
/// `rax`/`rcx`/`rdx`/`rsi`/`rdi`/`r8`-`r11`.
pub static SYSV_ARG_REGS: [u16; 6] = [7, 6, 2, 1, 8, 9];
pub static SYSV_CALLER_SAVED: [u16; 9] = [0, 1, 2, 6, 7, 8, 9, 10, 11];

pub static SYSV_CONTRACT: CalleeContract<'static> = CalleeContract {
    cpu_live_in: &SYSV_ARG_REGS,
    cpu_live_out: &[0, 2],
    cpu_live_clobber: &SYSV_CALLER_SAVED,
};

/// `SpillCodegen` backed by the `ld_spill`/`st_spill` pseudo-ops, both
/// `rbp`-relative (see `opcodes::ModRm::rm_fixed`).
pub struct X86_64SpillCodegen;

impl SpillCodegen for X86_64SpillCodegen {
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
    fn spill_codegen_emits_rbp_relative_slots() {
        let codegen = X86_64SpillCodegen;
        let r = RegRef::new(4);
        let store = codegen.store_to_slot(r, 2);
        assert_eq!(store.opcode(), opcodes::ST_SPILL as u16);
        assert_eq!(store.operands(), &[Operand::Reg(r), Operand::Imm(16)]);
    }
}
