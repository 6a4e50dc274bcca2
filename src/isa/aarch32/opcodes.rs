//! AArch32 (A32) opcode table.
//!
//! A representative subset of the fixed-32-bit A32 encoding: data-
//! processing immediate/register forms, branch/branch-with-link,
//! `bx lr` return, a comparison, and the `push`/`pop` register-list
//! aliases of `stmdb sp!`/`ldmia sp!`. Every entry here fixes the
//! condition field to `AL` (always execute, `1110`); predicated
//! execution is architecturally orthogonal to the shapes this crate's
//! testable properties exercise, so it's left out of this subset
//! rather than modeled as a 14th operand kind. Field
//! catalogue (`OK.REG_12_15`, `OK.IMM_0_11`, `OK.REG_RANGE_0_7`, ...)
//! cross-checked against the ARM Architecture Reference Manual.

use crate::ir::cfg::BranchKind;
use crate::isa::encoding::{self, EncodedInsn, Field, FixedOpcode, OperandSpec};
use crate::isa::OpcodeInfo;

const RD_12: Field = Field::new(12, 4);
const RN_16: Field = Field::new(16, 4);
const RM_0: Field = Field::new(0, 4);
const RT_12: Field = Field::new(12, 4);
const IMM12: Field = Field::new(0, 12);
const IMM24: Field = Field::new(0, 24);
const REGLIST: Field = Field::new(0, 16);

pub const LD_SPILL: usize = 11;
pub const ST_SPILL: usize = 12;

pub static OPCODES: [FixedOpcode; 13] = [
    FixedOpcode {
        mnemonic: "add_imm",
        mask: 0xFFF0_0000,
        data: 0xE280_0000,
        operands: &[
            OperandSpec::Reg(RD_12),
            OperandSpec::Reg(RN_16),
            OperandSpec::UImm { field: IMM12, scale: 1 },
        ],
        num_defs: 1,
        is_call: false,
        is_return: false,
        has_side_effect: false,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "sub_imm",
        mask: 0xFFF0_0000,
        data: 0xE240_0000,
        operands: &[
            OperandSpec::Reg(RD_12),
            OperandSpec::Reg(RN_16),
            OperandSpec::UImm { field: IMM12, scale: 1 },
        ],
        num_defs: 1,
        is_call: false,
        is_return: false,
        has_side_effect: false,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "add_reg",
        mask: 0xFFF0_0FF0,
        data: 0xE080_0000,
        operands: &[
            OperandSpec::Reg(RD_12),
            OperandSpec::Reg(RN_16),
            OperandSpec::Reg(RM_0),
        ],
        num_defs: 1,
        is_call: false,
        is_return: false,
        has_side_effect: false,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "mov_reg",
        mask: 0xFFFF_0FF0,
        data: 0xE1A0_0000,
        operands: &[OperandSpec::Reg(RD_12), OperandSpec::Reg(RM_0)],
        num_defs: 1,
        is_call: false,
        is_return: false,
        has_side_effect: false,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "b",
        mask: 0xFF00_0000,
        data: 0xEA00_0000,
        operands: &[OperandSpec::SImm { field: IMM24, scale: 4 }],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Unconditional,
    },
    FixedOpcode {
        mnemonic: "bl",
        mask: 0xFF00_0000,
        data: 0xEB00_0000,
        operands: &[OperandSpec::SImm { field: IMM24, scale: 4 }],
        num_defs: 0,
        is_call: true,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "bx_lr",
        mask: 0xFFFF_FFFF,
        data: 0xE12F_FF1E,
        operands: &[],
        num_defs: 0,
        is_call: false,
        is_return: true,
        has_side_effect: true,
        branch_kind: BranchKind::Return,
    },
    FixedOpcode {
        mnemonic: "cmp_imm",
        mask: 0xFFF0_F000,
        data: 0xE350_0000,
        operands: &[
            OperandSpec::Reg(RN_16),
            OperandSpec::UImm { field: IMM12, scale: 1 },
        ],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        // `push {reglist}` == `stmdb sp!, {reglist}`.
        mnemonic: "push",
        mask: 0xFFFF_0000,
        data: 0xE92D_0000,
        operands: &[OperandSpec::RegList(REGLIST)],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        // `pop {reglist}` == `ldmia sp!, {reglist}`.
        mnemonic: "pop",
        mask: 0xFFFF_0000,
        data: 0xE8BD_0000,
        operands: &[OperandSpec::RegList(REGLIST)],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        mnemonic: "nop",
        mask: 0xFFFF_FFFF,
        data: 0xE320_F000,
        operands: &[],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        // `ldr rt, [sp, #imm]`, the `regalloc::spill` load pseudo-op.
        mnemonic: "ld_spill",
        mask: 0xFFFF_0000,
        data: 0xE59D_0000,
        operands: &[
            OperandSpec::Reg(RT_12),
            OperandSpec::UImm { field: IMM12, scale: 4 },
        ],
        num_defs: 1,
        is_call: false,
        is_return: false,
        has_side_effect: false,
        branch_kind: BranchKind::Fallthrough,
    },
    FixedOpcode {
        // `str rt, [sp, #imm]`, the `regalloc::spill` store pseudo-op.
        mnemonic: "st_spill",
        mask: 0xFFFF_0000,
        data: 0xE58D_0000,
        operands: &[
            OperandSpec::Reg(RT_12),
            OperandSpec::UImm { field: IMM12, scale: 4 },
        ],
        num_defs: 0,
        is_call: false,
        is_return: false,
        has_side_effect: true,
        branch_kind: BranchKind::Fallthrough,
    },
];

/// [`OpcodeInfo`] over [`OPCODES`].
pub struct Table;

impl Table {
    pub fn disassemble(&self, word: u32) -> Option<EncodedInsn> {
        encoding::disassemble(&OPCODES, word)
    }

    pub fn assemble(&self, ins: &EncodedInsn) -> Option<u32> {
        encoding::assemble(&OPCODES, ins)
    }

    pub fn by_mnemonic(&self, mnemonic: &str) -> Option<usize> {
        OPCODES.iter().position(|o| o.mnemonic == mnemonic)
    }
}

impl OpcodeInfo for Table {
    fn def_ops_count(&self, op: crate::ir::instruction::Opcode) -> usize {
        OPCODES[op as usize].num_defs
    }

    fn is_call(&self, op: crate::ir::instruction::Opcode) -> bool {
        OPCODES[op as usize].is_call
    }

    fn is_return(&self, op: crate::ir::instruction::Opcode) -> bool {
        OPCODES[op as usize].is_return
    }

    fn has_side_effect(&self, op: crate::ir::instruction::Opcode) -> bool {
        OPCODES[op as usize].has_side_effect
    }

    fn branch_kind(&self, op: crate::ir::instruction::Opcode) -> BranchKind {
        OPCODES[op as usize].branch_kind
    }

    fn mnemonic(&self, op: crate::ir::instruction::Opcode) -> &str {
        OPCODES[op as usize].mnemonic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::encoding::{check_table_uniqueness, EncOperand};

    #[test]
    fn table_has_no_ambiguous_entries() {
        assert_eq!(check_table_uniqueness(&OPCODES), Ok(()));
    }

    #[test]
    fn add_r0_r1_1_round_trips() {
        let table = Table;
        let word = 0xE281_0001u32;
        let ins = table.disassemble(word).expect("decodes");
        assert_eq!(OPCODES[ins.opcode].mnemonic, "add_imm");
        assert_eq!(
            ins.operands,
            vec![EncOperand::Reg(0), EncOperand::Reg(1), EncOperand::Imm(1)]
        );
        assert_eq!(table.assemble(&ins), Some(word));
    }

    #[test]
    fn push_reglist_round_trips() {
        let table = Table;
        // push {r4, lr}
        let word = 0xE92D_4010u32;
        let ins = table.disassemble(word).expect("decodes");
        assert_eq!(OPCODES[ins.opcode].mnemonic, "push");
        assert_eq!(ins.operands, vec![EncOperand::RegListMask(0x4010)]);
        assert_eq!(table.assemble(&ins), Some(word));
    }

    #[test]
    fn bx_lr_has_no_operands() {
        let table = Table;
        let ins = table.disassemble(0xE12F_FF1E).expect("decodes");
        assert!(ins.operands.is_empty());
        assert!(table.is_return(ins.opcode as u16));
    }
}
