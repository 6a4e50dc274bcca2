//! x86-64 register banks: 16 general-purpose `rax`-`r15` and a
//! representative slice of the `xmm` SSE bank. Encodings in this
//! crate's subset never need register extension bits (REX.R/X/B), so
//! only registers 0-7 within each bank are exercised by `opcodes`, but
//! the full 16-entry bank is modeled here since `regalloc` allocates
//! out of it regardless of what any one opcode can address.

use crate::ir::cpu_reg::{CpuReg, RegBankKind};
use crate::isa::registers::{RegBank, RegInfo};

pub const RSP: u16 = 4;
pub const RBP: u16 = 5;

pub static GP_REGS: [CpuReg; 16] = [
    CpuReg::new("rax", RegBankKind::Integer, 0),
    CpuReg::new("rcx", RegBankKind::Integer, 1),
    CpuReg::new("rdx", RegBankKind::Integer, 2),
    CpuReg::new("rbx", RegBankKind::Integer, 3),
    CpuReg::new("rsp", RegBankKind::Integer, 4),
    CpuReg::new("rbp", RegBankKind::Integer, 5),
    CpuReg::new("rsi", RegBankKind::Integer, 6),
    CpuReg::new("rdi", RegBankKind::Integer, 7),
    CpuReg::new("r8", RegBankKind::Integer, 8),
    CpuReg::new("r9", RegBankKind::Integer, 9),
    CpuReg::new("r10", RegBankKind::Integer, 10),
    CpuReg::new("r11", RegBankKind::Integer, 11),
    CpuReg::new("r12", RegBankKind::Integer, 12),
    CpuReg::new("r13", RegBankKind::Integer, 13),
    CpuReg::new("r14", RegBankKind::Integer, 14),
    CpuReg::new("r15", RegBankKind::Integer, 15),
];

pub static XMM_REGS: [CpuReg; 8] = [
    CpuReg::new("xmm0", RegBankKind::Float, 0),
    CpuReg::new("xmm1", RegBankKind::Float, 1),
    CpuReg::new("xmm2", RegBankKind::Float, 2),
    CpuReg::new("xmm3", RegBankKind::Float, 3),
    CpuReg::new("xmm4", RegBankKind::Float, 4),
    CpuReg::new("xmm5", RegBankKind::Float, 5),
    CpuReg::new("xmm6", RegBankKind::Float, 6),
    CpuReg::new("xmm7", RegBankKind::Float, 7),
];

static BANKS: [RegBank; 2] = [
    RegBank {
        kind: RegBankKind::Integer,
        regs: &GP_REGS,
    },
    RegBank {
        kind: RegBankKind::Float,
        regs: &XMM_REGS,
    },
];

pub static REG_INFO: RegInfo = RegInfo { banks: &BANKS };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_16_integer_and_8_float_registers() {
        assert_eq!(REG_INFO.num_regs(), 24);
        let bank = REG_INFO.bank(RegBankKind::Integer).unwrap();
        assert_eq!(bank.by_no(RSP).unwrap().name(), "rsp");
        assert_eq!(bank.by_no(RBP).unwrap().name(), "rbp");
    }
}
