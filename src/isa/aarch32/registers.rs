//! AArch32 register banks: 16 general-purpose `r0`-`r15` (`r13`=`sp`,
//! `r14`=`lr`, `r15`=`pc`) and a representative slice of the VFP `d`
//! double-precision bank.

use crate::ir::cpu_reg::{CpuReg, RegBankKind};
use crate::isa::registers::{RegBank, RegInfo};

pub const SP: u16 = 13;
pub const LR: u16 = 14;
pub const PC: u16 = 15;

pub static R_REGS: [CpuReg; 16] = [
    CpuReg::new("r0", RegBankKind::Integer, 0),
    CpuReg::new("r1", RegBankKind::Integer, 1),
    CpuReg::new("r2", RegBankKind::Integer, 2),
    CpuReg::new("r3", RegBankKind::Integer, 3),
    CpuReg::new("r4", RegBankKind::Integer, 4),
    CpuReg::new("r5", RegBankKind::Integer, 5),
    CpuReg::new("r6", RegBankKind::Integer, 6),
    CpuReg::new("r7", RegBankKind::Integer, 7),
    CpuReg::new("r8", RegBankKind::Integer, 8),
    CpuReg::new("r9", RegBankKind::Integer, 9),
    CpuReg::new("r10", RegBankKind::Integer, 10),
    CpuReg::new("r11", RegBankKind::Integer, 11),
    CpuReg::new("r12", RegBankKind::Integer, 12),
    CpuReg::new("sp", RegBankKind::Integer, 13),
    CpuReg::new("lr", RegBankKind::Integer, 14),
    CpuReg::new("pc", RegBankKind::Integer, 15),
];

pub static D_REGS: [CpuReg; 8] = [
    CpuReg::new("d0", RegBankKind::Float, 0),
    CpuReg::new("d1", RegBankKind::Float, 1),
    CpuReg::new("d2", RegBankKind::Float, 2),
    CpuReg::new("d3", RegBankKind::Float, 3),
    CpuReg::new("d4", RegBankKind::Float, 4),
    CpuReg::new("d5", RegBankKind::Float, 5),
    CpuReg::new("d6", RegBankKind::Float, 6),
    CpuReg::new("d7", RegBankKind::Float, 7),
];

static BANKS: [RegBank; 2] = [
    RegBank {
        kind: RegBankKind::Integer,
        regs: &R_REGS,
    },
    RegBank {
        kind: RegBankKind::Float,
        regs: &D_REGS,
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
        assert_eq!(bank.by_no(SP).unwrap().name(), "sp");
        assert_eq!(bank.by_no(PC).unwrap().name(), "pc");
    }
}
