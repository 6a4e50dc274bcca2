//! Generic physical-register bank description.
//!
//! Modeled on `isa::registers::RegInfo`: a small,
//! `'static` description of the register banks an ISA exposes, used by
//! `regalloc::reg_stats` and `regalloc::linear_scan` to enumerate
//! allocatable registers without hard-coding a particular ISA's names.

use crate::ir::cpu_reg::{CpuReg, RegBankKind};

/// A contiguous bank of same-kind physical registers (e.g. "the 31
/// general-purpose AArch64 X registers").
pub struct RegBank {
    /// Bank identity (integer vs. float).
    pub kind: RegBankKind,
    /// The registers in this bank, in allocation-preference order
    /// (callee-saved-last, or whatever order the ISA's calling
    /// convention favors).
    pub regs: &'static [CpuReg],
}

impl RegBank {
    /// Look up a register in this bank by its unit number.
    pub fn by_no(&self, no: u16) -> Option<&'static CpuReg> {
        self.regs.iter().find(|r| r.no() == no)
    }

    /// Look up a register in this bank by its assembly name (e.g.
    /// `"x1"`, `"eax"`), for the assembler's operand parser.
    pub fn by_name(&self, name: &str) -> Option<&'static CpuReg> {
        self.regs.iter().find(|r| r.name() == name)
    }
}

/// The full register description for one ISA: one bank per kind.
pub struct RegInfo {
    /// All banks this ISA exposes, usually exactly two (integer,
    /// float).
    pub banks: &'static [RegBank],
}

impl RegInfo {
    /// The bank holding registers of the given kind, if the ISA has
    /// one.
    pub fn bank(&self, kind: RegBankKind) -> Option<&'static RegBank> {
        self.banks.iter().find(|b| b.kind == kind)
    }

    /// Total number of allocatable registers across all banks.
    pub fn num_regs(&self) -> usize {
        self.banks.iter().map(|b| b.regs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INT_REGS: [CpuReg; 2] = [
        CpuReg::new("r0", RegBankKind::Integer, 0),
        CpuReg::new("r1", RegBankKind::Integer, 1),
    ];

    static BANKS: [RegBank; 1] = [RegBank {
        kind: RegBankKind::Integer,
        regs: &INT_REGS,
    }];

    #[test]
    fn bank_lookup_and_count() {
        let info = RegInfo { banks: &BANKS };
        assert_eq!(info.num_regs(), 2);
        let bank = info.bank(RegBankKind::Integer).unwrap();
        assert_eq!(bank.by_no(1).unwrap().name(), "r1");
        assert!(info.bank(RegBankKind::Float).is_none());
    }
}
