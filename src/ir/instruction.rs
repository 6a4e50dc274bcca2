//! Instructions and operands.
//!
//! An instruction is an opcode index into the
//! active ISA's opcode table plus a fixed-size operand list. Operands
//! are either virtual registers, immediates, or references to other
//! entities (blocks, functions) depending on what the opcode expects at
//! that slot — the opcode table (`crate::isa`) is the authority on how
//! many operands are defs vs. uses.

use crate::ir::entities::{Bbl, FunRef, Reg};

/// One operand of an instruction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    /// A virtual register operand.
    Reg(Reg),
    /// An immediate constant, sign-extended to 64 bits by convention.
    Imm(i64),
    /// A basic-block target (conditional/unconditional branches).
    Bbl(Bbl),
    /// A callee function reference.
    Fun(FunRef),
}

impl Operand {
    /// The register named by this operand, if it is a register operand.
    pub fn as_reg(&self) -> Option<Reg> {
        match *self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }
}

/// An opcode index into the active ISA's opcode table.
///
/// This crate never hard-codes opcode identity outside the per-ISA
/// `opcodes` modules; `Opcode` is a thin handle those tables define the
/// meaning of (mnemonic, operand shape, def/use split, `is_call`, side
/// effects).
pub type Opcode = u16;

/// A single IR instruction.
#[derive(Clone, Debug)]
pub struct Instruction {
    opcode: Opcode,
    operands: Vec<Operand>,
}

impl Instruction {
    /// Build an instruction from an opcode and its operand list, in the
    /// order the opcode table declares them (defs first, then uses).
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Instruction { opcode, operands }
    }

    /// The instruction's opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// All operands, defs and uses together, in table order.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Mutable access to all operands.
    pub fn operands_mut(&mut self) -> &mut [Operand] {
        &mut self.operands
    }

    /// Iterate the register operands in `self.operands()[..num_defs]`.
    pub fn def_regs(&self, num_defs: usize) -> impl Iterator<Item = Reg> + '_ {
        self.operands[..num_defs.min(self.operands.len())]
            .iter()
            .filter_map(Operand::as_reg)
    }

    /// Iterate the register operands in `self.operands()[num_defs..]`.
    pub fn use_regs(&self, num_defs: usize) -> impl Iterator<Item = Reg> + '_ {
        let start = num_defs.min(self.operands.len());
        self.operands[start..].iter().filter_map(Operand::as_reg)
    }

    /// The block this instruction transfers control to, for branches.
    pub fn branch_target(&self) -> Option<Bbl> {
        self.operands.iter().find_map(|op| match op {
            Operand::Bbl(b) => Some(*b),
            _ => None,
        })
    }

    /// The callee, for call instructions.
    pub fn call_target(&self) -> Option<FunRef> {
        self.operands.iter().find_map(|op| match op {
            Operand::Fun(f) => Some(*f),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_use_split() {
        let r0 = Reg::new(0);
        let r1 = Reg::new(1);
        let r2 = Reg::new(2);
        let ins = Instruction::new(
            0,
            vec![Operand::Reg(r0), Operand::Reg(r1), Operand::Reg(r2)],
        );
        let defs: Vec<_> = ins.def_regs(1).collect();
        let uses: Vec<_> = ins.use_regs(1).collect();
        assert_eq!(defs, vec![r0]);
        assert_eq!(uses, vec![r1, r2]);
    }

    #[test]
    fn branch_target_found() {
        let b = Bbl::new(3);
        let ins = Instruction::new(1, vec![Operand::Bbl(b)]);
        assert_eq!(ins.branch_target(), Some(b));
        assert_eq!(ins.call_target(), None);
    }
}
