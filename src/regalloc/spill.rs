//! Spill-slot materialization.
//!
//! Global register allocation eventually decides some registers won't
//! fit in physical registers and flags them `RegFlags::SPILLED`. This
//! module turns that decision into actual code: `insert_spill_code`
//! walks every instruction of a function and, for each spilled register
//! operand, splits the instruction into a lead of loads (one per
//! spilled use operand), the original instruction, and a tail of stores
//! (one per spilled def operand).
//!
//! Which concrete opcode loads/stores a given kind from/to a stack slot
//! is an ISA concern, not an IR-core one; callers supply a
//! [`SpillCodegen`] that knows.

use crate::ir::entities::Reg as RegRef;
use crate::ir::flags::RegFlags;
use crate::ir::function::Fun;
use crate::ir::instruction::Instruction;
use crate::ir::rewrite::rewrite_block;
use crate::isa::OpcodeInfo;

/// How to materialize a spilled register's load/store. Implemented
/// once per ISA (`isa::{aarch32,aarch64,x86_64}`).
pub trait SpillCodegen {
    /// An instruction that loads `reg` from its assigned stack slot
    /// into `reg` itself, to run immediately before an instruction that
    /// reads it.
    fn load_from_slot(&self, reg: RegRef, slot: u32) -> Instruction;

    /// An instruction that stores `reg` to its assigned stack slot, to
    /// run immediately after an instruction that writes it.
    fn store_to_slot(&self, reg: RegRef, slot: u32) -> Instruction;
}

/// Assign a stack slot to every register flagged `SPILLED` that doesn't
/// already have one, in register-table order. Returns the number of
/// slots newly assigned.
pub fn assign_stack_slots(fun: &mut Fun) -> usize {
    let mut next_slot = fun
        .regs_iter()
        .filter_map(|(_, r)| r.stack_slot())
        .map(|s| s + 1)
        .max()
        .unwrap_or(0);
    let mut assigned = 0;
    let pending: Vec<RegRef> = fun
        .regs_iter()
        .filter(|(_, r)| r.flags().contains(RegFlags::SPILLED) && r.stack_slot().is_none())
        .map(|(r, _)| r)
        .collect();
    for r in pending {
        fun.reg_mut(r).set_stack_slot(next_slot);
        log::trace!("spill: assigned stack slot {} to register {}", next_slot, fun.reg(r).name());
        next_slot += 1;
        assigned += 1;
    }
    log::debug!("spill: assigned {} new stack slot(s) in {}", assigned, fun.name());
    assigned
}

/// Insert load/store pairs around every spilled register operand in
/// `fun`. Requires every spilled register to already have a stack slot
/// (see [`assign_stack_slots`]). Returns the number of load/store
/// instructions inserted.
pub fn insert_spill_code(fun: &mut Fun, ops: &dyn OpcodeInfo, codegen: &dyn SpillCodegen) -> usize {
    let mut inserted = 0;
    let layout = fun.layout().to_vec();
    let regs = fun.regs.clone();
    for b in layout {
        rewrite_block(fun.bbl_mut(b), |ins| {
            let num_defs = ops.def_ops_count(ins.opcode());
            let mut leads = Vec::new();
            let mut tails = Vec::new();
            for (n, op) in ins.operands().iter().enumerate() {
                let r = match op.as_reg() {
                    Some(r) => r,
                    None => continue,
                };
                let reg = &regs[r];
                if !reg.flags().contains(RegFlags::SPILLED) {
                    continue;
                }
                let slot = reg
                    .stack_slot()
                    .expect("spilled register has no assigned stack slot");
                if n < num_defs {
                    tails.push(codegen.store_to_slot(r, slot));
                } else {
                    leads.push(codegen.load_from_slot(r, slot));
                }
            }
            if !leads.is_empty() || !tails.is_empty() {
                log::trace!(
                    "spill: inserting {} load(s) and {} store(s) around a `{}`",
                    leads.len(),
                    tails.len(),
                    ops.mnemonic(ins.opcode())
                );
            }
            inserted += leads.len() + tails.len();
            let mut out = leads;
            out.push(ins);
            out.extend(tails);
            out
        });
    }
    log::debug!("spill: inserted {} load/store instruction(s) in {}", inserted, fun.name());
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::dk::DK;
    use crate::ir::{Bbl, Instruction as Ins, Operand, Reg};

    struct TestOps;
    impl OpcodeInfo for TestOps {
        fn def_ops_count(&self, op: crate::ir::Opcode) -> usize {
            if op == 0 {
                1
            } else {
                0
            }
        }
        fn is_call(&self, _op: crate::ir::Opcode) -> bool {
            false
        }
        fn is_return(&self, _op: crate::ir::Opcode) -> bool {
            false
        }
        fn has_side_effect(&self, _op: crate::ir::Opcode) -> bool {
            false
        }
        fn branch_kind(&self, _op: crate::ir::Opcode) -> crate::ir::cfg::BranchKind {
            crate::ir::cfg::BranchKind::Fallthrough
        }
        fn mnemonic(&self, op: crate::ir::Opcode) -> &str {
            if op == 0 {
                "mov"
            } else if op == 100 {
                "ld.spill"
            } else {
                "st.spill"
            }
        }
    }

    struct TestCodegen;
    impl SpillCodegen for TestCodegen {
        fn load_from_slot(&self, reg: RegRef, slot: u32) -> Ins {
            Ins::new(100, vec![Operand::Reg(reg), Operand::Imm(slot as i64)])
        }
        fn store_to_slot(&self, reg: RegRef, slot: u32) -> Ins {
            Ins::new(101, vec![Operand::Reg(reg), Operand::Imm(slot as i64)])
        }
    }

    #[test]
    fn spilled_use_gets_leading_load() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        fun.reg_mut(r0).flags_mut().insert(RegFlags::SPILLED);
        let mut b0 = Bbl::new("b0");
        b0.push(Ins::new(1, vec![Operand::Reg(r0)]));
        fun.new_bbl(b0);
        assign_stack_slots(&mut fun);
        let inserted = insert_spill_code(&mut fun, &TestOps, &TestCodegen);
        assert_eq!(inserted, 1);
        let instrs = fun.bbl(fun.layout()[0]).instructions();
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].opcode(), 100);
        assert_eq!(instrs[1].opcode(), 1);
    }

    #[test]
    fn spilled_def_gets_trailing_store() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        fun.reg_mut(r0).flags_mut().insert(RegFlags::SPILLED);
        let mut b0 = Bbl::new("b0");
        b0.push(Ins::new(0, vec![Operand::Reg(r0), Operand::Imm(1)]));
        fun.new_bbl(b0);
        assign_stack_slots(&mut fun);
        let inserted = insert_spill_code(&mut fun, &TestOps, &TestCodegen);
        assert_eq!(inserted, 1);
        let instrs = fun.bbl(fun.layout()[0]).instructions();
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].opcode(), 0);
        assert_eq!(instrs[1].opcode(), 101);
    }
}
