//! Backward-dataflow register liveness.
//!
//! Each block
//! contributes a `def`/`use` summary computed once from its
//! instructions, and `live_in`/`live_out` sets are then propagated
//! backward across the CFG to a fixpoint. The one piece of domain logic
//! worth calling out is call handling: a call instruction's defined
//! registers are exactly those virtual registers pinned to one of the
//! callee's `cpu_live_out` physical registers — `cpu_live_in` and
//! `cpu_live_clobber` are deliberately left out of the liveness
//! equations (see the comment on [`ins_update_liveness`]), an
//! acknowledged gap left as an open contract parameter rather than
//! silently "fixed".

use crate::ir::entities::{Bbl as BblRef, FunRef, Reg as RegRef};
use crate::ir::flags::FunFlags;
use crate::ir::function::Fun;
use crate::ir::instruction::Instruction;
use crate::ir::reg::Reg;
use crate::isa::{CalleeContract, OpcodeInfo};
use cranelift_entity::PrimaryMap;
use std::collections::{BTreeMap, BTreeSet};

/// Per-block liveness summary. Only `live_out` survives analysis (it is
/// copied onto [`crate::ir::Bbl`]); the rest are scratch state for the
/// fixpoint.
#[derive(Default, Clone, Debug)]
struct BlockLiveness {
    live_in: BTreeSet<RegRef>,
    live_out: BTreeSet<RegRef>,
    live_def: BTreeSet<RegRef>,
    live_use: BTreeSet<RegRef>,
}

/// If `ins` writes `old` in one of its first `num_defs` operands,
/// replace it with `new`. Returns the number of operands touched (0 or
/// 1: an instruction has at most one def). `num_defs` must come from
/// `OpcodeInfo::def_ops_count`, not from the operand count — a 0-def
/// side-effecting instruction (e.g. a store) can still carry a register
/// operand in position 0, and that operand is a use, not a def.
pub fn maybe_replace_def_reg(ins: &mut Instruction, num_defs: usize, old: RegRef, new: RegRef) -> usize {
    if num_defs == 0 {
        return 0;
    }
    if ins.operands()[0].as_reg() == Some(old) {
        ins.operands_mut()[0] = crate::ir::instruction::Operand::Reg(new);
        return 1;
    }
    0
}

/// Replace every use of `old` with `new` in `ins`'s non-def operands.
/// Returns the number of operands touched.
pub fn maybe_replace_use_reg(
    ins: &mut Instruction,
    num_defs: usize,
    old: RegRef,
    new: RegRef,
) -> usize {
    let mut count = 0;
    for op in ins.operands_mut().iter_mut().skip(num_defs) {
        if op.as_reg() == Some(old) {
            *op = crate::ir::instruction::Operand::Reg(new);
            count += 1;
        }
    }
    count
}

fn regs_pinned_to(regs: &PrimaryMap<RegRef, Reg>, cpu_regs: &[u16]) -> Vec<RegRef> {
    regs.iter()
        .filter(|(_, reg)| reg.cpu_reg().map_or(false, |c| cpu_regs.contains(&c)))
        .map(|(r, _)| r)
        .collect()
}

fn ins_update_def_use(
    ins: &Instruction,
    regs: &PrimaryMap<RegRef, Reg>,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(FunRef) -> CalleeContract,
    defs: &mut BTreeSet<RegRef>,
    uses: &mut BTreeSet<RegRef>,
) {
    if ops.is_call(ins.opcode()) {
        if let Some(callee) = ins.call_target() {
            let contract = callee_of(callee);
            for r in regs_pinned_to(regs, contract.cpu_live_out) {
                defs.insert(r);
                uses.remove(&r);
            }
        }
    }

    let num_defs = ops.def_ops_count(ins.opcode());
    for (n, op) in ins.operands().iter().enumerate() {
        let r = match op.as_reg() {
            Some(r) => r,
            None => continue,
        };
        if n < num_defs {
            defs.insert(r);
            uses.remove(&r);
        } else {
            uses.insert(r);
        }
    }
}

fn bbl_def_use(
    instructions: &[Instruction],
    regs: &PrimaryMap<RegRef, Reg>,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(FunRef) -> CalleeContract,
) -> (BTreeSet<RegRef>, BTreeSet<RegRef>) {
    let mut def = BTreeSet::new();
    let mut use_ = BTreeSet::new();
    for ins in instructions.iter().rev() {
        ins_update_def_use(ins, regs, ops, callee_of, &mut def, &mut use_);
    }
    (def, use_)
}

/// Standard backward-flow liveness fixpoint over the whole function's
/// CFG. Mutates each block's `live_out` in place and marks
/// [`FunFlags::LIVENESS_VALID`]. Requires `ir::cfg::compute` to have
/// already populated block edges.
pub fn compute_liveness(
    fun: &mut Fun,
    ops: &dyn OpcodeInfo,
    callee_of: impl Fn(FunRef) -> CalleeContract,
) -> usize {
    let layout = fun.layout().to_vec();
    debug_assert!(
        layout.len() <= 1 || !fun.bbl(layout[0]).edge_out().is_empty(),
        "ir::cfg::compute must run before computing liveness"
    );

    let mut all: BTreeMap<BblRef, BlockLiveness> = BTreeMap::new();
    for &b in &layout {
        let (live_def, live_use) = bbl_def_use(fun.bbl(b).instructions(), &fun.regs, ops, &callee_of);
        all.insert(
            b,
            BlockLiveness {
                live_in: BTreeSet::new(),
                live_out: BTreeSet::new(),
                live_def,
                live_use,
            },
        );
    }

    let mut rounds = 0;
    let mut active: Vec<BblRef> = layout.clone();
    while let Some(b) = active.pop() {
        rounds += 1;
        let mut live_in = all[&b].live_out.clone();
        for r in &all[&b].live_def {
            live_in.remove(r);
        }
        for r in &all[&b].live_use {
            live_in.insert(*r);
        }
        if live_in.len() <= all[&b].live_in.len() {
            continue;
        }
        all.get_mut(&b).unwrap().live_in = live_in.clone();

        for &pred in fun.bbl(b).edge_in() {
            let pred_liveness = all.get_mut(&pred).unwrap();
            let old_len = pred_liveness.live_out.len();
            pred_liveness.live_out.extend(live_in.iter().copied());
            if pred_liveness.live_out.len() > old_len && !active.contains(&pred) {
                log::trace!("liveness: re-enqueuing block {:?}, live_out grew {} -> {}", pred, old_len, pred_liveness.live_out.len());
                active.push(pred);
            }
        }
    }

    for &b in &layout {
        let live_out = all.remove(&b).unwrap().live_out;
        fun.bbl_mut(b).set_live_out(live_out);
    }
    fun.flags_mut().insert(FunFlags::LIVENESS_VALID);
    log::debug!("liveness: fixpoint reached for {:?} blocks in {} rounds", layout.len(), rounds);
    rounds
}

/// Similar to [`ins_update_def_use`] but also reports whether the
/// instruction is live (must be kept).
///
/// `cpu_live_in`/`cpu_live_clobber` are not folded into `live_out` here,
/// which leaves some dead code after argument-passing sequences
/// unremoved — a known gap, not a bug to paper over.
fn ins_update_liveness(
    ins: &Instruction,
    regs: &PrimaryMap<RegRef, Reg>,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(FunRef) -> CalleeContract,
    live_out: &mut BTreeSet<RegRef>,
) -> bool {
    if ops.is_call(ins.opcode()) {
        if let Some(callee) = ins.call_target() {
            let contract = callee_of(callee);
            for r in regs_pinned_to(regs, contract.cpu_live_out) {
                live_out.remove(&r);
            }
        }
    }

    let mut is_live = ops.has_side_effect(ins.opcode());
    let num_defs = ops.def_ops_count(ins.opcode());
    for (n, op) in ins.operands().iter().enumerate() {
        let r = match op.as_reg() {
            Some(r) => r,
            None => continue,
        };
        if n < num_defs {
            if live_out.contains(&r) {
                is_live = true;
            }
            live_out.remove(&r);
        } else {
            if !is_live {
                break;
            }
            live_out.insert(r);
        }
    }
    is_live
}

fn bbl_remove_useless_instructions(
    instructions: &mut Vec<Instruction>,
    live_out_seed: &BTreeSet<RegRef>,
    regs: &PrimaryMap<RegRef, Reg>,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(FunRef) -> CalleeContract,
) -> usize {
    let mut live_out = live_out_seed.clone();
    let old_count = instructions.len();
    let mut keep = Vec::with_capacity(old_count);
    for ins in instructions.drain(..).rev() {
        if ins_update_liveness(&ins, regs, ops, callee_of, &mut live_out) {
            keep.push(ins);
        }
    }
    keep.reverse();
    let removed = old_count - keep.len();
    *instructions = keep;
    removed
}

/// Delete instructions whose defined registers are never read, walking
/// every block backward from its `live_out` set. Requires
/// [`compute_liveness`] to have run since the last edit.
pub fn remove_useless_instructions(
    fun: &mut Fun,
    ops: &dyn OpcodeInfo,
    callee_of: impl Fn(FunRef) -> CalleeContract,
) -> usize {
    assert!(
        fun.flags().contains(FunFlags::LIVENESS_VALID),
        "liveness must be computed before removing useless instructions"
    );
    let mut total = 0;
    for (_, bbl) in fun.blocks.iter_mut() {
        let live_out = bbl.live_out().clone();
        let removed = bbl_remove_useless_instructions(
            bbl.instructions_mut(),
            &live_out,
            &fun.regs,
            ops,
            &callee_of,
        );
        if removed > 0 {
            log::trace!("liveness: removed {} dead instruction(s) from block {:?}", removed, bbl.name());
        }
        total += removed;
    }
    log::debug!("liveness: removed {} dead instruction(s) total", total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::{self, BranchKind};
    use crate::ir::dk::DK;
    use crate::ir::{Bbl, Instruction, Operand};

    struct TestOps;
    // opcode 0 = mov (def 1, use 1), 1 = add (def 1, use 2),
    // 2 = store (no def, use 1, has side effect), 3 = jump (no def/use).
    impl OpcodeInfo for TestOps {
        fn def_ops_count(&self, op: crate::ir::Opcode) -> usize {
            match op {
                0 | 1 => 1,
                _ => 0,
            }
        }
        fn is_call(&self, _op: crate::ir::Opcode) -> bool {
            false
        }
        fn is_return(&self, _op: crate::ir::Opcode) -> bool {
            false
        }
        fn has_side_effect(&self, op: crate::ir::Opcode) -> bool {
            op == 2
        }
        fn branch_kind(&self, op: crate::ir::Opcode) -> BranchKind {
            if op == 3 {
                BranchKind::Unconditional
            } else {
                BranchKind::Fallthrough
            }
        }
        fn mnemonic(&self, _op: crate::ir::Opcode) -> &str {
            "?"
        }
    }

    fn no_callees(_f: FunRef) -> CalleeContract<'static> {
        CalleeContract {
            cpu_live_in: &[],
            cpu_live_out: &[],
            cpu_live_clobber: &[],
        }
    }

    #[test]
    fn dead_store_into_unread_reg_is_removed() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let r1 = fun.new_reg(Reg::new("r1", DK::S32));
        let mut entry = Bbl::new("entry");
        // r0 = mov 1 ; r1 = add r0, r0 ; (r1 never read again)
        entry.push(Instruction::new(0, vec![Operand::Reg(r0), Operand::Imm(1)]));
        entry.push(Instruction::new(
            1,
            vec![Operand::Reg(r1), Operand::Reg(r0), Operand::Reg(r0)],
        ));
        let b = fun.new_bbl(entry);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        compute_liveness(&mut fun, &TestOps, no_callees);
        let removed = remove_useless_instructions(&mut fun, &TestOps, no_callees);
        assert_eq!(removed, 1);
        assert_eq!(fun.bbl(b).instructions().len(), 1);
        assert_eq!(fun.bbl(b).instructions()[0].opcode(), 0);
    }

    #[test]
    fn store_with_side_effect_is_kept() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let mut entry = Bbl::new("entry");
        entry.push(Instruction::new(0, vec![Operand::Reg(r0), Operand::Imm(1)]));
        entry.push(Instruction::new(2, vec![Operand::Reg(r0)]));
        fun.new_bbl(entry);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        compute_liveness(&mut fun, &TestOps, no_callees);
        let removed = remove_useless_instructions(&mut fun, &TestOps, no_callees);
        assert_eq!(removed, 0);
    }

    #[test]
    fn live_out_propagates_across_two_blocks() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let mut b0 = Bbl::new("b0");
        b0.push(Instruction::new(0, vec![Operand::Reg(r0), Operand::Imm(1)]));
        let mut b1 = Bbl::new("b1");
        b1.push(Instruction::new(2, vec![Operand::Reg(r0)]));
        fun.new_bbl(b0);
        fun.new_bbl(b1);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        compute_liveness(&mut fun, &TestOps, no_callees);
        let removed = remove_useless_instructions(&mut fun, &TestOps, no_callees);
        assert_eq!(removed, 0);
    }
}
