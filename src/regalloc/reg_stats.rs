//! Register-usage statistics.
//!
//! Three passes over a function's
//! registers and blocks that classify registers as global/local and
//! LAC/not-LAC, a pass that splits apparently-global local registers
//! into genuinely local ones, and a linear-scan probe that turns those
//! classifications into a register-pressure count per `(bank, LAC)`
//! class.

use crate::ir::dk::DK;
use crate::ir::entities::Reg as RegRef;
use crate::ir::flags::{LiveRangeFlags, RegFlags};
use crate::ir::function::Fun;
use crate::ir::instruction::Operand;
use crate::isa::OpcodeInfo;
use crate::regalloc::linear_scan::{register_assigner_linear_scan, LinearScanPool, PoolKey};
use crate::regalloc::live_range::{block_live_ranges, CpuRegSlot, LiveRange};
use std::collections::HashMap;

/// Reset and recompute `def_ins`/`def_bbl` and the `MULTI_DEF`,
/// `GLOBAL`, `IS_READ`, `MULTI_READ` flags on every register.
///
/// The `GLOBAL` computation here is conservative: a register used in
/// more than one block is marked global even if it never actually
/// appears in a `live_out` set (the two-address / loop-carried rename
/// done by [`separate_local_reg_usage`] resolves the false positives).
pub fn compute_reg_stats_except_lac(fun: &mut Fun, ops: &dyn OpcodeInfo) {
    for (_, reg) in fun.regs_iter_mut() {
        reg.clear_def();
        reg.flags_mut().remove(
            RegFlags::MULTI_DEF | RegFlags::GLOBAL | RegFlags::IS_READ | RegFlags::MULTI_READ,
        );
    }

    let layout = fun.layout().to_vec();
    for b in layout {
        let instr_len = fun.bbl(b).instructions().len();
        for pos in 0..instr_len {
            let opcode = fun.bbl(b).instructions()[pos].opcode();
            let num_defs = ops.def_ops_count(opcode);
            let operands: Vec<Operand> = fun.bbl(b).instructions()[pos].operands().to_vec();
            for (n, op) in operands.iter().enumerate() {
                let r = match op.as_reg() {
                    Some(r) => r,
                    None => continue,
                };
                if n < num_defs {
                    if fun.reg(r).def_bbl().is_none() {
                        fun.reg_mut(r).set_def(b, pos as u32);
                    } else {
                        fun.reg_mut(r).flags_mut().insert(RegFlags::MULTI_DEF);
                        if fun.reg(r).def_bbl() != Some(b) {
                            fun.reg_mut(r).flags_mut().insert(RegFlags::GLOBAL);
                        }
                    }
                } else {
                    if fun.reg(r).flags().contains(RegFlags::IS_READ) {
                        fun.reg_mut(r).flags_mut().insert(RegFlags::MULTI_READ);
                    } else {
                        fun.reg_mut(r).flags_mut().insert(RegFlags::IS_READ);
                    }
                    if fun.reg(r).def_bbl() != Some(b) {
                        fun.reg_mut(r).flags_mut().insert(RegFlags::GLOBAL);
                    }
                }
            }
        }
    }
}

/// Reset and recompute the `GLOBAL` and `LAC` flags by walking each
/// block backward with a running live set. More accurate than
/// [`compute_reg_stats_except_lac`]'s `GLOBAL` bit: a register is only
/// `GLOBAL` here if it is actually live at block entry.
pub fn compute_reg_stats_lac(fun: &mut Fun, ops: &dyn OpcodeInfo) {
    for (_, reg) in fun.regs_iter_mut() {
        reg.flags_mut().remove(RegFlags::GLOBAL | RegFlags::LAC);
    }

    let layout = fun.layout().to_vec();
    for b in layout {
        let mut live_out: std::collections::BTreeSet<RegRef> = fun.bbl(b).live_out().clone();
        let instr_len = fun.bbl(b).instructions().len();
        for pos in (0..instr_len).rev() {
            let opcode = fun.bbl(b).instructions()[pos].opcode();
            if ops.is_call(opcode) {
                for &r in &live_out {
                    fun.reg_mut(r).flags_mut().insert(RegFlags::LAC);
                }
            }
            let num_defs = ops.def_ops_count(opcode);
            let operands: Vec<Operand> = fun.bbl(b).instructions()[pos].operands().to_vec();
            for (n, op) in operands.iter().enumerate() {
                let r = match op.as_reg() {
                    Some(r) => r,
                    None => continue,
                };
                if n < num_defs {
                    live_out.remove(&r);
                } else {
                    live_out.insert(r);
                }
            }
        }
        for &r in &live_out {
            fun.reg_mut(r).flags_mut().insert(RegFlags::GLOBAL);
        }
    }
}

/// Split each def (after the first) of a non-global, non-two-address,
/// not-yet-allocated register into a fresh scratch register, and
/// rewrite that def and every subsequent use in the block up to (not
/// including) the next def of the original register.
///
/// This turns registers that `compute_reg_stats_except_lac` pessimistically
/// marked global purely because they're redefined in several blocks
/// into genuinely local, per-block registers, tightening the pressure
/// accounting [`compute_bbl_reg_usage_stats`] does afterward. Returns
/// the number of splits performed.
pub fn separate_local_reg_usage(fun: &mut Fun, ops: &dyn OpcodeInfo) -> usize {
    let mut count = 0;
    let layout = fun.layout().to_vec();
    for b in layout {
        let instr_len = fun.bbl(b).instructions().len();
        for pos in 0..instr_len {
            let opcode = fun.bbl(b).instructions()[pos].opcode();
            let num_defs = ops.def_ops_count(opcode);
            for n in 0..num_defs {
                let operands = fun.bbl(b).instructions()[pos].operands().to_vec();
                let reg_ref = match operands.get(n).and_then(Operand::as_reg) {
                    Some(r) => r,
                    None => continue,
                };
                let data = fun.reg(reg_ref);
                let is_first_def =
                    data.def_bbl() == Some(b) && data.def_pos() == Some(pos as u32);
                let is_global = data.flags().contains(RegFlags::GLOBAL);
                let is_two_address_pinned = data.flags().contains(RegFlags::TWO_ADDRESS)
                    && operands.len() >= 2
                    && operands[0] == operands[1];
                let has_cpu_reg = data.cpu_reg().is_some();
                if is_first_def || is_global || is_two_address_pinned || has_cpu_reg {
                    continue;
                }
                let kind = data.kind();
                let two_address = data.flags().contains(RegFlags::TWO_ADDRESS);
                let new_reg = fun.new_scratch_reg(kind, two_address);
                fun.bbl_mut(b).instructions_mut()[pos].operands_mut()[n] = Operand::Reg(new_reg);
                rename_from(fun, ops, b, pos + 1, reg_ref, new_reg);
                count += 1;
            }
        }
    }
    count
}

/// Rewrite every use of `old` with `new`, starting at `start`, stopping
/// as soon as `old` is redefined (that redefinition begins a new,
/// separately-named live range we don't own).
fn rename_from(
    fun: &mut Fun,
    ops: &dyn OpcodeInfo,
    b: crate::ir::entities::Bbl,
    start: usize,
    old: RegRef,
    new: RegRef,
) {
    let bbl = fun.bbl_mut(b);
    for ins in bbl.instructions_mut().iter_mut().skip(start) {
        let num_defs = ops.def_ops_count(ins.opcode());
        crate::regalloc::liveness::maybe_replace_use_reg(ins, num_defs, old, new);
        let redefined = num_defs > 0 && ins.operands().first().and_then(Operand::as_reg) == Some(old);
        if redefined {
            break;
        }
    }
}

/// Remove registers with no remaining definition and no read from
/// future statistics passes. See `Fun::mark_dropped` for why this is a
/// logical removal rather than a physical one.
pub fn drop_unreferenced_regs(fun: &mut Fun) -> usize {
    let to_drop: Vec<RegRef> = fun
        .regs_iter()
        .filter(|(r, reg)| {
            !fun.is_dropped(*r) && reg.def_bbl().is_none() && !reg.flags().contains(RegFlags::IS_READ)
        })
        .map(|(r, _)| r)
        .collect();
    for r in &to_drop {
        fun.mark_dropped(*r);
    }
    to_drop.len()
}

/// Every physical register already pinned to some virtual register in
/// `fun` (e.g. by a calling-convention parameter binding), queried by a
/// real allocator before it starts handing out free registers.
pub fn preallocated_regs(fun: &Fun) -> std::collections::BTreeSet<u16> {
    fun.regs_iter()
        .filter_map(|(_, reg)| reg.cpu_reg())
        .collect()
}

/// Global/local × LAC/not-LAC counts for a function, a cheap summary
/// computed purely from register flags (no block walk).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FunRegStats {
    /// Global registers live across at least one call.
    pub global_lac: u32,
    /// Global registers never live across a call.
    pub global_not_lac: u32,
    /// Local registers live across at least one call.
    pub local_lac: u32,
    /// Local registers never live across a call.
    pub local_not_lac: u32,
}

/// Compute [`FunRegStats`] for `fun`. Requires
/// [`compute_reg_stats_except_lac`] and [`compute_reg_stats_lac`] to
/// have already run.
pub fn calculate_reg_stats(fun: &Fun) -> FunRegStats {
    let mut rs = FunRegStats::default();
    for (_, reg) in fun.regs_iter() {
        let global = reg.flags().contains(RegFlags::GLOBAL);
        let lac = reg.flags().contains(RegFlags::LAC);
        match (global, lac) {
            (true, true) => rs.global_lac += 1,
            (true, false) => rs.global_not_lac += 1,
            (false, true) => rs.local_lac += 1,
            (false, false) => rs.local_not_lac += 1,
        }
    }
    rs
}

/// Group every unallocated global register by `(kind, LAC)`, the input
/// a global register allocator partitions its work by.
pub fn global_reg_stats(fun: &Fun) -> HashMap<(DK, bool), Vec<RegRef>> {
    let mut out: HashMap<(DK, bool), Vec<RegRef>> = HashMap::new();
    for (r, reg) in fun.regs_iter() {
        if reg.cpu_reg().is_none() && reg.flags().contains(RegFlags::GLOBAL) {
            out.entry((reg.kind(), reg.flags().contains(RegFlags::LAC)))
                .or_default()
                .push(r);
        }
    }
    out
}

fn live_range_should_be_ignored(lr: &LiveRange, fun: &Fun, reg_kinds: &[DK]) -> bool {
    if lr.is_cross_bbl() {
        return true;
    }
    if lr.is_use_lr() {
        return false;
    }
    if !reg_kinds.contains(&lr.reg_kind) {
        return true;
    }
    lr.reg.map_or(true, |r| fun.reg(r).cpu_reg().is_some())
}

/// Compute the maximum number of registers needed for block-local
/// values, per `(bank, LAC)` class, across every block of `fun`.
/// Requires liveness to have been computed.
///
/// `reg_kinds` restricts the probe to the data kinds a caller cares
/// about (e.g. only the integer kinds, when probing the integer
/// allocator's pressure separately from the float allocator's).
pub fn compute_bbl_reg_usage_stats(
    fun: &Fun,
    ops: &dyn OpcodeInfo,
    callee_of: &dyn Fn(crate::ir::entities::FunRef) -> crate::isa::CalleeContract,
    reg_kinds: &[DK],
) -> HashMap<PoolKey, usize> {
    let mut pool = LinearScanPool::new();
    for &b in fun.layout() {
        let bbl = fun.bbl(b);
        let mut live_ranges = block_live_ranges(bbl, fun, bbl.live_out(), ops, callee_of);
        live_ranges.sort();
        for lr in live_ranges.iter_mut() {
            if live_range_should_be_ignored(lr, fun, reg_kinds) {
                lr.flags.insert(LiveRangeFlags::IGNORE);
            }
        }
        register_assigner_linear_scan(&mut live_ranges, &mut pool);
    }
    pool.usage().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::{self, BranchKind};
    use crate::ir::dk::DK;
    use crate::ir::{Bbl, Instruction, Operand as Op, Reg};
    use crate::isa::CalleeContract;

    struct TestOps;
    // 0 = mov (def 1, use 1), 1 = add (def 1, use 2), 2 = call (no def/use),
    // 3 = jump.
    impl OpcodeInfo for TestOps {
        fn def_ops_count(&self, op: crate::ir::Opcode) -> usize {
            match op {
                0 | 1 => 1,
                _ => 0,
            }
        }
        fn is_call(&self, op: crate::ir::Opcode) -> bool {
            op == 2
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

    fn no_callees(_f: crate::ir::entities::FunRef) -> CalleeContract<'static> {
        CalleeContract {
            cpu_live_in: &[],
            cpu_live_out: &[],
            cpu_live_clobber: &[],
        }
    }

    #[test]
    fn global_flag_set_only_for_cross_block_reg() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let mut b0 = Bbl::new("b0");
        b0.push(Instruction::new(0, vec![Op::Reg(r0), Op::Imm(1)]));
        let mut b1 = Bbl::new("b1");
        b1.push(Instruction::new(2, vec![Op::Reg(r0)]));
        fun.new_bbl(b0);
        fun.new_bbl(b1);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        crate::regalloc::liveness::compute_liveness(&mut fun, &TestOps, no_callees);
        compute_reg_stats_except_lac(&mut fun, &TestOps);
        assert!(fun.reg(r0).flags().contains(RegFlags::GLOBAL));
    }

    #[test]
    fn lac_set_when_live_across_call() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let mut b0 = Bbl::new("b0");
        b0.push(Instruction::new(0, vec![Op::Reg(r0), Op::Imm(1)]));
        b0.push(Instruction::new(2, vec![]));
        b0.push(Instruction::new(1, vec![Op::Reg(r0), Op::Reg(r0), Op::Reg(r0)]));
        fun.new_bbl(b0);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        crate::regalloc::liveness::compute_liveness(&mut fun, &TestOps, no_callees);
        compute_reg_stats_lac(&mut fun, &TestOps);
        assert!(fun.reg(r0).flags().contains(RegFlags::LAC));
    }

    #[test]
    fn drop_unreferenced_counts_dead_reg() {
        let mut fun = Fun::new("f");
        let _live = fun.new_reg(Reg::new("live", DK::S32));
        let dead = fun.new_reg(Reg::new("dead", DK::S32));
        let mut b0 = Bbl::new("b0");
        b0.push(Instruction::new(0, vec![Op::Reg(_live), Op::Imm(1)]));
        fun.new_bbl(b0);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        compute_reg_stats_except_lac(&mut fun, &TestOps);
        let removed = drop_unreferenced_regs(&mut fun);
        assert_eq!(removed, 1);
        assert!(fun.is_dropped(dead));
        assert!(!fun.is_dropped(_live));
    }

    #[test]
    fn separate_local_reg_usage_splits_repeated_defs() {
        let mut fun = Fun::new("f");
        let r0 = fun.new_reg(Reg::new("r0", DK::S32));
        let mut b0 = Bbl::new("b0");
        b0.push(Instruction::new(0, vec![Op::Reg(r0), Op::Imm(1)]));
        b0.push(Instruction::new(0, vec![Op::Reg(r0), Op::Imm(2)]));
        b0.push(Instruction::new(2, vec![Op::Reg(r0)]));
        fun.new_bbl(b0);
        cfg::compute(&mut fun, |op| TestOps.branch_kind(op));
        crate::regalloc::liveness::compute_liveness(&mut fun, &TestOps, no_callees);
        compute_reg_stats_except_lac(&mut fun, &TestOps);
        // r0 is not global here (single block), so the second def should split.
        let splits = separate_local_reg_usage(&mut fun, &TestOps);
        assert_eq!(splits, 1);
    }
}
