//! Linear-scan register-pressure probe.
//!
//! `regalloc::reg_stats::compute_bbl_reg_usage_stats` needs to know, for
//! each (register-bank, LAC) combination, the maximum number of distinct
//! physical registers that would be live at once if every local live
//! range in a function were assigned its own register. This module runs
//! the textbook linear-scan assignment algorithm against a synthetic
//! [`RegPool`] that manufactures pseudo-registers on demand instead of
//! drawing from a fixed ISA bank, and records the high-water mark per
//! class as it goes.
//!
//! A real register allocator would implement [`RegPool`] over an actual
//! ISA register bank instead; [`register_assigner_linear_scan`] doesn't
//! care which kind of pool it's handed.

use crate::ir::cpu_reg::{synthetic, CpuReg, RegBankKind};
use crate::ir::flags::LiveRangeFlags;
use crate::regalloc::live_range::{CpuRegSlot, LiveRange};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A free list rarely holds more than a handful of registers per class;
/// the inline capacity covers the common case without spilling to the
/// heap.
type FreeList = SmallVec<[CpuReg; 4]>;

/// A supplier of physical registers to the linear-scan assigner.
/// Implementors decide what "available" means: a fixed ISA bank for a
/// real allocator, or an unbounded synthetic pool for the pressure
/// probe.
pub trait RegPool {
    /// Hand out a register suitable for `lr`. May manufacture a new one
    /// if none is free.
    fn get_available_reg(&mut self, lr: &LiveRange) -> CpuReg;

    /// Return a register to the pool once its live range has expired.
    fn give_back_available_reg(&mut self, cpu_reg: CpuReg);
}

/// The key a synthetic pool partitions its free lists by: register bank
/// and whether the live range using it crosses a call.
pub type PoolKey = (RegBankKind, bool);

/// The register-pressure probe's [`RegPool`]: manufactures registers on
/// demand and tracks, per `(bank, LAC)` class, the largest number of
/// registers simultaneously checked out.
#[derive(Default)]
pub struct LinearScanPool {
    counter: u16,
    available: HashMap<PoolKey, FreeList>,
    checked_out: HashMap<PoolKey, usize>,
    high_water: HashMap<PoolKey, usize>,
    owner: HashMap<u16, PoolKey>,
}

impl LinearScanPool {
    /// An empty pool, ready to probe one or more blocks. A single pool
    /// reused across every block of a function computes the maximum
    /// pressure over the whole function, matching
    /// `regalloc::reg_stats::compute_bbl_reg_usage_stats`.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(lr: &LiveRange) -> PoolKey {
        (lr.reg_kind.bank(), lr.flags.contains(LiveRangeFlags::LAC))
    }

    /// The high-water mark recorded so far for each `(bank, LAC)`
    /// class.
    pub fn usage(&self) -> &HashMap<PoolKey, usize> {
        &self.high_water
    }
}

impl RegPool for LinearScanPool {
    fn get_available_reg(&mut self, lr: &LiveRange) -> CpuReg {
        let key = Self::key_of(lr);
        let reg = match self.available.get_mut(&key).and_then(SmallVec::pop) {
            Some(r) => r,
            None => {
                self.counter += 1;
                synthetic(format!("z{}", self.counter), key.0, self.counter)
            }
        };
        self.owner.insert(reg.no(), key);
        let count = self.checked_out.entry(key).or_insert(0);
        *count += 1;
        let hw = self.high_water.entry(key).or_insert(0);
        if *count > *hw {
            *hw = *count;
        }
        reg
    }

    fn give_back_available_reg(&mut self, cpu_reg: CpuReg) {
        if let Some(key) = self.owner.remove(&cpu_reg.no()) {
            if let Some(c) = self.checked_out.get_mut(&key) {
                *c = c.saturating_sub(1);
            }
            self.available.entry(key).or_default().push(cpu_reg);
        }
    }
}

/// Assign a physical register to every live range that isn't
/// [`LiveRangeFlags::IGNORE`], [`LiveRangeFlags::PRE_ALLOC`], or a use
/// marker, in textbook linear-scan order.
///
/// `live_ranges` must already be sorted in the canonical scan order
/// (`live_ranges.sort()`, using `LiveRange`'s `Ord` impl) so that
/// iterating it forward visits ranges in increasing `def_pos` order.
pub fn register_assigner_linear_scan(live_ranges: &mut [LiveRange], pool: &mut dyn RegPool) {
    let mut active: Vec<(crate::regalloc::pos::Pos, CpuReg)> = Vec::new();

    for lr in live_ranges.iter_mut() {
        if lr.is_use_lr()
            || lr.flags.contains(LiveRangeFlags::IGNORE)
            || lr.flags.contains(LiveRangeFlags::PRE_ALLOC)
        {
            continue;
        }

        let start = lr.def_pos;
        let mut i = 0;
        while i < active.len() {
            if active[i].0 < start {
                let (_, reg) = active.remove(i);
                pool.give_back_available_reg(reg);
            } else {
                i += 1;
            }
        }

        let reg = pool.get_available_reg(lr);
        lr.cpu_reg = CpuRegSlot::Assigned(reg.no());
        active.push((lr.last_use_pos, reg));
    }

    for (_, reg) in active {
        pool.give_back_available_reg(reg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::dk::DK;
    use crate::regalloc::pos::Pos;

    fn def_range(def: u32, last: Pos, lac: bool) -> LiveRange {
        let mut flags = LiveRangeFlags::NONE;
        if lac {
            flags.insert(LiveRangeFlags::LAC);
        }
        LiveRange {
            def_pos: Pos::At(def),
            last_use_pos: last,
            reg: Some(crate::ir::entities::Reg::new(def)),
            reg_name: format!("r{}", def),
            reg_kind: DK::S32,
            num_uses: 1,
            uses: Vec::new(),
            flags,
            cpu_reg: CpuRegSlot::Invalid,
        }
    }

    #[test]
    fn disjoint_ranges_reuse_one_register() {
        let mut ranges = vec![def_range(0, Pos::At(1), false), def_range(2, Pos::At(3), false)];
        let mut pool = LinearScanPool::new();
        register_assigner_linear_scan(&mut ranges, &mut pool);
        assert_eq!(ranges[0].cpu_reg, ranges[1].cpu_reg);
        assert_eq!(*pool.usage().get(&(RegBankKind::Integer, false)).unwrap(), 1);
    }

    #[test]
    fn overlapping_ranges_need_two_registers() {
        let mut ranges = vec![def_range(0, Pos::At(5), false), def_range(1, Pos::At(2), false)];
        let mut pool = LinearScanPool::new();
        register_assigner_linear_scan(&mut ranges, &mut pool);
        assert_ne!(ranges[0].cpu_reg, ranges[1].cpu_reg);
        assert_eq!(*pool.usage().get(&(RegBankKind::Integer, false)).unwrap(), 2);
    }

    #[test]
    fn lac_and_non_lac_use_separate_pools() {
        let mut ranges = vec![def_range(0, Pos::At(1), true), def_range(2, Pos::At(3), false)];
        let mut pool = LinearScanPool::new();
        register_assigner_linear_scan(&mut ranges, &mut pool);
        assert_eq!(*pool.usage().get(&(RegBankKind::Integer, true)).unwrap(), 1);
        assert_eq!(*pool.usage().get(&(RegBankKind::Integer, false)).unwrap(), 1);
    }
}
