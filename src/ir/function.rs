//! Functions: the unit of register allocation.
//!
//! A function owns its virtual registers and
//! basic blocks; everything downstream (liveness, live ranges, register
//! statistics, spilling) operates on one `Fun` at a time.

use crate::ir::bbl::Bbl;
use crate::ir::dk::DK;
use crate::ir::entities::{Bbl as BblRef, Reg as RegRef};
use crate::ir::flags::{FunFlags, RegFlags};
use crate::ir::reg::Reg;
use cranelift_entity::PrimaryMap;
use std::collections::BTreeSet;

/// A function: its virtual registers, basic blocks, and calling-
/// convention contract with the outside world.
#[derive(Clone, Debug)]
pub struct Fun {
    name: String,
    pub(crate) regs: PrimaryMap<RegRef, Reg>,
    pub(crate) blocks: PrimaryMap<BblRef, Bbl>,
    /// Order in which `blocks` should be laid out / walked; equal to
    /// insertion order unless a later pass reorders it.
    layout: Vec<BblRef>,
    /// Physical registers the calling convention guarantees are live on
    /// entry (typically argument registers).
    cpu_live_in: Vec<u16>,
    /// Physical registers the calling convention requires be live at
    /// every return (typically result registers).
    cpu_live_out: Vec<u16>,
    /// Physical registers the calling convention allows a callee to
    /// clobber freely (caller-saved registers).
    cpu_live_clobber: Vec<u16>,
    flags: FunFlags,
    /// Registers `regalloc::reg_stats::drop_unreferenced_regs` has
    /// logically removed. `cranelift_entity::PrimaryMap` has no
    /// removal primitive (entity identity is permanent once handed
    /// out, matching upstream Cranelift), so a dropped register stays
    /// in `regs` but is skipped by every later pass.
    dropped_regs: BTreeSet<RegRef>,
}

impl Fun {
    /// Create an empty function.
    pub fn new(name: impl Into<String>) -> Self {
        Fun {
            name: name.into(),
            regs: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            layout: Vec::new(),
            cpu_live_in: Vec::new(),
            cpu_live_out: Vec::new(),
            cpu_live_clobber: Vec::new(),
            flags: FunFlags::NONE,
            dropped_regs: BTreeSet::new(),
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocate a new virtual register and return its handle.
    pub fn new_reg(&mut self, reg: Reg) -> RegRef {
        self.regs.push(reg)
    }

    /// Append a new basic block to both the block table and the layout
    /// order, and return its handle.
    pub fn new_bbl(&mut self, bbl: Bbl) -> BblRef {
        let r = self.blocks.push(bbl);
        self.layout.push(r);
        r
    }

    /// Look up a register by handle.
    pub fn reg(&self, r: RegRef) -> &Reg {
        &self.regs[r]
    }

    /// Mutable lookup of a register by handle.
    pub fn reg_mut(&mut self, r: RegRef) -> &mut Reg {
        &mut self.regs[r]
    }

    /// Look up a block by handle.
    pub fn bbl(&self, b: BblRef) -> &Bbl {
        &self.blocks[b]
    }

    /// Mutable lookup of a block by handle.
    pub fn bbl_mut(&mut self, b: BblRef) -> &mut Bbl {
        &mut self.blocks[b]
    }

    /// All registers, in allocation order, with their handles.
    pub fn regs_iter(&self) -> impl Iterator<Item = (RegRef, &Reg)> {
        self.regs.iter()
    }

    /// All registers, mutably, with their handles.
    pub fn regs_iter_mut(&mut self) -> impl Iterator<Item = (RegRef, &mut Reg)> {
        self.regs.iter_mut()
    }

    /// Allocate a fresh scratch register of the given kind, for
    /// `regalloc::reg_stats::separate_local_reg_usage` to split a
    /// block-local def/use chain out of a register that otherwise
    /// looks global.
    pub fn new_scratch_reg(&mut self, kind: DK, two_address: bool) -> RegRef {
        let idx = self.regs.len();
        let mut reg = Reg::new(format!("$scratch_{}", idx), kind);
        if two_address {
            reg.flags_mut().insert(RegFlags::TWO_ADDRESS);
        }
        self.regs.push(reg)
    }

    /// Mark a register as logically dropped (see `dropped_regs`).
    pub fn mark_dropped(&mut self, r: RegRef) {
        self.dropped_regs.insert(r);
    }

    /// `true` if `r` has been dropped by
    /// `regalloc::reg_stats::drop_unreferenced_regs`.
    pub fn is_dropped(&self, r: RegRef) -> bool {
        self.dropped_regs.contains(&r)
    }

    /// Number of registers dropped so far.
    pub fn dropped_count(&self) -> usize {
        self.dropped_regs.len()
    }

    /// All block handles, in layout order.
    pub fn layout(&self) -> &[BblRef] {
        &self.layout
    }

    /// Physical registers live on entry per the calling convention.
    pub fn cpu_live_in(&self) -> &[u16] {
        &self.cpu_live_in
    }

    /// Physical registers live at every return per the calling
    /// convention.
    pub fn cpu_live_out(&self) -> &[u16] {
        &self.cpu_live_out
    }

    /// Physical registers a callee may clobber freely.
    pub fn cpu_live_clobber(&self) -> &[u16] {
        &self.cpu_live_clobber
    }

    /// Set the calling-convention contract. Called once, at function
    /// construction time, from the ISA's calling-convention table.
    pub fn set_cpu_contract(
        &mut self,
        live_in: Vec<u16>,
        live_out: Vec<u16>,
        live_clobber: Vec<u16>,
    ) {
        self.cpu_live_in = live_in;
        self.cpu_live_out = live_out;
        self.cpu_live_clobber = live_clobber;
    }

    /// The function-level flags (currently just liveness validity).
    pub fn flags(&self) -> FunFlags {
        self.flags
    }

    /// Mutable access to the function-level flags.
    pub fn flags_mut(&mut self) -> &mut FunFlags {
        &mut self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::dk::DK;

    #[test]
    fn new_bbl_extends_layout_in_order() {
        let mut f = Fun::new("f");
        let b0 = f.new_bbl(Bbl::new("entry"));
        let b1 = f.new_bbl(Bbl::new("exit"));
        assert_eq!(f.layout(), &[b0, b1]);
    }

    #[test]
    fn reg_lookup_round_trips() {
        let mut f = Fun::new("f");
        let r = f.new_reg(Reg::new("x", DK::S32));
        assert_eq!(f.reg(r).name(), "x");
    }
}
