//! Virtual registers.
//!
//! A virtual register
//! carries a data kind, an optional fixed physical-register assignment,
//! bookkeeping about where it is defined, and the flags filled in by
//! `regalloc::reg_stats`.

use crate::ir::dk::DK;
use crate::ir::entities::{Bbl, InstPos};
use crate::ir::flags::RegFlags;

/// A virtual register.
///
/// `Fun::regs` is the owning table; `crate::ir::entities::Reg` is the
/// handle other structures use to refer to one.
#[derive(Clone, Debug)]
pub struct Reg {
    name: String,
    kind: DK,
    /// Physical register this virtual register has been pinned or
    /// assigned to. `None` until allocation runs.
    cpu_reg: Option<u16>,
    /// Basic block containing this register's (unique, for non-global
    /// regs) definition. `None` for function parameters.
    def_bbl: Option<Bbl>,
    /// Position within `def_bbl` of the defining instruction.
    def_pos: Option<InstPos>,
    /// Classification flags filled in by `regalloc::reg_stats`.
    flags: RegFlags,
    /// Stack-slot index assigned once `RegFlags::SPILLED` is set.
    /// `regalloc::spill::insert_spill_code` turns this into explicit
    /// load/store instructions.
    stack_slot: Option<u32>,
}

impl Reg {
    /// Create a fresh, unclassified virtual register.
    pub fn new(name: impl Into<String>, kind: DK) -> Self {
        Reg {
            name: name.into(),
            kind,
            cpu_reg: None,
            def_bbl: None,
            def_pos: None,
            flags: RegFlags::NONE,
            stack_slot: None,
        }
    }

    /// The register's source-level name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The register's data kind.
    pub fn kind(&self) -> DK {
        self.kind
    }

    /// The physical register unit assigned to this virtual register, if
    /// allocation has run.
    pub fn cpu_reg(&self) -> Option<u16> {
        self.cpu_reg
    }

    /// Assign a physical register unit.
    pub fn set_cpu_reg(&mut self, no: u16) {
        self.cpu_reg = Some(no);
    }

    /// Clear a physical register assignment (used when re-running the
    /// allocator after `regalloc::spill` rewrites the function).
    pub fn clear_cpu_reg(&mut self) {
        self.cpu_reg = None;
    }

    /// Record this register's (unique) definition site.
    pub fn set_def(&mut self, bbl: Bbl, pos: InstPos) {
        self.def_bbl = Some(bbl);
        self.def_pos = Some(pos);
    }

    /// Forget this register's recorded definition site, ahead of a
    /// fresh `regalloc::reg_stats::compute_reg_stats_except_lac` pass.
    pub fn clear_def(&mut self) {
        self.def_bbl = None;
        self.def_pos = None;
    }

    /// The block containing this register's definition, if recorded.
    pub fn def_bbl(&self) -> Option<Bbl> {
        self.def_bbl
    }

    /// The position within `def_bbl` of the defining instruction, if
    /// recorded.
    pub fn def_pos(&self) -> Option<InstPos> {
        self.def_pos
    }

    /// The classification flags computed by `regalloc::reg_stats`.
    pub fn flags(&self) -> RegFlags {
        self.flags
    }

    /// Mutable access to the classification flags, for
    /// `regalloc::reg_stats` to fill in.
    pub fn flags_mut(&mut self) -> &mut RegFlags {
        &mut self.flags
    }

    /// `true` if this register is live across a basic-block boundary.
    pub fn is_global(&self) -> bool {
        self.flags.contains(RegFlags::GLOBAL)
    }

    /// `true` if this register is live across at least one call.
    pub fn is_lac(&self) -> bool {
        self.flags.contains(RegFlags::LAC)
    }

    /// The stack slot this register spills to, once assigned.
    pub fn stack_slot(&self) -> Option<u32> {
        self.stack_slot
    }

    /// Assign a stack slot. Does not itself set `RegFlags::SPILLED`;
    /// callers do that alongside, once a slot is actually needed.
    pub fn set_stack_slot(&mut self, slot: u32) {
        self.stack_slot = Some(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_reg_has_no_classification() {
        let r = Reg::new("x", DK::S32);
        assert_eq!(r.kind(), DK::S32);
        assert!(r.cpu_reg().is_none());
        assert!(!r.is_global());
        assert!(!r.is_lac());
    }

    #[test]
    fn def_site_round_trips() {
        let mut r = Reg::new("y", DK::U64);
        r.set_def(Bbl::new(2), 5);
        assert_eq!(r.def_bbl(), Some(Bbl::new(2)));
        assert_eq!(r.def_pos(), Some(5));
    }
}
