//! Control-flow edge computation.
//!
//! Derives `bbl.edge_out`/`edge_in` once, right after parsing, from each
//! block's terminator. This module knows nothing about any particular
//! ISA's opcode numbering, so callers classify each block's terminator via a
//! `BranchKind` supplied through a closure (the per-ISA opcode table
//! implements the classification; see `isa::TargetIsa::branch_kind`).

use crate::ir::entities::Bbl as BblRef;
use crate::ir::function::Fun;
use crate::ir::instruction::Opcode;
use std::collections::BTreeMap;

/// How a block's last instruction affects control flow.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BranchKind {
    /// Not a branch; control falls through to the next block in layout
    /// order.
    Fallthrough,
    /// Unconditionally transfers to the instruction's branch target;
    /// no fallthrough edge.
    Unconditional,
    /// Transfers to the branch target if taken, falls through to the
    /// next block in layout order otherwise.
    Conditional,
    /// Leaves the function; no successor edges.
    Return,
}

/// Recompute every block's `edge_in`/`edge_out` from its terminator.
///
/// `classify` maps an opcode to its `BranchKind`; blocks with no
/// instructions, or whose last instruction isn't a branch, are treated
/// as `Fallthrough`.
pub fn compute(fun: &mut Fun, classify: impl Fn(Opcode) -> BranchKind) {
    let layout = fun.layout().to_vec();
    let mut out_edges: BTreeMap<BblRef, Vec<BblRef>> = BTreeMap::new();

    for (idx, &b) in layout.iter().enumerate() {
        let next = layout.get(idx + 1).copied();
        let block = fun.bbl(b);
        let last = block.instructions().last();
        let kind = last
            .map(|ins| classify(ins.opcode()))
            .unwrap_or(BranchKind::Fallthrough);

        let mut outs = Vec::new();
        match kind {
            BranchKind::Fallthrough => {
                if let Some(n) = next {
                    outs.push(n);
                }
            }
            BranchKind::Unconditional => {
                if let Some(target) = last.and_then(|i| i.branch_target()) {
                    outs.push(target);
                }
            }
            BranchKind::Conditional => {
                if let Some(target) = last.and_then(|i| i.branch_target()) {
                    outs.push(target);
                }
                if let Some(n) = next {
                    outs.push(n);
                }
            }
            BranchKind::Return => {}
        }
        out_edges.insert(b, outs);
    }

    let mut in_edges: BTreeMap<BblRef, Vec<BblRef>> = BTreeMap::new();
    for (&b, outs) in &out_edges {
        for &o in outs {
            in_edges.entry(o).or_default().push(b);
        }
    }

    for &b in &layout {
        let outs = out_edges.remove(&b).unwrap_or_default();
        let ins = in_edges.remove(&b).unwrap_or_default();
        fun.bbl_mut(b).set_edges(ins, outs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::bbl::Bbl;
    use crate::ir::instruction::{Instruction, Operand};

    #[test]
    fn straight_line_falls_through() {
        let mut f = Fun::new("f");
        let b0 = f.new_bbl(Bbl::new("a"));
        let b1 = f.new_bbl(Bbl::new("b"));
        compute(&mut f, |_| BranchKind::Fallthrough);
        assert_eq!(f.bbl(b0).edge_out(), &[b1]);
        assert_eq!(f.bbl(b1).edge_in(), &[b0]);
        assert!(f.bbl(b1).edge_out().is_empty());
    }

    #[test]
    fn conditional_branch_has_two_successors() {
        let mut f = Fun::new("f");
        let b0 = f.new_bbl(Bbl::new("a"));
        let b1 = f.new_bbl(Bbl::new("b"));
        let b2 = f.new_bbl(Bbl::new("c"));
        f.bbl_mut(b0).push(Instruction::new(0, vec![Operand::Bbl(b2)]));
        compute(&mut f, |_| BranchKind::Conditional);
        let outs = f.bbl(b0).edge_out();
        assert_eq!(outs, &[b2, b1]);
    }
}
