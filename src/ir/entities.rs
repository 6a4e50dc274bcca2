//! Opaque entity references into a [`crate::ir::Fun`].
//!
//! Instructions reference registers and basic blocks by handle rather than
//! by Rust reference, for the usual reasons: borrowck-friendliness and a
//! compact 32-bit representation. Each entity kind gets its own type so
//! the compiler catches accidental mixups between, say, a `Reg` and a
//! `Bbl`.

use cranelift_entity::entity_impl;

/// A reference to a virtual register, indexing [`crate::ir::Fun::regs`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(u32);
entity_impl!(Reg, "reg");

/// A reference to an instruction within its containing basic block.
///
/// Unlike `Reg`/`Bbl`, this is a dense per-block index (position in the
/// block's instruction list), not a handle into a function-wide table.
pub type InstPos = u32;

/// A reference to a basic block, indexing [`crate::ir::Fun::blocks`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bbl(u32);
entity_impl!(Bbl, "bbl");

/// A reference to a function (used as a call target / external name).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunRef(u32);
entity_impl!(FunRef, "fun");

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn reg_round_trips_through_index() {
        let r = Reg::new(7);
        assert_eq!(r.index(), 7);
        assert_eq!(r.to_string(), "reg7");
    }
}
