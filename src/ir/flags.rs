//! Hand-rolled bitset flag types.
//!
//! Plain integer masks with named constants and accessor methods, in the
//! style of `isa::registers::RegClassMask`/`RegUnitMask` — not a
//! macro-generated `bitflags!` type. Implicit integer
//! coercion is forbidden: these types only expose `contains`/`insert`/
//! `remove`/`is_empty`.

macro_rules! flag_set {
    ($name:ident : $repr:ty { $($(#[$meta:meta])* $cname:ident = $val:expr),* $(,)? }) => {
        #[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
        #[allow(missing_docs)]
        pub struct $name(pub $repr);

        impl $name {
            $(
                $(#[$meta])*
                pub const $cname: $name = $name($val);
            )*

            /// The empty flag set.
            pub const NONE: $name = $name(0);

            /// `true` if `self` contains every bit set in `other`.
            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            /// Set the bits in `other`.
            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            /// Clear the bits in `other`.
            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            /// `true` if no bits are set.
            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl core::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

flag_set!(RegFlags: u16 {
    /// Live across a basic-block boundary.
    GLOBAL = 1 << 0,
    /// Live across at least one call instruction.
    LAC = 1 << 1,
    /// Defined more than once.
    MULTI_DEF = 1 << 2,
    /// Read at least once.
    IS_READ = 1 << 3,
    /// Read more than once.
    MULTI_READ = 1 << 4,
    /// Operand 0 (def) and operand 1 (use) must be the same physical
    /// register on encode (x86-64 two-address binops).
    TWO_ADDRESS = 1 << 5,
    /// Assigned to a stack slot rather than a CPU register.
    SPILLED = 1 << 6,
});

flag_set!(FunFlags: u8 {
    /// `Fun::live_out` on every block is up to date.
    LIVENESS_VALID = 1 << 0,
});

flag_set!(LiveRangeFlags: u8 {
    /// Live across a call.
    LAC = 1 << 0,
    /// Already allocated; reuse the register after the last use.
    PRE_ALLOC = 1 << 1,
    /// Ignore completely (already assigned, crosses a block boundary).
    IGNORE = 1 << 2,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut f = RegFlags::NONE;
        assert!(!f.contains(RegFlags::GLOBAL));
        f.insert(RegFlags::GLOBAL);
        f.insert(RegFlags::LAC);
        assert!(f.contains(RegFlags::GLOBAL));
        assert!(f.contains(RegFlags::LAC));
        f.remove(RegFlags::GLOBAL);
        assert!(!f.contains(RegFlags::GLOBAL));
        assert!(f.contains(RegFlags::LAC));
    }
}
