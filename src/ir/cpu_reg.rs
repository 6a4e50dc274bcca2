//! Physical (CPU) register identity.
//!
//! A `CpuReg` names a physical register bank slot: which bank (e.g.
//! integer vs float), how wide, and which unit number within the bank.
//! ISA register tables (`crate::isa::*::registers`) hand out `CpuReg`
//! values; the rest of the crate treats them as opaque, comparable,
//! displayable identities.

use core::fmt;

/// Which register bank a `CpuReg` belongs to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RegBankKind {
    /// General-purpose integer registers.
    Integer,
    /// Floating-point / vector registers.
    Float,
}

/// A physical register: identity, bank, and width class.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CpuReg {
    name: &'static str,
    bank: RegBankKind,
    /// Register unit number within the bank (the ISA table's index).
    no: u16,
    /// Is this a synthetic register manufactured by the pressure probe
    /// (see `regalloc::linear_scan`) rather than a real ISA register?
    synthetic: bool,
}

impl CpuReg {
    /// A real, named ISA register.
    pub const fn new(name: &'static str, bank: RegBankKind, no: u16) -> Self {
        CpuReg {
            name,
            bank,
            no,
            synthetic: false,
        }
    }

    /// The register's display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Which bank this register lives in.
    pub fn bank(&self) -> RegBankKind {
        self.bank
    }

    /// The bank-relative unit number.
    pub fn no(&self) -> u16 {
        self.no
    }

    /// `true` for registers manufactured on the fly by the register-
    /// pressure probe rather than real ISA registers.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

impl fmt::Display for CpuReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Debug for CpuReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CpuReg({})", self.name)
    }
}

/// A leaked, synthetic `CpuReg` manufactured by the register-pressure
/// probe (`regalloc::linear_scan::LinearScanPool`). These have no fixed
/// ISA identity; they only need to be distinguishable from one another
/// while the probe is running.
pub fn synthetic(name: String, bank: RegBankKind, no: u16) -> CpuReg {
    CpuReg {
        name: Box::leak(name.into_boxed_str()),
        bank,
        no,
        synthetic: true,
    }
}
