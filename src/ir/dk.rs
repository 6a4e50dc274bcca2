//! Data kinds for virtual registers.
//!
//! A flat enumeration of scalar widths/signedness plus the two address
//! kinds and the code-address kind used for jump targets.

use crate::ir::cpu_reg::RegBankKind;
use core::fmt;

/// The data kind of a virtual register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum DK {
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    R32,
    R64,
    /// 32-bit address (AArch32, x86-64 in 32-bit-pointer modes).
    A32,
    /// 64-bit address (AArch64, x86-64).
    A64,
    /// Code address (basic-block / function target).
    C32,
    /// Invalid/uninitialized sentinel, used only by the use-record half
    /// of a [`crate::regalloc::live_range::LiveRange`].
    Invalid,
}

impl DK {
    /// Size in bytes of a value of this kind, or `None` for `Invalid`.
    pub fn byte_size(self) -> Option<u32> {
        match self {
            DK::S8 | DK::U8 => Some(1),
            DK::S16 | DK::U16 => Some(2),
            DK::S32 | DK::U32 | DK::R32 | DK::A32 | DK::C32 => Some(4),
            DK::S64 | DK::U64 | DK::R64 | DK::A64 => Some(8),
            DK::Invalid => None,
        }
    }

    /// `true` for the two floating-point kinds.
    pub fn is_float(self) -> bool {
        matches!(self, DK::R32 | DK::R64)
    }

    /// Which physical register bank a value of this kind is assigned
    /// from: the two floating-point kinds go to the float bank,
    /// everything else (including addresses) to the integer bank.
    pub fn bank(self) -> RegBankKind {
        if self.is_float() {
            RegBankKind::Float
        } else {
            RegBankKind::Integer
        }
    }
}

impl fmt::Display for DK {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DK::S8 => "S8",
            DK::S16 => "S16",
            DK::S32 => "S32",
            DK::S64 => "S64",
            DK::U8 => "U8",
            DK::U16 => "U16",
            DK::U32 => "U32",
            DK::U64 => "U64",
            DK::R32 => "R32",
            DK::R64 => "R64",
            DK::A32 => "A32",
            DK::A64 => "A64",
            DK::C32 => "C32",
            DK::Invalid => "INVALID",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for DK {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "S8" => DK::S8,
            "S16" => DK::S16,
            "S32" => DK::S32,
            "S64" => DK::S64,
            "U8" => DK::U8,
            "U16" => DK::U16,
            "U32" => DK::U32,
            "U64" => DK::U64,
            "R32" => DK::R32,
            "R64" => DK::R64,
            "A32" => DK::A32,
            "A64" => DK::A64,
            "C32" => DK::C32,
            _ => return Err(()),
        })
    }
}
