//! Per-ISA relocation type enumerations, mirroring the standard ELF
//! relocation constants for ARM, AArch64, and x86-64.
//!
//! The AArch64 variants and their patch math generalize to
//! AArch32/x86-64 through the analogous standard relocation shapes each
//! ISA defines.

use crate::isa::Isa;

/// A relocation kind: which ISA it belongs to and how the writer
/// patches it into place once every section has a final address.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RelocType {
    /// AArch64 `ADR_PREL_PG_HI21`: page-aligned PC-relative high bits,
    /// patched into an `adrp`-shaped word's split immhi/immlo fields.
    Aarch64AdrPrelPgHi21,
    /// AArch64 `ADD_ABS_LO12_NC`: low 12 bits of an absolute address,
    /// patched into an `add_x_imm`-shaped word's 12-bit immediate.
    Aarch64AddAbsLo12Nc,
    /// AArch64 `CONDBR19`: 19-bit, word-scaled conditional/`cbz`/`cbnz`
    /// branch offset.
    Aarch64CondBr19,
    /// AArch64 `JUMP26`: 26-bit, word-scaled unconditional branch
    /// offset (`b`).
    Aarch64Jump26,
    /// AArch64 `CALL26`: 26-bit, word-scaled call offset (`bl`).
    Aarch64Call26,
    /// A plain 32-bit absolute address, written verbatim (data
    /// relocations: `.addr.fun`/`.addr.bbl`/`.addr.mem`).
    Abs32,
    /// A plain 64-bit absolute address, written verbatim.
    Abs64,
    /// AArch32 24-bit, word-scaled unconditional branch offset (`b`).
    Arm32Jump24,
    /// AArch32 24-bit, word-scaled call offset (`bl`).
    Arm32Call24,
    /// x86-64 32-bit PC-relative displacement, relative to the byte
    /// immediately following the patched field (`call`/`jmp rel32`).
    X86Pc32,
}

impl RelocType {
    /// Which ISA produces and consumes this relocation kind.
    pub fn isa(self) -> Isa {
        match self {
            RelocType::Aarch64AdrPrelPgHi21
            | RelocType::Aarch64AddAbsLo12Nc
            | RelocType::Aarch64CondBr19
            | RelocType::Aarch64Jump26
            | RelocType::Aarch64Call26 => Isa::Aarch64,
            RelocType::Arm32Jump24 | RelocType::Arm32Call24 => Isa::Aarch32,
            RelocType::X86Pc32 => Isa::X86_64,
            // ABS32/ABS64 are shared across ISAs (data relocations);
            // the producing ISA doesn't change how they patch.
            RelocType::Abs32 | RelocType::Abs64 => Isa::X86_64,
        }
    }

    /// Width, in bytes, of the field this relocation overwrites.
    pub fn patch_width(self) -> usize {
        match self {
            RelocType::Abs64 => 8,
            _ => 4,
        }
    }

    /// `true` for the two data relocations that write a raw address
    /// rather than patching bits of an instruction word.
    pub fn is_plain_absolute(self) -> bool {
        matches!(self, RelocType::Abs32 | RelocType::Abs64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs64_is_eight_bytes() {
        assert_eq!(RelocType::Abs64.patch_width(), 8);
        assert_eq!(RelocType::Abs32.patch_width(), 4);
        assert_eq!(RelocType::Aarch64Jump26.patch_width(), 4);
    }

    #[test]
    fn instruction_relocations_are_isa_specific() {
        assert_eq!(RelocType::Aarch64Call26.isa(), Isa::Aarch64);
        assert_eq!(RelocType::Arm32Call24.isa(), Isa::Aarch32);
        assert_eq!(RelocType::X86Pc32.isa(), Isa::X86_64);
    }
}
