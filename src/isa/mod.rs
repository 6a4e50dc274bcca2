//! Target instruction-set contract.
//!
//! Three concrete ISAs live under this module, each contributing an
//! opcode table and a register table: [`aarch32`], [`aarch64`], and
//! [`x86_64`]. Everything above this module — liveness, live-range
//! construction, register statistics, the ELF assembler — talks to
//! opcodes only through the [`OpcodeInfo`] contract, never through a
//! concrete per-ISA enum, so the same passes run unchanged over all
//! three.

pub mod aarch32;
pub mod aarch64;
pub mod encoding;
pub mod registers;
pub mod x86_64;

use crate::ir::instruction::Opcode;
use crate::ir::cfg::BranchKind;
use core::fmt;

/// Which concrete ISA a function or opcode table targets.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Isa {
    /// 32-bit ARM, A32 instruction encoding.
    Aarch32,
    /// 64-bit ARM.
    Aarch64,
    /// x86-64 / AMD64.
    X86_64,
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Isa::Aarch32 => "aarch32",
            Isa::Aarch64 => "aarch64",
            Isa::X86_64 => "x86_64",
        };
        f.write_str(s)
    }
}

impl core::str::FromStr for Isa {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aarch32" | "a32" => Ok(Isa::Aarch32),
            "aarch64" | "a64" => Ok(Isa::Aarch64),
            "x86_64" | "x64" | "amd64" => Ok(Isa::X86_64),
            _ => Err(()),
        }
    }
}

/// The calling-convention contract of a callee, as seen from a call
/// site by `regalloc::liveness` and `regalloc::live_range`.
#[derive(Copy, Clone, Debug)]
pub struct CalleeContract<'a> {
    /// Physical registers the callee requires to be live on entry.
    pub cpu_live_in: &'a [u16],
    /// Physical registers the callee guarantees are live with its
    /// result(s) at return.
    pub cpu_live_out: &'a [u16],
    /// Physical registers the callee may clobber freely.
    pub cpu_live_clobber: &'a [u16],
}

/// Opcode metadata needed by passes that don't care about bit-level
/// encoding: liveness, live-range construction, register statistics,
/// CFG construction.
///
/// Each per-ISA opcode table (`aarch32::opcodes::Table`,
/// `aarch64::opcodes::Table`, `x86_64::opcodes::Table`) implements this
/// once its const table is populated.
pub trait OpcodeInfo {
    /// How many of an instruction's leading operands are definitions
    /// (written) rather than uses (read).
    fn def_ops_count(&self, op: Opcode) -> usize;

    /// `true` if this opcode transfers control to a callee, returning
    /// to the next instruction.
    fn is_call(&self, op: Opcode) -> bool;

    /// `true` if this opcode returns from the enclosing function.
    fn is_return(&self, op: Opcode) -> bool;

    /// `true` if the instruction must be kept even when none of its
    /// defined registers are later read (stores, calls, traps, ...).
    fn has_side_effect(&self, op: Opcode) -> bool;

    /// How this opcode affects control flow, for `ir::cfg::compute`.
    fn branch_kind(&self, op: Opcode) -> BranchKind;

    /// The opcode's canonical mnemonic, for diagnostics and the
    /// textual assembler.
    fn mnemonic(&self, op: Opcode) -> &str;
}
