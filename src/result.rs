//! Crate-wide error type.
//!
//! Errors fall into three classes: structural errors detected while
//! parsing or loading opcode
//! tables, contract violations (an operation invoked with a missing
//! precondition flag), and recoverable reporting (surfaced through
//! [`crate::print_errors::Diagnostics`] instead of this type, since those
//! don't abort the unit being processed).

use core::fmt;

/// Any error this crate's public API can return.
#[derive(Debug, Fail)]
pub enum CodegenError {
    /// A parse error in the IR or assembly textual form, with the
    /// 1-based source line number it was detected on.
    #[fail(display = "line {}: {}", line, msg)]
    Parse {
        /// 1-based source line number.
        line: usize,
        /// Human-readable description.
        msg: String,
    },

    /// An opcode mnemonic with no matching table entry.
    #[fail(display = "unknown opcode `{}`", _0)]
    UnknownOpcode(String),

    /// A symbol referenced but never defined.
    #[fail(display = "unresolved symbol `{}`", _0)]
    UnresolvedSymbol(String),

    /// No `_start` symbol was defined; the ELF writer requires one.
    #[fail(display = "missing `_start` symbol")]
    MissingStart,

    /// Two opcode table entries share a (mask, data) discriminant.
    #[fail(display = "ambiguous opcode encoding: {} and {} overlap", _0, _1)]
    AmbiguousOpcode(String, String),

    /// An instruction needs a high-byte x86-64 register operand but no
    /// REX prefix is present to disambiguate it from the legacy
    /// high-byte registers (AH/CH/DH/BH).
    #[fail(display = "high register `{}` requires a REX prefix", _0)]
    MissingRex(String),

    /// An internal invariant was violated: an operation was invoked
    /// without a precondition flag, or a live range was finalized without
    /// a matching open record, or similar.
    #[fail(display = "contract violation: {}", _0)]
    Contract(&'static str),

    /// A symbol was redefined.
    #[fail(display = "duplicate symbol `{}`", _0)]
    DuplicateSymbol(String),
}

impl CodegenError {
    /// Build a `Parse` error without boilerplate at call sites.
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        CodegenError::Parse {
            line,
            msg: msg.into(),
        }
    }
}

/// Shorthand for the result type every fallible public operation returns.
pub type CodegenResult<T> = Result<T, CodegenError>;

impl fmt::Display for crate::print_errors::Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
