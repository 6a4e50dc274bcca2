//! cwerg-codegen: backend code-generation pipeline.
//!
//! This crate implements the hard middle of a small native-code compiler
//! backend: a virtual-register IR, backward-dataflow liveness, per-block
//! live-range construction for spilling, register-usage statistics, three
//! ISA opcode tables (AArch32, AArch64, x86-64) with exact-round-trip
//! assemble/disassemble, and a relocation-aware ELF writer with a thin
//! per-ISA assembler unit on top.
//!
//! The surface-language parser, macro expander, type system and AST
//! pretty-printer are external collaborators; this crate only consumes
//! the line-oriented IR textual form described in `elf::assembler`.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

#[macro_use]
extern crate failure_derive;

pub use crate::result::{CodegenError, CodegenResult};

pub mod elf;
pub mod ir;
pub mod isa;
pub mod print_errors;
pub mod regalloc;
mod result;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
