//! ELF object emission: entities, a per-ISA assembler unit, the
//! directive-driven textual parser, and the segment-layout writer.
//!
//! The pipeline is [`parser::parse`] → [`unit::AssemblerUnit`] →
//! [`writer::link_and_write`]: the parser reads the line-oriented
//! symbolic assembly stream (fixed directives plus per-ISA opcode
//! mnemonics) and fills in a unit's sections, symbols and relocations;
//! the writer resolves symbols, lays out segments, patches
//! relocations, and serializes a standard little-endian ELF64 image.

pub mod entities;
pub mod parser;
pub mod reloc;
pub mod unit;
pub mod writer;

pub use entities::{Reloc, Section, SectionId, SectionKind, Segment, SegmentKind, Symbol, SymbolId, SymbolScope};
pub use reloc::RelocType;
pub use unit::AssemblerUnit;
