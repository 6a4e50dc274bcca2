//! ELF object-file entities: sections, segments, symbols, relocations.
//!
//! These are the in-memory accumulation targets the assembler parser
//! (`elf::assembler`) fills in and `elf::writer::ElfWriter` lays out and
//! serializes. Kept deliberately close to the real ELF64 vocabulary
//! (section/segment/symbol/relocation) rather than a home-grown
//! abstraction, since the writer has to produce bytes a real loader
//! accepts.

/// Index into a unit's section table.
pub type SectionId = usize;
/// Index into a unit's symbol table.
pub type SymbolId = usize;

/// What a section holds, which decides which segment it lands in and
/// whether it occupies space in the file at all.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SectionKind {
    /// Executable code (`.text`).
    Text,
    /// Read-only initialized data (`.rodata`).
    Rodata,
    /// Read-write initialized data (`.data`).
    Data,
    /// Read-write zero-initialized data (`.bss`); `data` holds the
    /// *declared* size as a run of zero bytes, not file-backed content —
    /// the writer still emits them verbatim (this crate does not do the
    /// NOBITS file-size optimization real linkers use).
    Bss,
    /// `.symtab`.
    SymTab,
    /// `.strtab`.
    StrTab,
    /// `.shstrtab`.
    ShStrTab,
}

impl SectionKind {
    /// The conventional section name for a directive-driven kind
    /// (`.symtab`/`.strtab`/`.shstrtab` always use these fixed names;
    /// `.text`/`.rodata`/`.data`/`.bss` are likewise fixed since the
    /// assembler unit doesn't support user-named sections).
    pub fn elf_name(self) -> &'static str {
        match self {
            SectionKind::Text => ".text",
            SectionKind::Rodata => ".rodata",
            SectionKind::Data => ".data",
            SectionKind::Bss => ".bss",
            SectionKind::SymTab => ".symtab",
            SectionKind::StrTab => ".strtab",
            SectionKind::ShStrTab => ".shstrtab",
        }
    }
}

/// One output section: a contiguous byte buffer with a kind and
/// alignment, plus the virtual address and file offset layout assigns.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub align: u64,
    pub data: Vec<u8>,
    /// Virtual address, assigned by `ElfWriter::layout`.
    pub addr: u64,
    /// File offset, assigned by `ElfWriter::layout`.
    pub offset: u64,
}

impl Section {
    /// Create an empty section of the given kind, aligned to `align`
    /// bytes (must be a power of two).
    pub fn new(kind: SectionKind, align: u64) -> Self {
        Section {
            name: kind.elf_name().to_string(),
            kind,
            align,
            data: Vec::new(),
            addr: 0,
            offset: 0,
        }
    }

    /// Current length of the section's contents.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// `true` if the section has no contents yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The section's current write position, for symbol/relocation
    /// offsets recorded while the assembler is still appending.
    pub fn cursor(&self) -> u64 {
        self.len()
    }
}

/// Which of the ≤4 segments §6 allows a section lands in.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SegmentKind {
    /// Executable, read-only: `.text`.
    Exec,
    /// Read-only data: `.rodata`.
    ReadOnly,
    /// Read-write data: `.data`, `.bss`.
    ReadWrite,
    /// Not loaded at runtime: `.symtab`/`.strtab`/`.shstrtab`.
    Pseudo,
}

impl SegmentKind {
    /// `true` for the three kinds that become an ELF `PT_LOAD` program
    /// header; `Pseudo` sections are written to the file but never
    /// mapped.
    pub fn is_loaded(self) -> bool {
        self != SegmentKind::Pseudo
    }
}

/// A group of sections placed contiguously at layout time.
#[derive(Clone, Debug, Default)]
pub struct Segment {
    pub sections: Vec<SectionId>,
    pub addr: u64,
    pub offset: u64,
    pub file_size: u64,
    pub mem_size: u64,
}

/// Visibility of a symbol outside the unit that defines it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SymbolScope {
    /// Visible only within this assembler unit.
    Local,
    /// Visible to relocations from any unit (and, for `_start`, to the
    /// ELF header's entry point).
    Global,
}

/// A named position: a function, basic block, or memory object.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    /// `None` for an as-yet-unresolved forward reference.
    pub section: Option<SectionId>,
    pub offset: u64,
    pub scope: SymbolScope,
}

/// A pending fixup: the bytes at `(section, offset)` must be patched
/// with `symbol`'s resolved address (plus `addend`) once layout assigns
/// every section a virtual address.
#[derive(Clone, Debug)]
pub struct Reloc {
    pub section: SectionId,
    pub offset: u64,
    pub symbol: SymbolId,
    pub addend: i64,
    pub kind: crate::elf::reloc::RelocType,
}
