//! The assembler's accumulation target.
//!
//! The object built up while parsing: four fixed sections (`.text`, `.rodata`,
//! `.data`, `.bss`), a symbol table keyed by name, and a pending
//! relocation list. `elf::parser::parse` is the only writer; `elf::writer::link_and_write`
//! is the only reader.

use std::collections::BTreeMap;

use crate::elf::entities::{Reloc, Section, SectionId, SectionKind, Symbol, SymbolId, SymbolScope};
use crate::elf::reloc::RelocType;
use crate::isa::Isa;
use crate::result::{CodegenError, CodegenResult};

/// Fixed section-table index of `.text`.
pub const SEC_TEXT: SectionId = 0;
/// Fixed section-table index of `.rodata`.
pub const SEC_RODATA: SectionId = 1;
/// Fixed section-table index of `.data`.
pub const SEC_DATA: SectionId = 2;
/// Fixed section-table index of `.bss`.
pub const SEC_BSS: SectionId = 3;

/// Which directive-delimited region the parser is currently inside,
/// between a `.fun`/`.mem`/`.localmem` and its matching `.end*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Fun,
    Mem { section: SectionId, base_offset: u64 },
}

/// One assembler unit's worth of accumulated sections, symbols, and
/// relocations, for a single target ISA.
pub struct AssemblerUnit {
    isa: Isa,
    sections: [Section; 4],
    symbols: Vec<Symbol>,
    symbol_by_name: BTreeMap<String, SymbolId>,
    relocs: Vec<Reloc>,
    region: Option<Region>,
}

impl AssemblerUnit {
    /// Create an empty unit targeting `isa`.
    pub fn new(isa: Isa) -> Self {
        AssemblerUnit {
            isa,
            sections: [
                Section::new(SectionKind::Text, 4),
                Section::new(SectionKind::Rodata, 8),
                Section::new(SectionKind::Data, 8),
                Section::new(SectionKind::Bss, 8),
            ],
            symbols: Vec::new(),
            symbol_by_name: BTreeMap::new(),
            relocs: Vec::new(),
            region: None,
        }
    }

    /// The unit's target ISA.
    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// Read-only access to a fixed section by its `SEC_*` index.
    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id]
    }

    fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id]
    }

    /// All four fixed sections, `.text`/`.rodata`/`.data`/`.bss` in
    /// that order, for the writer to lay out.
    pub fn sections(&self) -> &[Section; 4] {
        &self.sections
    }

    /// The accumulated symbol table, in definition order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The accumulated, not-yet-patched relocation list.
    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    /// Look up a symbol's id by name, whether or not it has been
    /// defined yet.
    pub fn symbol_id(&self, name: &str) -> Option<SymbolId> {
        self.symbol_by_name.get(name).copied()
    }

    /// Find a symbol by name, or add an as-yet-undefined forward
    /// reference for it.
    pub fn find_or_add_symbol(&mut self, name: &str, local: bool) -> SymbolId {
        if let Some(&id) = self.symbol_by_name.get(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            section: None,
            offset: 0,
            scope: if local { SymbolScope::Local } else { SymbolScope::Global },
        });
        self.symbol_by_name.insert(name.to_string(), id);
        id
    }

    /// Bind a symbol to a concrete `(section, offset)`. Fails if the
    /// name was already defined: name collisions are a
    /// structural error.
    pub fn define_symbol(
        &mut self,
        name: &str,
        section: SectionId,
        offset: u64,
        local: bool,
    ) -> CodegenResult<SymbolId> {
        let id = self.find_or_add_symbol(name, local);
        if self.symbols[id].section.is_some() {
            return Err(CodegenError::DuplicateSymbol(name.to_string()));
        }
        let sym = &mut self.symbols[id];
        sym.section = Some(section);
        sym.offset = offset;
        sym.scope = if local { SymbolScope::Local } else { SymbolScope::Global };
        Ok(id)
    }

    /// Pad `section`'s contents up to the next `align`-byte boundary,
    /// filling the gap with `pad_byte` repeated (a no-op opcode word
    /// for `.text`, zero for data sections).
    pub fn pad_to_align(&mut self, id: SectionId, align: u64, pad: &[u8]) {
        if align <= 1 || pad.is_empty() {
            return;
        }
        let sec = self.section_mut(id);
        while sec.cursor() % align != 0 {
            sec.data.extend_from_slice(pad);
        }
    }

    /// `.fun name align`: pad `.text` to `align`, define `name` at the
    /// resulting cursor, and enter the `Fun` region.
    pub fn fun_start(&mut self, name: &str, align: u64, nop: &[u8]) -> CodegenResult<()> {
        self.pad_to_align(SEC_TEXT, align, nop);
        let off = self.section(SEC_TEXT).cursor();
        self.define_symbol(name, SEC_TEXT, off, false)?;
        self.region = Some(Region::Fun);
        Ok(())
    }

    /// `.endfun`: close the `Fun` region opened by `fun_start`.
    pub fn fun_end(&mut self) -> CodegenResult<()> {
        match self.region.take() {
            Some(Region::Fun) => Ok(()),
            _ => Err(CodegenError::Contract(".endfun without a matching .fun")),
        }
    }

    /// `.bbl name align`: a label within the current function, same
    /// alignment/definition mechanics as `fun_start` but without
    /// opening a region (blocks nest inside the enclosing `.fun`).
    pub fn bbl_label(&mut self, name: &str, align: u64, nop: &[u8]) -> CodegenResult<()> {
        self.pad_to_align(SEC_TEXT, align, nop);
        let off = self.section(SEC_TEXT).cursor();
        self.define_symbol(name, SEC_TEXT, off, false)?;
        Ok(())
    }

    /// `.mem`/`.localmem name align RW?`: pad the target data section
    /// to `align`, define `name` at the resulting cursor, and enter the
    /// `Mem` region subsequent `.data`/`.addr.*` directives target.
    pub fn mem_start(&mut self, name: &str, align: u64, rw: bool, local: bool) -> CodegenResult<()> {
        let sec_id = if rw { SEC_DATA } else { SEC_RODATA };
        self.pad_to_align(sec_id, align, &[0]);
        let off = self.section(sec_id).cursor();
        self.define_symbol(name, sec_id, off, local)?;
        self.region = Some(Region::Mem { section: sec_id, base_offset: off });
        Ok(())
    }

    /// `.endmem`: close the `Mem` region opened by `mem_start`.
    pub fn mem_end(&mut self) -> CodegenResult<()> {
        match self.region.take() {
            Some(Region::Mem { .. }) => Ok(()),
            _ => Err(CodegenError::Contract(".endmem without a matching .mem/.localmem")),
        }
    }

    fn current_mem(&self) -> CodegenResult<(SectionId, u64)> {
        match self.region {
            Some(Region::Mem { section, base_offset }) => Ok((section, base_offset)),
            _ => Err(CodegenError::Contract("directive requires an open .mem/.localmem region")),
        }
    }

    /// `.data size bytes`: append `bytes`, padded or truncated to
    /// `size`, to the currently open memory object.
    pub fn add_data(&mut self, size: usize, mut bytes: Vec<u8>) -> CodegenResult<()> {
        let (sec_id, _) = self.current_mem()?;
        bytes.resize(size, 0);
        self.section_mut(sec_id).data.extend(bytes);
        Ok(())
    }

    /// `.addr.fun`/`.addr.bbl`/`.addr.mem offset name [addend]`: record
    /// a pending relocation at `base_offset(region) + offset` pointing
    /// at `name`, patched to an absolute address once layout assigns
    /// addresses.
    pub fn add_addr(&mut self, offset: u64, target: &str, addend: i64, kind: RelocType) -> CodegenResult<()> {
        let (sec_id, base) = self.current_mem()?;
        let sym = self.find_or_add_symbol(target, false);
        self.relocs.push(Reloc {
            section: sec_id,
            offset: base + offset,
            symbol: sym,
            addend,
            kind,
        });
        Ok(())
    }

    /// Append `bytes` (one assembled instruction) to `.text`, returning
    /// the byte offset it was written at.
    pub fn emit_instruction(&mut self, bytes: &[u8]) -> u64 {
        let off = self.section(SEC_TEXT).cursor();
        self.section_mut(SEC_TEXT).data.extend_from_slice(bytes);
        off
    }

    /// Record a relocation directly at `(section, offset)`, for an
    /// instruction operand that named a symbol instead of an immediate,
    /// tagged with the target ISA's relocation type.
    pub fn add_reloc_at(&mut self, section: SectionId, offset: u64, target: &str, kind: RelocType) {
        let sym = self.find_or_add_symbol(target, false);
        self.relocs.push(Reloc {
            section,
            offset,
            symbol: sym,
            addend: 0,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fun_start_pads_and_defines_symbol() {
        let mut unit = AssemblerUnit::new(Isa::Aarch64);
        unit.emit_instruction(&[1, 2]);
        unit.fun_start("f", 4, &[0, 0, 0, 0]).unwrap();
        assert_eq!(unit.section(SEC_TEXT).cursor(), 4);
        let id = unit.symbol_id("f").unwrap();
        assert_eq!(unit.symbols()[id].offset, 4);
        unit.fun_end().unwrap();
    }

    #[test]
    fn endfun_without_fun_is_contract_violation() {
        let mut unit = AssemblerUnit::new(Isa::X86_64);
        assert!(unit.fun_end().is_err());
    }

    #[test]
    fn duplicate_symbol_definition_is_rejected() {
        let mut unit = AssemblerUnit::new(Isa::X86_64);
        unit.define_symbol("f", SEC_TEXT, 0, false).unwrap();
        assert!(unit.define_symbol("f", SEC_TEXT, 4, false).is_err());
    }

    #[test]
    fn data_outside_mem_region_is_rejected() {
        let mut unit = AssemblerUnit::new(Isa::Aarch32);
        assert!(unit.add_data(4, vec![1, 2, 3, 4]).is_err());
    }

    #[test]
    fn mem_roundtrip_writes_into_rodata() {
        let mut unit = AssemblerUnit::new(Isa::Aarch64);
        unit.mem_start("msg", 8, false, false).unwrap();
        unit.add_data(4, vec![b'a', b'b', b'c', 0]).unwrap();
        unit.mem_end().unwrap();
        assert_eq!(unit.section(SEC_RODATA).data, vec![b'a', b'b', b'c', 0]);
    }
}
