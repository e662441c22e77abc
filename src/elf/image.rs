//! A thin reader over an ELF file's section, program, and symbol-table
//! headers. Byte-level ELF parsing is a non-goal (`spec.md` §1); this is
//! only the read path the orchestrator and `Disassembler` implementations
//! need, grounded on the `xmas_elf` crate the way
//! `examples/other_examples/7ea0b0f6_theseus-os-Theseus__applications-loadc-src-lib.rs.rs`
//! uses it.

use xmas_elf::header;
use xmas_elf::sections::{SectionData, ShType};
use xmas_elf::symbol_table::Entry;
use xmas_elf::ElfFile;

use crate::elf::symbol::{RelocEntry, RelocList, Symbol, SymbolList};
use crate::error::RewriterError;

/// An ELF file's bytes plus the parsed view over them.
pub struct ElfImage<'a> {
    bytes: &'a [u8],
    file: ElfFile<'a>,
}

impl<'a> ElfImage<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, RewriterError> {
        let file = ElfFile::new(bytes)
            .map_err(|e| RewriterError::MalformedInput(e.to_string()))?;
        Ok(ElfImage { bytes, file })
    }

    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn inner(&self) -> &ElfFile<'a> {
        &self.file
    }

    pub fn entry_point(&self) -> u64 {
        self.file.header.pt2.entry_point()
    }

    /// Whether this image carries dynamic-linking metadata, per
    /// `ElfSpace::buildDataStructures`'s `elf->isDynamic()` check, which
    /// gates whether a dynamic symbol table is also built.
    pub fn is_dynamic(&self) -> bool {
        self.file.header.pt2.type_().as_type() == header::Type::SharedObject
            || self
                .file
                .program_iter()
                .any(|p| p.get_type() == Ok(xmas_elf::program::Type::Dynamic))
    }

    /// Read `.symtab` (or `.dynsym` when `dynamic` is set) into a
    /// [`SymbolList`]. Mirrors `SymbolList::buildSymbolList` /
    /// `buildDynamicSymbolList` in `original_source`.
    pub fn read_symbols(&self, dynamic: bool) -> Result<SymbolList, RewriterError> {
        let section_name = if dynamic { ".dynsym" } else { ".symtab" };
        let Some(section) = self.file.find_section_by_name(section_name) else {
            return Ok(SymbolList::new(Vec::new()));
        };

        let data = section
            .get_data(&self.file)
            .map_err(|e| RewriterError::MalformedInput(e.to_string()))?;

        let mut symbols = Vec::new();
        match data {
            SectionData::SymbolTable64(entries) => {
                for entry in entries {
                    push_symbol(&self.file, entry, &mut symbols);
                }
            }
            SectionData::SymbolTable32(entries) => {
                for entry in entries {
                    push_symbol(&self.file, entry, &mut symbols);
                }
            }
            _ => {
                return Err(RewriterError::MalformedInput(format!(
                    "{section_name} is not a symbol table"
                )))
            }
        }
        Ok(SymbolList::new(symbols))
    }

    /// Read every `.rela.*`/`.rel.*` section into one [`RelocList`], per
    /// `spec.md` §4.E step 6 ("build relocation list"). Mirrors the
    /// `SHT_RELA` walk in
    /// `examples/other_examples/7ea0b0f6_theseus-os-Theseus__applications-loadc-src-lib.rs.rs`'s
    /// `overwrite_relocations`: each entry's symbol-table index is resolved
    /// against `.symtab` for a name, dropped (not erred) when the symbol
    /// can't be named, since `RelocEntry::symbol_name` is already `Option`.
    pub fn read_relocations(&self) -> Result<RelocList, RewriterError> {
        // Indexed by position against the raw symbol-table entries rather
        // than through `Symbol`, since a relocation names a symtab slot, not
        // a function/data symbol specifically.
        let raw_symtab = self
            .file
            .find_section_by_name(".symtab")
            .map(|sec| sec.get_data(&self.file));

        let mut entries = Vec::new();
        for sec in self.file.section_iter() {
            let Ok(ty) = sec.get_type() else { continue };
            if ty != ShType::Rela && ty != ShType::Rel {
                continue;
            }
            let Ok(data) = sec.get_data(&self.file) else {
                continue;
            };
            match data {
                SectionData::Rela64(relocs) => {
                    for r in relocs {
                        let name = raw_symtab.as_ref().and_then(|d| {
                            symbol_name_at(d, r.get_symbol_table_index() as usize, &self.file)
                        });
                        entries.push(RelocEntry {
                            offset: r.get_offset(),
                            addend: r.get_addend() as i64,
                            symbol_name: name,
                        });
                    }
                }
                SectionData::Rela32(relocs) => {
                    for r in relocs {
                        let name = raw_symtab.as_ref().and_then(|d| {
                            symbol_name_at(d, r.get_symbol_table_index() as usize, &self.file)
                        });
                        entries.push(RelocEntry {
                            offset: r.get_offset() as u64,
                            addend: r.get_addend() as i64,
                            symbol_name: name,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(RelocList::new(entries))
    }

    /// Section names and bounds for every `SHT_PROGBITS`/`SHT_NOBITS`
    /// section, used to seed `DataRegion` chunks (`spec.md` §4.E step 7).
    pub fn data_sections(&self) -> impl Iterator<Item = (&'a str, u64, &'a [u8])> + '_ {
        self.file.section_iter().filter_map(move |sec| {
            let ty = sec.get_type().ok()?;
            if !matches!(ty, ShType::ProgBits | ShType::NoBits) {
                return None;
            }
            let name = sec.get_name(&self.file).ok()?;
            let bytes = sec.raw_data(&self.file);
            Some((name, sec.address(), bytes))
        })
    }
}

fn symbol_name_at<'a>(
    data: &Result<SectionData<'a>, &'static str>,
    index: usize,
    file: &ElfFile<'a>,
) -> Option<String> {
    match data {
        Ok(SectionData::SymbolTable64(entries)) => {
            entries.get(index).and_then(|e| e.get_name(file).ok()).map(String::from)
        }
        Ok(SectionData::SymbolTable32(entries)) => {
            entries.get(index).and_then(|e| e.get_name(file).ok()).map(String::from)
        }
        _ => None,
    }
}

fn push_symbol<'a, E: Entry>(file: &ElfFile<'a>, entry: &E, out: &mut Vec<Symbol>) {
    let Ok(name) = entry.get_name(file) else {
        return;
    };
    if name.is_empty() {
        return;
    }
    let is_function = entry
        .get_type()
        .map(|t| t == xmas_elf::symbol_table::Type::Func)
        .unwrap_or(false);
    out.push(Symbol {
        name: name.to_string(),
        address: entry.value(),
        size: entry.size(),
        is_function,
    });
}
