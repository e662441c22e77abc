//! Pass 3: relocation handling — consult the relocation list built in
//! `spec.md` §4.E step 6 and resolve any instruction whose byte range
//! contains a relocation's offset against the symbol it names. Grounded on
//! `HandleRelocsPass` in `original_source/src/elf/elfspace.cpp`, which runs
//! right after `RelocList::buildRelocList`/`DataRegionList`/`PLTList` are
//! built and before the external-calls pass.
//!
//! The symbol table, not the module's own `function_alias_map`, is the
//! source of truth for a relocation's target address: step 9 (the alias
//! map) only runs *after* this pass, per the fixed nine-step order, so
//! resolving by name against it here would find nothing. Instead this pass
//! resolves the way `pc_relative`/`infer_links`/`internal_calls` already
//! do — by address — starting from the symbol table entry the relocation
//! names.

use std::collections::HashMap;

use crate::chunk::{Arena, ChunkId, ReferenceKind, Visitor};
use crate::elf::symbol::{RelocList, SymbolList};
use crate::pass::{data_region_ranges, Pass};

pub struct HandleRelocsPass<'a> {
    relocs: &'a RelocList,
    symbols: &'a SymbolList,
    functions: HashMap<u64, ChunkId>,
    data_regions: Vec<(u64, u64, ChunkId)>,
}

impl<'a> HandleRelocsPass<'a> {
    pub fn new(arena: &Arena, module: ChunkId, relocs: &'a RelocList, symbols: &'a SymbolList) -> Self {
        let functions = arena
            .children(module)
            .iter()
            .map(|&id| (arena.address(id), id))
            .collect();
        HandleRelocsPass {
            relocs,
            symbols,
            functions,
            data_regions: data_region_ranges(arena, module),
        }
    }

    fn resolve_address(&self, address: u64) -> Option<ChunkId> {
        if let Some(&id) = self.functions.get(&address) {
            return Some(id);
        }
        self.data_regions
            .iter()
            .find(|(start, end, _)| address >= *start && address < *end)
            .map(|&(_, _, id)| id)
    }
}

impl Visitor for HandleRelocsPass<'_> {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        let address = arena.address(id);
        let size = arena.size(id) as u64;
        let Some(entry) = (address..address + size).find_map(|off| self.relocs.find_by_offset(off))
        else {
            return;
        };
        let Some(symbol_name) = &entry.symbol_name else {
            return;
        };
        let Some(symbol) = self.symbols.find_by_name(symbol_name) else {
            log::warn!("relocation at 0x{address:x} names unknown symbol {symbol_name}");
            return;
        };
        let Some(target) = self.resolve_address(symbol.address) else {
            log::warn!("relocation at 0x{address:x} names symbol {symbol_name} with no matching chunk");
            return;
        };
        if let Some(reference) = arena.semantic_mut(id).and_then(|s| s.reference_mut()) {
            reference.resolve(ReferenceKind::Relocation, target);
        }
    }
}

impl Pass for HandleRelocsPass<'_> {
    fn name(&self) -> &'static str {
        "relocation handling"
    }
}
