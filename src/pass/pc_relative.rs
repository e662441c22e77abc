//! Pass 5: PC-relative reference rewriting — an unresolved literal that
//! falls inside a data region's address range is a PC-relative load/store
//! target. Grounded on `PCRelativePass` in
//! `original_source/src/elf/elfspace.cpp`, which also consults the
//! relocation list directly for references the reloc pass already handled;
//! that overlap is why this pass only ever looks at references still
//! `Unresolved`.

use crate::chunk::{Arena, ChunkId, ReferenceKind, Visitor};
use crate::pass::{data_region_ranges, Pass};

pub struct PcRelativePass {
    data_regions: Vec<(u64, u64, ChunkId)>,
}

impl PcRelativePass {
    pub fn new(arena: &Arena, module: ChunkId) -> Self {
        PcRelativePass {
            data_regions: data_region_ranges(arena, module),
        }
    }
}

impl Visitor for PcRelativePass {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        let Some(reference) = arena.semantic_mut(id).and_then(|s| s.reference_mut()) else {
            return;
        };
        if reference.is_resolved() {
            return;
        }
        let literal = reference.literal;
        if let Some(&(_, _, target)) = self
            .data_regions
            .iter()
            .find(|(start, end, _)| literal >= *start && literal < *end)
        {
            reference.resolve(ReferenceKind::PcRelative, target);
        }
    }
}

impl Pass for PcRelativePass {
    fn name(&self) -> &'static str {
        "PC-relative rewriting"
    }
}
