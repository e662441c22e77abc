//! Pass 6: the inferred-link heuristic — a last-resort pass over whatever
//! is still `Unresolved` after internal calls, relocations, external calls,
//! and PC-relative rewriting have each had a turn. Grounded on
//! `InferLinksPass` in `original_source/src/elf/elfspace.cpp`: it matches
//! the raw literal against every known chunk address (instructions, data
//! regions, PLT trampolines) rather than one specific category, which is
//! what makes it a heuristic rather than a resolver with a precise
//! contract. Anything it still can't place is left as a literal and logged,
//! per `spec.md` §7's analysis-failure handling.

use std::collections::HashMap;

use crate::chunk::{Arena, ChunkId, ReferenceKind, Visitor};
use crate::pass::{data_region_ranges, index_instructions, index_plt, Pass};

pub struct InferLinksPass {
    by_address: HashMap<u64, ChunkId>,
    data_regions: Vec<(u64, u64, ChunkId)>,
}

impl InferLinksPass {
    pub fn new(arena: &Arena, module: ChunkId) -> Self {
        let mut by_address = index_instructions(arena, module);
        by_address.extend(index_plt(arena, module));
        InferLinksPass {
            by_address,
            data_regions: data_region_ranges(arena, module),
        }
    }
}

impl Visitor for InferLinksPass {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        let address = arena.address(id);
        let Some(reference) = arena.semantic_mut(id).and_then(|s| s.reference_mut()) else {
            return;
        };
        if reference.is_resolved() {
            return;
        }
        let literal = reference.literal;
        if let Some(&target) = self.by_address.get(&literal) {
            reference.resolve(ReferenceKind::InferredLink, target);
            return;
        }
        if let Some(&(_, _, target)) = self
            .data_regions
            .iter()
            .find(|(start, end, _)| literal >= *start && literal < *end)
        {
            reference.resolve(ReferenceKind::InferredLink, target);
            return;
        }
        log::warn!("could not resolve reference 0x{literal:x} from instruction at 0x{address:x}");
    }
}

impl Pass for InferLinksPass {
    fn name(&self) -> &'static str {
        "inferred-link heuristic"
    }
}
