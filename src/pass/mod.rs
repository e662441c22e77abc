/*! Analysis passes: visitors over the chunk tree that convert raw address
literals in instruction semantics into typed [`crate::chunk::Reference`]s to
other chunks, per `spec.md` §4.D. The orchestrator (`crate::elf::orchestrator`)
drives them serially, in the fixed order spec.md lists:

1. [`fall_through::FallThroughPass`]
2. [`internal_calls::InternalCallsPass`]
3. [`handle_relocs::HandleRelocsPass`]
4. [`external_calls::ExternalCallsPass`]
5. [`pc_relative::PcRelativePass`]
6. [`infer_links::InferLinksPass`]
7. [`reloc_check::RelocCheckPass`]
8. [`jump_table::JumpTableDetectPass`], [`jump_table::JumpTableBoundsPass`],
   [`jump_table::JumpTableOverestimatePass`] (spec.md bundles these three
   C++ passes — `JumpTablePass`, `JumpTableBounds`, `JumpTableOverestimate`
   in `original_source/src/elf/elfspace.cpp` — into one list item).

A pass that cannot resolve a reference logs a warning and leaves it as a
literal (`spec.md` §7's analysis-failure kind); nothing here returns
`RewriterError`.
*/

pub mod external_calls;
pub mod fall_through;
pub mod handle_relocs;
pub mod infer_links;
pub mod internal_calls;
pub mod jump_table;
pub mod pc_relative;
pub mod reloc_check;

use std::collections::HashMap;

use crate::chunk::{Arena, ChunkId, Visitor};

/// Supplemented over the bare `Visitor` interface so the orchestrator can
/// log a human-readable stage name before running each pass, mirroring
/// `LOG(1, "=== ...")` in `original_source/src/elf/elfspace.cpp`.
pub trait Pass: Visitor {
    fn name(&self) -> &'static str;
}

/// Build an address → chunk index over every `Instruction` in `module`'s
/// functions, used by the passes that resolve intra-module address
/// literals. Built once per pass construction rather than per visit, since
/// the tree doesn't change shape between a pass's own visits.
pub(crate) fn index_instructions(arena: &Arena, module: ChunkId) -> HashMap<u64, ChunkId> {
    let mut index = HashMap::new();
    for &function in arena.children(module) {
        for &block in arena.children(function) {
            for &instr in arena.children(block) {
                index.insert(arena.address(instr), instr);
            }
        }
    }
    index
}

/// Address → chunk index over a module's PLT trampolines, used by
/// [`external_calls::ExternalCallsPass`].
pub(crate) fn index_plt(arena: &Arena, module: ChunkId) -> HashMap<u64, ChunkId> {
    arena
        .kind(module)
        .as_module()
        .map(|m| {
            m.plt_list
                .iter()
                .map(|&id| (arena.address(id), id))
                .collect()
        })
        .unwrap_or_default()
}

/// Address-range index over a module's data regions, used by
/// [`pc_relative::PcRelativePass`] and [`infer_links::InferLinksPass`].
/// Returns `(start, end, chunk)` triples rather than a `HashMap` since
/// lookups are by containment, not exact match.
pub(crate) fn data_region_ranges(arena: &Arena, module: ChunkId) -> Vec<(u64, u64, ChunkId)> {
    arena
        .kind(module)
        .as_module()
        .map(|m| {
            m.data_regions
                .iter()
                .filter_map(|&id| {
                    let data = arena.kind(id).as_data_region()?;
                    let start = arena.address(id);
                    Some((start, start + data.bytes.len() as u64, id))
                })
                .collect()
        })
        .unwrap_or_default()
}
