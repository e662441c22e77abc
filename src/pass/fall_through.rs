//! Pass 1: fall-through linking between adjacent blocks (`spec.md` §4.D
//! item 1), grounded on `FallThroughFunctionPass` in
//! `original_source/src/elf/elfspace.cpp`, the first pass the orchestrator
//! runs right after disassembly.
//!
//! Detecting whether a block's last instruction actually falls through
//! (versus ending in an unconditional jump) is disassembler-internal
//! territory this crate doesn't implement; adjacency in a Function's child
//! list is taken as the fall-through signal, which is exactly right for the
//! linear disassembler this crate ships and a conservative starting point
//! for any real one.

use crate::chunk::{Arena, ChunkId, Visitor};
use crate::pass::Pass;

#[derive(Default)]
pub struct FallThroughPass;

impl Visitor for FallThroughPass {
    fn visit_function(&mut self, arena: &mut Arena, id: ChunkId) {
        let blocks = arena.children(id).to_vec();
        for pair in blocks.windows(2) {
            let (block, next) = (pair[0], pair[1]);
            if let Some(data) = arena.kind_mut(block).as_block_mut() {
                data.fall_through = Some(next);
            }
        }
    }
}

impl Pass for FallThroughPass {
    fn name(&self) -> &'static str {
        "fall-through linking"
    }
}
