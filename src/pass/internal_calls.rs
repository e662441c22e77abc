//! Pass 2: internal-call resolution — intra-module branches/calls whose
//! literal target lands on another instruction in the same module become
//! typed [`crate::chunk::ReferenceKind::InternalCall`] references. Grounded
//! on `InternalCalls` in `original_source/src/elf/elfspace.cpp`, run
//! immediately after the fall-through pass, before the relocation list even
//! exists.

use std::collections::HashMap;

use crate::chunk::{Arena, ChunkId, ReferenceKind, Visitor};
use crate::pass::{index_instructions, Pass};

pub struct InternalCallsPass {
    targets: HashMap<u64, ChunkId>,
}

impl InternalCallsPass {
    pub fn new(arena: &Arena, module: ChunkId) -> Self {
        InternalCallsPass {
            targets: index_instructions(arena, module),
        }
    }
}

impl Visitor for InternalCallsPass {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        let Some(semantic) = arena.semantic_mut(id) else {
            return;
        };
        let Some(reference) = semantic.reference_mut() else {
            return;
        };
        if reference.is_resolved() {
            return;
        }
        if let Some(&target) = self.targets.get(&reference.literal) {
            if target != id {
                reference.resolve(ReferenceKind::InternalCall, target);
            }
        }
    }
}

impl Pass for InternalCallsPass {
    fn name(&self) -> &'static str {
        "internal-call resolution"
    }
}
