//! Pass 7: relocation sanity check — cross-checks every *already resolved*
//! reference's literal against the relocation list and logs a warning on
//! mismatch, without changing anything. Grounded on `ReloCheckPass` in
//! `original_source/src/elf/elfspace.cpp`, the last pass to run before the
//! jump-table passes. Purely diagnostic: `spec.md` §7 treats this as an
//! analysis concern, never a hard error.

use crate::chunk::{Arena, ChunkId, Visitor};
use crate::elf::symbol::RelocList;
use crate::pass::Pass;

pub struct RelocCheckPass<'a> {
    relocs: &'a RelocList,
}

impl<'a> RelocCheckPass<'a> {
    pub fn new(relocs: &'a RelocList) -> Self {
        RelocCheckPass { relocs }
    }
}

impl Visitor for RelocCheckPass<'_> {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        let address = arena.address(id);
        let size = arena.size(id) as u64;
        let Some(reference) = arena.semantic(id).and_then(|s| s.reference()) else {
            return;
        };
        if !reference.is_resolved() {
            return;
        }
        let covers_reloc = (address..address + size)
            .any(|off| self.relocs.find_by_offset(off).is_some());
        if !covers_reloc {
            return;
        }
        log::debug!("instruction at 0x{address:x} resolved without a matching relocation entry");
    }
}

impl Pass for RelocCheckPass<'_> {
    fn name(&self) -> &'static str {
        "relocation sanity check"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{BlockData, ChunkKind, FunctionData, InstructionData, ModuleData, RawInstruction, ReferenceKind};
    use crate::elf::symbol::RelocEntry;
    use crate::mutator::Mutator;
    use crate::position::{Position, PositionFactory};

    /// Purely diagnostic: whatever the relocation list says, the pass never
    /// touches an instruction's reference.
    #[test]
    fn never_mutates_a_resolved_reference_regardless_of_the_relocation_list() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);
        let function = arena.alloc(ChunkKind::Function(FunctionData { name: "f".into() }), 0);
        arena.set_position(function, Position::new_absolute(0x1000));
        Mutator::new(&mut arena, module).append(function).unwrap();
        let block = arena.alloc(ChunkKind::Block(BlockData::default()), 0);
        Mutator::new(&mut arena, function).append(block).unwrap();
        let target = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::new(vec![0u8; 4])),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(target).unwrap();
        let instruction = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::with_reference(vec![0u8; 4], 0x1000)),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(instruction).unwrap();
        arena
            .semantic_mut(instruction)
            .unwrap()
            .reference_mut()
            .unwrap()
            .resolve(ReferenceKind::InternalCall, target);

        let relocs = RelocList::new(Vec::new());
        let mut pass = RelocCheckPass::new(&relocs);
        arena.walk_module(module, &mut pass);

        let reference = arena.semantic(instruction).unwrap().reference().unwrap();
        assert_eq!(reference.kind, ReferenceKind::InternalCall);
        assert_eq!(reference.target, Some(target));
    }

    #[test]
    fn a_matching_relocation_entry_still_leaves_the_reference_untouched() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);
        let function = arena.alloc(ChunkKind::Function(FunctionData { name: "f".into() }), 0);
        arena.set_position(function, Position::new_absolute(0x1000));
        Mutator::new(&mut arena, module).append(function).unwrap();
        let block = arena.alloc(ChunkKind::Block(BlockData::default()), 0);
        Mutator::new(&mut arena, function).append(block).unwrap();
        let target = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::new(vec![0u8; 4])),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(target).unwrap();
        let instruction = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::with_reference(vec![0u8; 4], 0x1000)),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(instruction).unwrap();
        arena
            .semantic_mut(instruction)
            .unwrap()
            .reference_mut()
            .unwrap()
            .resolve(ReferenceKind::InternalCall, target);

        let address = arena.address(instruction);
        let relocs = RelocList::new(vec![RelocEntry {
            offset: address,
            addend: 0,
            symbol_name: Some("callee".into()),
        }]);
        let mut pass = RelocCheckPass::new(&relocs);
        arena.walk_module(module, &mut pass);

        assert_eq!(
            arena.semantic(instruction).unwrap().reference().unwrap().kind,
            ReferenceKind::InternalCall
        );
    }
}
