//! Pass 4: external-call resolution through the PLT — an unresolved
//! reference whose literal matches a `PltTrampoline`'s address becomes an
//! `ExternalCall`. Grounded on `ExternalCalls` in
//! `original_source/src/elf/elfspace.cpp`, which only runs `if
//! module->getPLTList()` is non-empty; mirrored here by simply having an
//! empty index produce no resolutions.

use std::collections::HashMap;

use crate::chunk::{Arena, ChunkId, ReferenceKind, Visitor};
use crate::pass::{index_plt, Pass};

pub struct ExternalCallsPass {
    plt: HashMap<u64, ChunkId>,
}

impl ExternalCallsPass {
    pub fn new(arena: &Arena, module: ChunkId) -> Self {
        ExternalCallsPass {
            plt: index_plt(arena, module),
        }
    }
}

impl Visitor for ExternalCallsPass {
    fn visit_instruction(&mut self, arena: &mut Arena, id: ChunkId) {
        if self.plt.is_empty() {
            return;
        }
        let Some(reference) = arena.semantic_mut(id).and_then(|s| s.reference_mut()) else {
            return;
        };
        if reference.is_resolved() {
            return;
        }
        if let Some(&target) = self.plt.get(&reference.literal) {
            reference.resolve(ReferenceKind::ExternalCall, target);
        }
    }
}

impl Pass for ExternalCallsPass {
    fn name(&self) -> &'static str {
        "external-call resolution"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{
        BlockData, ChunkKind, FunctionData, InstructionData, ModuleData, PltTrampolineData, RawInstruction,
    };
    use crate::mutator::Mutator;
    use crate::position::{Position, PositionFactory};

    #[test]
    fn resolves_a_literal_landing_on_a_plt_trampoline() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);

        let plt = arena.alloc(
            ChunkKind::PltTrampoline(PltTrampolineData {
                target_name: "puts".into(),
            }),
            16,
        );
        arena.set_position(plt, Position::new_absolute(0x2000));
        if let Some(data) = arena.kind_mut(module).as_module_mut() {
            data.plt_list.push(plt);
        }

        let function = arena.alloc(ChunkKind::Function(FunctionData { name: "f".into() }), 0);
        arena.set_position(function, Position::new_absolute(0x1000));
        Mutator::new(&mut arena, module).append(function).unwrap();
        let block = arena.alloc(ChunkKind::Block(BlockData::default()), 0);
        Mutator::new(&mut arena, function).append(block).unwrap();
        let caller = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::with_reference(vec![0u8; 4], 0x2000)),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(caller).unwrap();

        let mut pass = ExternalCallsPass::new(&arena, module);
        arena.walk_module(module, &mut pass);

        let reference = arena.semantic(caller).unwrap().reference().unwrap();
        assert_eq!(reference.kind, ReferenceKind::ExternalCall);
        assert_eq!(reference.target, Some(plt));
    }

    #[test]
    fn an_empty_plt_list_resolves_nothing() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);
        let function = arena.alloc(ChunkKind::Function(FunctionData { name: "f".into() }), 0);
        arena.set_position(function, Position::new_absolute(0x1000));
        Mutator::new(&mut arena, module).append(function).unwrap();
        let block = arena.alloc(ChunkKind::Block(BlockData::default()), 0);
        Mutator::new(&mut arena, function).append(block).unwrap();
        let caller = arena.alloc(
            ChunkKind::Instruction(InstructionData {
                semantic: Box::new(RawInstruction::with_reference(vec![0u8; 4], 0x2000)),
            }),
            4,
        );
        Mutator::new(&mut arena, block).append(caller).unwrap();

        let mut pass = ExternalCallsPass::new(&arena, module);
        arena.walk_module(module, &mut pass);

        assert!(!arena.semantic(caller).unwrap().reference().unwrap().is_resolved());
    }
}
