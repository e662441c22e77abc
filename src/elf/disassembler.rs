//! The disassembler boundary. Turning machine code bytes into typed
//! instruction semantics is explicitly out of scope (`spec.md` §1's
//! "disassembler internals" non-goal); what this crate owns is the contract
//! a disassembler must satisfy to hand the orchestrator a populated tree.
//!
//! [`LinearDisassembler`] is a minimal implementation good enough to
//! exercise the pipeline end-to-end: one Block per function, one
//! fixed-width placeholder instruction per chunk of bytes. It reads no
//! machine code — the non-goal stands — so every instruction's bytes are a
//! filler pattern, not a decode of the input. A real backend plugs in here
//! without the rest of the crate changing.

use crate::chunk::{
    Arena, BlockData, ChunkId, ChunkKind, FunctionData, InstructionData, ModuleData, RawInstruction,
};
use crate::elf::image::ElfImage;
use crate::elf::symbol::SymbolList;
use crate::error::RewriterError;
use crate::mutator::Mutator;
use crate::position::{Position, PositionFactory};

pub trait Disassembler {
    /// The position-algebra configuration this backend's architecture needs
    /// (`spec.md` §4.A / §6: "selected at initialisation per architecture").
    fn factory(&self) -> PositionFactory;

    /// Build a Module populated with Functions, Blocks, and Instructions,
    /// each carrying the position its architecture's disassembly implies.
    /// Functions are given `AbsolutePosition`s at their original (pre-rewrite)
    /// addresses, which is what lets analysis passes resolve address
    /// literals against the as-loaded image before the generator ever
    /// rebases anything into the sandbox.
    fn disassemble(
        &self,
        image: &ElfImage,
        symbols: &SymbolList,
    ) -> Result<(Arena, ChunkId), RewriterError>;
}

pub struct LinearDisassembler {
    factory: PositionFactory,
    /// Byte width of each synthesised placeholder instruction.
    instruction_width: u32,
}

impl LinearDisassembler {
    pub fn new(factory: PositionFactory, instruction_width: u32) -> Self {
        LinearDisassembler {
            factory,
            instruction_width: instruction_width.max(1),
        }
    }
}

impl Disassembler for LinearDisassembler {
    fn factory(&self) -> PositionFactory {
        self.factory
    }

    fn disassemble(
        &self,
        _image: &ElfImage,
        symbols: &SymbolList,
    ) -> Result<(Arena, ChunkId), RewriterError> {
        build_from_symbols(self.factory, self.instruction_width, symbols)
    }
}

fn build_from_symbols(
    factory: PositionFactory,
    instruction_width: u32,
    symbols: &SymbolList,
) -> Result<(Arena, ChunkId), RewriterError> {
    let mut arena = Arena::new(factory);
    let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);

    let mut functions: Vec<_> = symbols.iter().filter(|s| s.is_function && s.size > 0).collect();
    functions.sort_by_key(|s| s.address);

    {
        let mut module_mutator = Mutator::new(&mut arena, module);
        for sym in functions {
            let function = module_mutator
                .arena_mut()
                .alloc(ChunkKind::Function(FunctionData { name: sym.name.clone() }), 0);
            module_mutator
                .arena_mut()
                .set_position(function, Position::new_absolute(sym.address));
            module_mutator.append(function)?;

            let block = module_mutator
                .arena_mut()
                .alloc(ChunkKind::Block(BlockData::default()), 0);
            let mut block_owner = Mutator::new(module_mutator.arena_mut(), function);
            block_owner.append(block)?;

            let width = instruction_width;
            let total = sym.size as u32;
            let mut offset = 0u32;
            let mut block_mutator = Mutator::new(block_owner.arena_mut(), block);
            while offset < total {
                let len = width.min(total - offset);
                let semantic = RawInstruction::new(vec![0x90u8; len as usize]);
                let instr = block_mutator
                    .arena_mut()
                    .alloc(ChunkKind::Instruction(InstructionData { semantic: Box::new(semantic) }), len);
                block_mutator.append(instr)?;
                offset += len;
            }
        }
    }

    Ok((arena, module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::symbol::Symbol;

    #[test]
    fn linear_disassembler_builds_one_block_per_function() {
        let symbols = SymbolList::new(vec![Symbol {
            name: "main".into(),
            address: 0x1000,
            size: 8,
            is_function: true,
        }]);

        let (arena, module) =
            build_from_symbols(PositionFactory::x86_64(), 4, &symbols).expect("disassemble");

        assert_eq!(arena.children(module).len(), 1);
        let function = arena.children(module)[0];
        assert_eq!(arena.children(function).len(), 1);
        let block = arena.children(function)[0];
        assert_eq!(arena.children(block).len(), 2);
        assert_eq!(arena.size(function), 8);
        assert_eq!(arena.address(function), 0x1000);
    }

    #[test]
    fn functions_with_no_size_are_skipped() {
        let symbols = SymbolList::new(vec![Symbol {
            name: "_start".into(),
            address: 0x2000,
            size: 0,
            is_function: true,
        }]);
        let (arena, module) =
            build_from_symbols(PositionFactory::x86_64(), 4, &symbols).expect("disassemble");
        assert!(arena.children(module).is_empty());
    }
}
