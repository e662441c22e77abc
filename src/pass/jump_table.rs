//! Pass 8: jump-table detection, bounds tightening, and overestimate
//! pruning (`spec.md` §4.D item 8), grounded on the three separate visitor
//! passes `original_source/src/elf/elfspace.cpp` runs back to back:
//! `JumpTablePass`, `JumpTableBounds`, `JumpTableOverestimate`.
//!
//! A real implementation of any of the three is itself a research problem
//! (locating the table in the data section, figuring out its true extent
//! from surrounding code behaviour); what this crate commits to is the
//! *shape* of the three-stage pipeline and a usable default heuristic for
//! each stage, documented individually below.

use crate::chunk::{Arena, ChunkId, Visitor};
use crate::pass::{index_instructions, Pass};
use std::collections::HashMap;

/// Stage one: resolve each jump table's raw literal entries against known
/// instruction addresses. Entries that don't resolve are dropped and
/// logged rather than aborting the table — a table built from partially
/// malformed data is still more useful than none.
pub struct JumpTableDetectPass {
    instructions: HashMap<u64, ChunkId>,
}

impl JumpTableDetectPass {
    pub fn new(arena: &Arena, module: ChunkId) -> Self {
        JumpTableDetectPass {
            instructions: index_instructions(arena, module),
        }
    }
}

impl Visitor for JumpTableDetectPass {
    fn visit_jump_table(&mut self, arena: &mut Arena, id: ChunkId) {
        let raw = arena
            .kind(id)
            .as_jump_table()
            .map(|j| j.raw_entries.clone())
            .unwrap_or_default();

        let mut resolved = Vec::with_capacity(raw.len());
        for literal in raw {
            match self.instructions.get(&literal) {
                Some(&target) => resolved.push(target),
                None => log::warn!("jump table {id:?}: entry 0x{literal:x} did not resolve"),
            }
        }

        if let Some(data) = arena.kind_mut(id).as_jump_table_mut() {
            data.entries = resolved;
        }
    }
}

impl Pass for JumpTableDetectPass {
    fn name(&self) -> &'static str {
        "jump-table detection"
    }
}

/// Stage two: jump table entries are conventionally addresses that move
/// forward through a function's code. A decrease signals the detected
/// table ran past its real end into unrelated data; truncate there.
#[derive(Default)]
pub struct JumpTableBoundsPass;

impl Visitor for JumpTableBoundsPass {
    fn visit_jump_table(&mut self, arena: &mut Arena, id: ChunkId) {
        let entries = arena
            .kind(id)
            .as_jump_table()
            .map(|j| j.entries.clone())
            .unwrap_or_default();

        let mut bound = entries.len();
        let mut prev_addr = None;
        for (i, &entry) in entries.iter().enumerate() {
            let addr = arena.address(entry);
            if let Some(prev) = prev_addr {
                if addr < prev {
                    bound = i;
                    break;
                }
            }
            prev_addr = Some(addr);
        }

        if bound < entries.len() {
            if let Some(data) = arena.kind_mut(id).as_jump_table_mut() {
                data.entries.truncate(bound);
            }
        }
    }
}

impl Pass for JumpTableBoundsPass {
    fn name(&self) -> &'static str {
        "jump-table bounds tightening"
    }
}

/// Stage three: a trailing run of entries identical to the one before them
/// usually means the allocated table size overestimated the real entry
/// count and padding bytes got reinterpreted as repeats of the last entry.
#[derive(Default)]
pub struct JumpTableOverestimatePass;

impl Visitor for JumpTableOverestimatePass {
    fn visit_jump_table(&mut self, arena: &mut Arena, id: ChunkId) {
        let entries = arena
            .kind(id)
            .as_jump_table()
            .map(|j| j.entries.clone())
            .unwrap_or_default();

        let mut keep = entries.len();
        while keep > 1 && entries[keep - 1] == entries[keep - 2] {
            keep -= 1;
        }

        if keep < entries.len() {
            if let Some(data) = arena.kind_mut(id).as_jump_table_mut() {
                data.entries.truncate(keep);
            }
        }
    }
}

impl Pass for JumpTableOverestimatePass {
    fn name(&self) -> &'static str {
        "jump-table overestimate pruning"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{BlockData, ChunkKind, FunctionData, InstructionData, JumpTableData, ModuleData, RawInstruction};
    use crate::mutator::Mutator;
    use crate::position::{Position, PositionFactory};

    fn build_function_with_instructions(arena: &mut Arena, count: usize) -> (ChunkId, Vec<ChunkId>) {
        let module = arena.alloc(ChunkKind::Module(ModuleData::default()), 0);
        let function = arena.alloc(ChunkKind::Function(FunctionData { name: "f".into() }), 0);
        arena.set_position(function, Position::new_absolute(0x1000));
        Mutator::new(arena, module).append(function).unwrap();
        let block = arena.alloc(ChunkKind::Block(BlockData::default()), 0);
        Mutator::new(arena, function).append(block).unwrap();
        let mut m = Mutator::new(arena, block);
        let ids: Vec<_> = (0..count)
            .map(|_| {
                let id = m.arena_mut().alloc(
                    ChunkKind::Instruction(InstructionData {
                        semantic: Box::new(RawInstruction::new(vec![0u8; 4])),
                    }),
                    4,
                );
                m.append(id).unwrap();
                id
            })
            .collect();
        (module, ids)
    }

    #[test]
    fn detect_resolves_raw_literals_to_known_instructions_and_drops_the_rest() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let (module, ids) = build_function_with_instructions(&mut arena, 3);
        let addresses: Vec<u64> = ids.iter().map(|&id| arena.address(id)).collect();

        let table = arena.alloc(
            ChunkKind::JumpTable(JumpTableData {
                raw_entries: vec![addresses[0], 0xDEAD, addresses[2]],
                entries: Vec::new(),
            }),
            0,
        );

        let mut pass = JumpTableDetectPass::new(&arena, module);
        pass.visit_jump_table(&mut arena, table);

        let entries = &arena.kind(table).as_jump_table().unwrap().entries;
        assert_eq!(entries.as_slice(), &[ids[0], ids[2]]);
    }

    #[test]
    fn bounds_truncates_at_the_first_address_decrease() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let (_module, ids) = build_function_with_instructions(&mut arena, 4);
        // addresses are ascending by construction; entries[2] breaks that
        // order by pointing back to ids[0].
        let table = arena.alloc(
            ChunkKind::JumpTable(JumpTableData {
                raw_entries: Vec::new(),
                entries: vec![ids[0], ids[1], ids[0], ids[3]],
            }),
            0,
        );

        let mut pass = JumpTableBoundsPass;
        pass.visit_jump_table(&mut arena, table);

        let entries = &arena.kind(table).as_jump_table().unwrap().entries;
        assert_eq!(entries.as_slice(), &[ids[0], ids[1]]);
    }

    #[test]
    fn overestimate_prunes_a_trailing_run_of_repeated_entries() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let (_module, ids) = build_function_with_instructions(&mut arena, 2);
        let table = arena.alloc(
            ChunkKind::JumpTable(JumpTableData {
                raw_entries: Vec::new(),
                entries: vec![ids[0], ids[1], ids[1], ids[1]],
            }),
            0,
        );

        let mut pass = JumpTableOverestimatePass;
        pass.visit_jump_table(&mut arena, table);

        let entries = &arena.kind(table).as_jump_table().unwrap().entries;
        assert_eq!(entries.as_slice(), &[ids[0], ids[1]]);
    }

    #[test]
    fn overestimate_leaves_a_table_with_no_repeats_untouched() {
        let mut arena = Arena::new(PositionFactory::x86_64());
        let (_module, ids) = build_function_with_instructions(&mut arena, 3);
        let table = arena.alloc(
            ChunkKind::JumpTable(JumpTableData {
                raw_entries: Vec::new(),
                entries: ids.clone(),
            }),
            0,
        );

        let mut pass = JumpTableOverestimatePass;
        pass.visit_jump_table(&mut arena, table);

        let entries = &arena.kind(table).as_jump_table().unwrap().entries;
        assert_eq!(entries.as_slice(), ids.as_slice());
    }
}
