//! The tagged sum of concrete chunk variants named in `spec.md` §3. Modelled
//! as a closed enum rather than a class hierarchy, per the design note in
//! `spec.md` §9 — `accept`/double-dispatch becomes a tag match
//! ([`crate::chunk::Arena::accept`]) instead of virtual calls.

use std::collections::HashMap;

use crate::chunk::{ChunkId, Semantic};

/// Root chunk. Owns the function list, the PLT list, the data-region list,
/// and the jump-table list (`spec.md` §3's "Module — root; owns function
/// list, PLT list, data regions, jump tables"). The generic parent/child
/// links on the chunk itself track only the function list, since that is
/// the one ordered, position-chained sequence a module root needs the
/// sibling/child coherence invariant to hold for; the other three are
/// auxiliary and carried as plain lookup lists.
#[derive(Debug, Default)]
pub struct ModuleData {
    pub plt_list: Vec<ChunkId>,
    pub data_regions: Vec<ChunkId>,
    pub jump_tables: Vec<ChunkId>,
    pub symbols: Vec<ChunkId>,
    /// name -> canonical function, built by the orchestrator's last step
    /// (`spec.md` §4.E item 9) for fast lookup, e.g. by the generator's
    /// entry-point resolution (`spec.md` §4.F).
    pub function_alias_map: HashMap<String, ChunkId>,
}

/// A named unit of code; child of Module, contains Blocks.
#[derive(Debug)]
pub struct FunctionData {
    pub name: String,
}

/// A basic block; contains Instructions.
///
/// `fall_through` records the block executed next when this one's last
/// instruction does not transfer control elsewhere — set by the
/// fall-through pass (`spec.md` §4.D item 1). Adjacency in the Function's
/// child list already implies this for a linear disassembly, but keeping it
/// as an explicit link means later mutator operations (e.g.
/// `splitBlockBefore` inserting a block in between) don't silently change
/// control flow that analysis already committed to.
#[derive(Debug, Default)]
pub struct BlockData {
    pub fall_through: Option<ChunkId>,
}

/// Leaf chunk carrying a [`Semantic`].
pub struct InstructionData {
    pub semantic: Box<dyn Semantic>,
}

impl std::fmt::Debug for InstructionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionData")
            .field("semantic", &self.semantic)
            .finish()
    }
}

/// Indirection stub for a dynamically-linked external call.
#[derive(Debug)]
pub struct PltTrampolineData {
    pub target_name: String,
}

/// A named, fixed-content region of a module's data segment.
#[derive(Debug)]
pub struct DataRegionData {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A table of code addresses used by an indirect (computed) branch.
/// `raw_entries` are the literal addresses as read out of the data section;
/// `entries` are the same entries resolved to chunks, populated and then
/// trimmed by the three-stage jump-table pass (`spec.md` §4.D item 8:
/// detection, bounds tightening, overestimate pruning).
#[derive(Debug, Default)]
pub struct JumpTableData {
    pub raw_entries: Vec<u64>,
    pub entries: Vec<ChunkId>,
}

/// A named symbol with no code of its own (e.g. a data symbol, or an alias).
#[derive(Debug)]
pub struct SymbolData {
    pub name: String,
}

/// The tagged sum itself. `ChunkTag` (below) is the `Copy` discriminant used
/// for dispatch so that `Arena::accept` doesn't need to hold a borrow of the
/// variant payload while it calls into a visitor that needs `&mut Arena`.
#[derive(Debug)]
pub enum ChunkKind {
    Module(ModuleData),
    Function(FunctionData),
    Block(BlockData),
    Instruction(InstructionData),
    PltTrampoline(PltTrampolineData),
    DataRegion(DataRegionData),
    JumpTable(JumpTableData),
    Symbol(SymbolData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    Module,
    Function,
    Block,
    Instruction,
    PltTrampoline,
    DataRegion,
    JumpTable,
    Symbol,
}

impl ChunkKind {
    pub fn tag(&self) -> ChunkTag {
        match self {
            ChunkKind::Module(_) => ChunkTag::Module,
            ChunkKind::Function(_) => ChunkTag::Function,
            ChunkKind::Block(_) => ChunkTag::Block,
            ChunkKind::Instruction(_) => ChunkTag::Instruction,
            ChunkKind::PltTrampoline(_) => ChunkTag::PltTrampoline,
            ChunkKind::DataRegion(_) => ChunkTag::DataRegion,
            ChunkKind::JumpTable(_) => ChunkTag::JumpTable,
            ChunkKind::Symbol(_) => ChunkTag::Symbol,
        }
    }

    /// Whether this variant's children form the generic position-chained
    /// sibling list the mutator operates on (Module/Function/Block), as
    /// opposed to a leaf that never has children.
    pub fn is_container(&self) -> bool {
        matches!(
            self.tag(),
            ChunkTag::Module | ChunkTag::Function | ChunkTag::Block
        )
    }

    pub fn as_instruction(&self) -> Option<&InstructionData> {
        match self {
            ChunkKind::Instruction(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instruction_mut(&mut self) -> Option<&mut InstructionData> {
        match self {
            ChunkKind::Instruction(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleData> {
        match self {
            ChunkKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleData> {
        match self {
            ChunkKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match self {
            ChunkKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockData> {
        match self {
            ChunkKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockData> {
        match self {
            ChunkKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_jump_table(&self) -> Option<&JumpTableData> {
        match self {
            ChunkKind::JumpTable(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_jump_table_mut(&mut self) -> Option<&mut JumpTableData> {
        match self {
            ChunkKind::JumpTable(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_plt_trampoline(&self) -> Option<&PltTrampolineData> {
        match self {
            ChunkKind::PltTrampoline(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_data_region(&self) -> Option<&DataRegionData> {
        match self {
            ChunkKind::DataRegion(d) => Some(d),
            _ => None,
        }
    }
}
