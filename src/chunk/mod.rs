/*! The chunk tree: the hierarchical container for code entities that
`spec.md` §3/§4.B describes.

Chunks live in a single [`Arena`] per module, addressed by the `Copy`
handle [`ChunkId`] rather than by pointer or `Rc` — the "index-into-arena"
strategy `spec.md` §9 calls out as the safest way to express the tree's
parent/sibling back-references in a language without garbage collection.
Nothing is ever freed out of the arena (a removed chunk is simply detached,
matching `spec.md` §4.C's `remove`, which never says to destroy anything),
so `ChunkId` needs no generation-checked validity — if it was ever handed
out, it still points at a live slot.

[`Arena`] is deliberately the *only* type with method access to sibling and
child-list storage; [`crate::mutator::Mutator`] is the only module that
calls the `pub(crate)` link-mutating methods, which is what `spec.md` §4.C
means by "the mutator is the only component permitted to change structural
links". Read-only accessors (`parent`, `children`, `size`, `address`, ...)
are public.
*/

mod kinds;
pub mod semantic;

pub use kinds::{
    BlockData, ChunkKind, ChunkTag, DataRegionData, FunctionData, InstructionData, JumpTableData,
    ModuleData, PltTrampolineData, SymbolData,
};
pub use semantic::{RawInstruction, Reference, ReferenceKind, Semantic};

use crate::position::{Generation, Position, PositionFactory};

/// Opaque handle to a chunk. Cheap to copy, stable for the arena's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(usize);

struct ChunkSlot {
    parent: Option<ChunkId>,
    prev_sibling: Option<ChunkId>,
    next_sibling: Option<ChunkId>,
    /// Ordered child list. Empty and unused for leaf chunks.
    children: Vec<ChunkId>,
    size: u32,
    position: Option<Position>,
    kind: ChunkKind,
}

/// Owner of every chunk belonging to one [`crate::elf::ElfSpace`]. `spec.md`
/// §5 is explicit that a chunk tree is owned by exactly one such space and
/// never shared across spaces, which is why `Arena` has no interior
/// mutability for its own storage (only individual `Position`s do, for
/// generation caching) and no `Clone`.
pub struct Arena {
    factory: PositionFactory,
    slots: Vec<ChunkSlot>,
}

/// Visitor interface for passes, per `spec.md` §4.D: one entry per chunk
/// variant, defaulting to a no-op so a pass only implements the variants it
/// cares about. `Arena::accept` does the double-dispatch; `Arena::walk`
/// drives a full top-down traversal, which is what `module.accept(pass)`
/// means in practice — a single node dispatch on its own is rarely useful
/// since most passes want to see every matching chunk in the tree.
pub trait Visitor {
    fn visit_module(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_function(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_block(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_instruction(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_plt_trampoline(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_data_region(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_jump_table(&mut self, _arena: &mut Arena, _id: ChunkId) {}
    fn visit_symbol(&mut self, _arena: &mut Arena, _id: ChunkId) {}
}

impl Arena {
    pub fn new(factory: PositionFactory) -> Self {
        Arena {
            factory,
            slots: Vec::new(),
        }
    }

    pub fn factory(&self) -> PositionFactory {
        self.factory
    }

    /// Allocate a new, unattached chunk. `intrinsic_size` is the leaf size
    /// for non-container chunks; containers (Module/Function/Block) start
    /// at zero and grow through the mutator as children attach, per
    /// invariant 3 in `spec.md` §3.
    pub fn alloc(&mut self, kind: ChunkKind, intrinsic_size: u32) -> ChunkId {
        let size = if kind.is_container() { 0 } else { intrinsic_size };
        self.slots.push(ChunkSlot {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            children: Vec::new(),
            size,
            position: None,
            kind,
        });
        ChunkId(self.slots.len() - 1)
    }

    fn slot(&self, id: ChunkId) -> &ChunkSlot {
        &self.slots[id.0]
    }

    fn slot_mut(&mut self, id: ChunkId) -> &mut ChunkSlot {
        &mut self.slots[id.0]
    }

    // -- read-only structural accessors --------------------------------

    pub fn parent(&self, id: ChunkId) -> Option<ChunkId> {
        self.slot(id).parent
    }

    pub fn children(&self, id: ChunkId) -> &[ChunkId] {
        &self.slot(id).children
    }

    pub fn previous_sibling(&self, id: ChunkId) -> Option<ChunkId> {
        self.slot(id).prev_sibling
    }

    pub fn next_sibling(&self, id: ChunkId) -> Option<ChunkId> {
        self.slot(id).next_sibling
    }

    pub fn size(&self, id: ChunkId) -> u32 {
        self.slot(id).size
    }

    pub fn kind(&self, id: ChunkId) -> &ChunkKind {
        &self.slot(id).kind
    }

    pub fn kind_mut(&mut self, id: ChunkId) -> &mut ChunkKind {
        &mut self.slot_mut(id).kind
    }

    pub fn semantic(&self, id: ChunkId) -> Option<&dyn Semantic> {
        self.kind(id).as_instruction().map(|i| i.semantic.as_ref())
    }

    pub fn semantic_mut(&mut self, id: ChunkId) -> Option<&mut (dyn Semantic + '_)> {
        match self.kind_mut(id).as_instruction_mut() {
            Some(i) => Some(i.semantic.as_mut()),
            None => None,
        }
    }

    pub fn position(&self, id: ChunkId) -> Option<&Position> {
        self.slot(id).position.as_ref()
    }

    /// Iterate a container's children by following `next_sibling` links
    /// instead of indexing the child list directly. Used by invariant
    /// tests (`spec.md` §8 property 1) to check the two views agree, and by
    /// passes that want a cursor-style walk.
    pub fn sibling_chain(&self, first: ChunkId) -> impl Iterator<Item = ChunkId> + '_ {
        std::iter::successors(Some(first), move |&id| self.next_sibling(id))
    }

    // -- address algebra --------------------------------------------------

    /// `getAddress`: resolve this chunk's address through its position,
    /// using the generation-cache fast path when the factory enables it.
    pub fn address(&self, id: ChunkId) -> u64 {
        let pos = self
            .slot(id)
            .position
            .as_ref()
            .unwrap_or_else(|| panic!("chunk {:?} has no position", id));

        if let Some(addr) = pos.absolute_address() {
            return addr;
        }

        if !self.factory.needs_generation_tracking {
            return self.compute_raw(id);
        }

        let authority = pos.authority().unwrap_or_else(|| self.update_authority(id));
        let authority_gen = self.generation_of(authority);
        if let Some((cached_addr, cached_gen)) = pos.cached() {
            if cached_gen >= authority_gen {
                return cached_addr;
            }
        }
        self.recalculate(id)
    }

    fn compute_raw(&self, id: ChunkId) -> u64 {
        let pos = self.slot(id).position.as_ref().unwrap();
        if let Some(offset) = pos.offset() {
            let parent = self
                .parent(id)
                .unwrap_or_else(|| panic!("OffsetPosition on {:?} has no parent", id));
            return (self.address(parent) as i64 + offset) as u64;
        }
        if let Some(after) = pos.after_this() {
            return self.address(after) + self.size(after) as u64;
        }
        unreachable!("Absolute positions never reach compute_raw")
    }

    /// `recalculate()`: force this position to re-evaluate its address from
    /// its current inputs and refresh its cache. No-op (returns the stored
    /// address) on `Absolute`.
    pub fn recalculate(&self, id: ChunkId) -> u64 {
        let pos = self.slot(id).position.as_ref().unwrap();
        if let Some(addr) = pos.absolute_address() {
            return addr;
        }
        let addr = self.compute_raw(id);
        let authority = pos.authority().unwrap_or_else(|| self.update_authority(id));
        pos.set_cached(addr, self.generation_of(authority));
        addr
    }

    /// `updateAuthority()`: resolve the nearest ancestor-or-self whose
    /// position is Absolute, cache it on `id`'s position, and return it.
    pub fn update_authority(&self, id: ChunkId) -> ChunkId {
        let authority = self.nearest_absolute_ancestor(id);
        if let Some(pos) = self.slot(id).position.as_ref() {
            pos.set_authority(authority);
        }
        authority
    }

    fn nearest_absolute_ancestor(&self, id: ChunkId) -> ChunkId {
        let mut cur = id;
        loop {
            if self.is_absolute(cur) {
                return cur;
            }
            cur = self
                .parent(cur)
                .unwrap_or_else(|| panic!("chunk {:?} has no Absolute ancestor", id));
        }
    }

    /// Refresh every descendant's cached authority pointer in one top-down
    /// pass, per `spec.md` §4.C step 4. A literal per-node `updateAuthority`
    /// walk would re-climb to the root from every node (`O(depth)` each);
    /// since the authority for a subtree is the same chunk throughout
    /// (unless a descendant is itself Absolute), threading it down during
    /// the single traversal gets the same observable result in `O(subtree
    /// size)`.
    pub fn update_authority_recursive(&self, root: ChunkId) {
        let authority = self.nearest_absolute_ancestor(root);
        self.set_authority_subtree(root, authority);
    }

    fn set_authority_subtree(&self, node: ChunkId, inherited: ChunkId) {
        let is_abs = self.is_absolute(node);
        if !is_abs {
            if let Some(pos) = self.slot(node).position.as_ref() {
                pos.set_authority(inherited);
            }
        }
        let next_authority = if is_abs { node } else { inherited };
        for &child in &self.slot(node).children {
            self.set_authority_subtree(child, next_authority);
        }
    }

    /// Eagerly recompute every address in `root`'s subtree, per the
    /// `needsUpdatePasses` sweep in `spec.md` §4.C. Parents are recalculated
    /// before children since `Offset`/`Subsequent` positions read their
    /// parent's or sibling's *already current* address.
    pub fn recalculate_subtree(&self, root: ChunkId) {
        self.recalculate(root);
        for &child in &self.slot(root).children {
            self.recalculate_subtree(child);
        }
    }

    pub fn is_absolute(&self, id: ChunkId) -> bool {
        self.slot(id)
            .position
            .as_ref()
            .map(Position::is_absolute)
            .unwrap_or(false)
    }

    pub fn generation_of(&self, id: ChunkId) -> Generation {
        self.slot(id)
            .position
            .as_ref()
            .map(Position::get_generation)
            .unwrap_or(0)
    }

    // -- double dispatch ---------------------------------------------------

    /// `chunk.accept(visitor)`: dispatch to the matching `Visitor` entry for
    /// this one chunk (no recursion — see [`Arena::walk`] for the
    /// whole-subtree form).
    pub fn accept(&mut self, id: ChunkId, visitor: &mut dyn Visitor) {
        match self.kind(id).tag() {
            ChunkTag::Module => visitor.visit_module(self, id),
            ChunkTag::Function => visitor.visit_function(self, id),
            ChunkTag::Block => visitor.visit_block(self, id),
            ChunkTag::Instruction => visitor.visit_instruction(self, id),
            ChunkTag::PltTrampoline => visitor.visit_plt_trampoline(self, id),
            ChunkTag::DataRegion => visitor.visit_data_region(self, id),
            ChunkTag::JumpTable => visitor.visit_jump_table(self, id),
            ChunkTag::Symbol => visitor.visit_symbol(self, id),
        }
    }

    /// Depth-first, pre-order traversal calling [`Arena::accept`] at every
    /// chunk in `root`'s subtree (`root` included). This is how the
    /// orchestrator actually drives a pass: `arena.walk(module_id, &mut
    /// pass)`.
    pub fn walk(&mut self, root: ChunkId, visitor: &mut dyn Visitor) {
        self.accept(root, visitor);
        let children = self.slot(root).children.clone();
        for child in children {
            self.walk(child, visitor);
        }
    }

    /// The traversal the orchestrator actually drives a pass with:
    /// `module.accept(pass)` in `spec.md` §4.E/§4.D means visiting the
    /// module, every function's subtree, and every chunk in the module's
    /// auxiliary lists (PLT trampolines, data regions, jump tables,
    /// symbols) — none of which live in the generic parent/child links
    /// [`Arena::walk`] follows, since those four are Module-owned lists,
    /// not a position-chained sibling sequence.
    pub fn walk_module(&mut self, module: ChunkId, visitor: &mut dyn Visitor) {
        self.accept(module, visitor);
        let functions = self.slot(module).children.clone();
        for function in functions {
            self.walk(function, visitor);
        }
        let Some(data) = self.kind(module).as_module() else {
            return;
        };
        let (plt, regions, tables, symbols) = (
            data.plt_list.clone(),
            data.data_regions.clone(),
            data.jump_tables.clone(),
            data.symbols.clone(),
        );
        for id in plt {
            self.accept(id, visitor);
        }
        for id in regions {
            self.accept(id, visitor);
        }
        for id in tables {
            self.accept(id, visitor);
        }
        for id in symbols {
            self.accept(id, visitor);
        }
    }

    // -- crate-internal structural primitives, used only by Mutator --------
    // `spec.md` §4.C: "the mutator is the only component permitted to
    // change structural links." These stay pub(crate) so the only way to
    // call them from outside this crate is through `crate::mutator::Mutator`.

    pub(crate) fn set_parent(&mut self, id: ChunkId, parent: Option<ChunkId>) {
        self.slot_mut(id).parent = parent;
    }

    pub(crate) fn set_prev_sibling(&mut self, id: ChunkId, prev: Option<ChunkId>) {
        self.slot_mut(id).prev_sibling = prev;
        if let Some(prev) = prev {
            if let Some(pos) = self.slot(id).position.as_ref() {
                pos.set_after_this(prev);
            }
        }
    }

    pub(crate) fn set_next_sibling(&mut self, id: ChunkId, next: Option<ChunkId>) {
        self.slot_mut(id).next_sibling = next;
        if let Some(next) = next {
            if let Some(pos) = self.slot(next).position.as_ref() {
                pos.set_after_this(id);
            }
        }
    }

    pub fn set_position(&mut self, id: ChunkId, position: Position) {
        self.slot_mut(id).position = Some(position);
    }

    pub(crate) fn add_to_size(&mut self, id: ChunkId, delta: i64) {
        let slot = self.slot_mut(id);
        slot.size = (slot.size as i64 + delta) as u32;
    }

    pub(crate) fn children_mut(&mut self, id: ChunkId) -> &mut Vec<ChunkId> {
        &mut self.slot_mut(id).children
    }

    pub(crate) fn index_of_child(&self, parent: ChunkId, child: ChunkId) -> Option<usize> {
        self.slot(parent).children.iter().position(|&c| c == child)
    }

    /// Drop `id`'s position entirely, e.g. when detaching a chunk that is
    /// about to be re-attached elsewhere and given a fresh one.
    pub(crate) fn clear_position(&mut self, id: ChunkId) {
        self.slot_mut(id).position = None;
    }

    /// Exchange the `Semantic` payloads of two `Instruction` chunks, used by
    /// `insertBeforeJumpTo` so that whichever chunk occupies the original
    /// jump target keeps running the original semantic. Any other pairing
    /// of kinds is a no-op.
    pub(crate) fn swap_semantics(&mut self, a: ChunkId, b: ChunkId) {
        if a == b {
            return;
        }
        let (lo, hi) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (left, right) = self.slots.split_at_mut(hi);
        let slot_lo = &mut left[lo];
        let slot_hi = &mut right[0];
        if let (ChunkKind::Instruction(i1), ChunkKind::Instruction(i2)) =
            (&mut slot_lo.kind, &mut slot_hi.kind)
        {
            std::mem::swap(&mut i1.semantic, &mut i2.semantic);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("factory", &self.factory)
            .field("len", &self.slots.len())
            .finish()
    }
}
