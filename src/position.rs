/*! The position algebra.

A [`Position`] answers "what is my chunk's address?" on demand instead of
storing an address directly, so that the chunk tree can be mutated in place
without having to eagerly rewrite every address that depends on the edited
region. There are three kinds of position:

- [`Position::Absolute`] stores an explicit address. It is the authoritative
  root of an address subtree — a chunk typically only gets one when a
  [`crate::mutator::Mutator`] rebases it into a [`crate::sandbox::Sandbox`].
- [`Position::Offset`] is `parent.address() + offset`. Used for the
  distinguished first child of a container when the factory is configured
  with [`PositionFactory::needs_special_case_first`].
- [`Position::Subsequent`] is `prior_sibling.address() + prior_sibling.size()`,
  via a non-owning "after-this" back-reference.

Resolving an address is recursive by nature (a `Subsequent` position depends
on its prior sibling's position, which may itself be `Subsequent`, and so
on, up to the nearest `Absolute` ancestor — the *authority*). To keep that
recursion cheap under repeated queries, `Offset` and `Subsequent` positions
cache the last address they computed along with the authority's generation
counter at the time; the cache is treated as stale once the authority's
generation has moved past it. This is the "GenerationalPosition" behaviour
described in `spec.md` §3.A, folded directly into the two relative variants
rather than kept as a separate wrapper type — there is no deep class
hierarchy to route around in Rust, just two fields and a comparison.

Because resolving and recalculating addresses requires walking to parents
and siblings, the per-variant `recalculate`/`updateAuthority`/`get` logic
that `spec.md` places on `Position` itself lives on [`crate::chunk::Arena`]
instead, which is the only thing that can see the whole tree. This module
owns the data each variant needs for that logic to work; it does not own the
tree traversal.
*/

use std::cell::Cell;

use crate::chunk::ChunkId;

/// Monotonically increasing counter used to invalidate cached addresses
/// lazily. See the generation-update algorithm in `spec.md` §4.C.
pub type Generation = u32;

/// Process-wide (but explicitly threaded, not a singleton — see `spec.md`
/// §9's "Global PositionFactory" redesign note) configuration for which
/// position variants get produced and how eagerly addresses stay correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionFactory {
    /// The first child of a non-empty container becomes an `Offset`
    /// position; every other child becomes `Subsequent`. When this is
    /// false, every child (including the first) becomes `Subsequent`
    /// relative to whatever precedes it, and an empty list's first insert
    /// falls back to an offset-from-parent of zero regardless.
    pub needs_special_case_first: bool,
    /// Enable lazy invalidation via generation counters (see module docs).
    /// When false, every address read walks all the way to the authority
    /// with no caching.
    pub needs_generation_tracking: bool,
    /// Enable eager recalculation sweeps from `Absolute` roots after every
    /// mutation, trading O(n) per edit for addresses that are always
    /// up to date without a cache-staleness check at read time.
    pub needs_update_passes: bool,
}

impl PositionFactory {
    pub const fn new(
        needs_special_case_first: bool,
        needs_generation_tracking: bool,
        needs_update_passes: bool,
    ) -> Self {
        PositionFactory {
            needs_special_case_first,
            needs_generation_tracking,
            needs_update_passes,
        }
    }

    /// x86-64 disassembly produces flat instruction streams with no
    /// distinguished "first slot" in a block; lazy generation tracking is
    /// enough since blocks are short and reads are infrequent relative to
    /// edits.
    pub const fn x86_64() -> Self {
        PositionFactory::new(false, true, false)
    }

    /// AArch64 mirrors x86-64 here; the two diverge in the disassembler's
    /// handling of literal pools, not in the tree's position algebra.
    pub const fn aarch64() -> Self {
        PositionFactory::new(false, true, false)
    }

    /// 32-bit ARM mixes ARM and Thumb instructions in the same block, which
    /// upstream disassemblers mark with a distinguished first "mapping
    /// symbol" entry per run — modelled here as the special-cased first
    /// child, with eager updates since mode switches are rare enough that
    /// the O(n) sweep cost is negligible.
    pub const fn arm32() -> Self {
        PositionFactory::new(true, true, true)
    }

    /// Build the position for a chunk being attached with no pre-existing
    /// position, given the sibling immediately preceding it (if any) and
    /// its offset from the parent's base address when there is none.
    pub fn make_position(&self, prior_sibling: Option<ChunkId>, offset_from_parent: i64) -> Position {
        match prior_sibling {
            Some(prev) => Position::new_subsequent(prev),
            None if self.needs_special_case_first => Position::new_offset(offset_from_parent),
            None => Position::new_offset(offset_from_parent),
        }
    }
}

/// Bookkeeping shared by the two relative position variants: a structural
/// generation number (assigned by the generation-update algorithm) doubling
/// as the cache-validity marker, plus the cached address itself and the
/// cached authority's generation at the time it was computed.
#[derive(Debug)]
struct RelativeState {
    generation: Cell<Generation>,
    authority: Cell<Option<ChunkId>>,
    cached_address: Cell<Option<u64>>,
    cached_authority_generation: Cell<Generation>,
}

impl RelativeState {
    fn new() -> Self {
        RelativeState {
            generation: Cell::new(0),
            authority: Cell::new(None),
            cached_address: Cell::new(None),
            cached_authority_generation: Cell::new(0),
        }
    }
}

#[derive(Debug)]
pub struct AbsolutePosition {
    address: Cell<u64>,
    generation: Cell<Generation>,
}

#[derive(Debug)]
pub struct OffsetPosition {
    /// Byte offset from the owning parent's address.
    pub offset: i64,
    state: RelativeState,
}

#[derive(Debug)]
pub struct SubsequentPosition {
    /// Non-owning back-reference to the sibling this position is computed
    /// after. Kept coherent by the mutator whenever sibling links change.
    after_this: Cell<ChunkId>,
    state: RelativeState,
}

/// A position answers "what is my chunk's address?" — see the module docs
/// for the three variants and how they interact.
#[derive(Debug)]
pub enum Position {
    Absolute(AbsolutePosition),
    Offset(OffsetPosition),
    Subsequent(SubsequentPosition),
}

impl Position {
    pub fn new_absolute(address: u64) -> Self {
        Position::Absolute(AbsolutePosition {
            address: Cell::new(address),
            generation: Cell::new(0),
        })
    }

    pub fn new_offset(offset: i64) -> Self {
        Position::Offset(OffsetPosition {
            offset,
            state: RelativeState::new(),
        })
    }

    pub fn new_subsequent(after_this: ChunkId) -> Self {
        Position::Subsequent(SubsequentPosition {
            after_this: Cell::new(after_this),
            state: RelativeState::new(),
        })
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, Position::Absolute(_))
    }

    /// `set(addr)` is only meaningful on `Absolute` positions; callers go
    /// through [`crate::mutator::Mutator::set_position`], which enforces
    /// that as a `StructuralViolation` rather than calling this directly.
    pub(crate) fn set_absolute_address(&self, address: u64) {
        match self {
            Position::Absolute(a) => a.address.set(address),
            _ => unreachable!("caller must check is_absolute() first"),
        }
    }

    pub(crate) fn absolute_address(&self) -> Option<u64> {
        match self {
            Position::Absolute(a) => Some(a.address.get()),
            _ => None,
        }
    }

    pub fn get_generation(&self) -> Generation {
        match self {
            Position::Absolute(a) => a.generation.get(),
            Position::Offset(o) => o.state.generation.get(),
            Position::Subsequent(s) => s.state.generation.get(),
        }
    }

    pub fn set_generation(&self, generation: Generation) {
        match self {
            Position::Absolute(a) => a.generation.set(generation),
            Position::Offset(o) => o.state.generation.set(generation),
            Position::Subsequent(s) => s.state.generation.set(generation),
        }
    }

    pub(crate) fn authority(&self) -> Option<ChunkId> {
        match self {
            Position::Absolute(_) => None,
            Position::Offset(o) => o.state.authority.get(),
            Position::Subsequent(s) => s.state.authority.get(),
        }
    }

    pub(crate) fn set_authority(&self, authority: ChunkId) {
        match self {
            Position::Absolute(_) => {}
            Position::Offset(o) => o.state.authority.set(Some(authority)),
            Position::Subsequent(s) => s.state.authority.set(Some(authority)),
        }
    }

    /// The sibling a `Subsequent` position is computed after. `None` for
    /// the other two variants.
    pub(crate) fn after_this(&self) -> Option<ChunkId> {
        match self {
            Position::Subsequent(s) => Some(s.after_this.get()),
            _ => None,
        }
    }

    /// Repoint a `Subsequent` position at a different prior sibling, kept
    /// coherent by the mutator whenever sibling links are rewritten.
    /// No-op on the other variants.
    pub(crate) fn set_after_this(&self, sibling: ChunkId) {
        if let Position::Subsequent(s) = self {
            s.after_this.set(sibling);
        }
    }

    /// The fixed offset of an `Offset` position. `None` for the other two
    /// variants.
    pub(crate) fn offset(&self) -> Option<i64> {
        match self {
            Position::Offset(o) => Some(o.offset),
            _ => None,
        }
    }

    /// Read a cached address together with the authority generation it was
    /// cached against, if one is recorded. `recalculate` (in
    /// [`crate::chunk::Arena`]) is what fills this in; `Absolute` positions
    /// never use it since `get()` returns their stored address directly.
    pub(crate) fn cached(&self) -> Option<(u64, Generation)> {
        let state = match self {
            Position::Absolute(_) => return None,
            Position::Offset(o) => &o.state,
            Position::Subsequent(s) => &s.state,
        };
        state
            .cached_address
            .get()
            .map(|addr| (addr, state.cached_authority_generation.get()))
    }

    pub(crate) fn set_cached(&self, address: u64, authority_generation: Generation) {
        let state = match self {
            Position::Absolute(_) => return,
            Position::Offset(o) => &o.state,
            Position::Subsequent(s) => &s.state,
        };
        state.cached_address.set(Some(address));
        state.cached_authority_generation.set(authority_generation);
    }

    /// Drop any cached address so the next `get()` recomputes from scratch.
    /// A no-op on `Absolute`, matching `recalculate`'s contract in `spec.md`.
    pub(crate) fn invalidate_cache(&self) {
        if let Position::Absolute(_) = self {
            return;
        }
        let state = match self {
            Position::Offset(o) => &o.state,
            Position::Subsequent(s) => &s.state,
            Position::Absolute(_) => unreachable!(),
        };
        state.cached_address.set(None);
    }
}
