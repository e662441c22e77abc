/*! # About
This crate is the core of a static ELF rewriter: it ingests a compiled
executable or shared library, reconstructs an editable, hierarchical model of
its code (functions, basic blocks, instructions, and the auxiliary chunks
that hang off a module — PLT trampolines, data regions, jump tables, and
symbols), and can relocate that code into a fresh, contiguous region of
memory (a "sandbox").

The three pieces that make this work, leaves first:

- [`position`]: the address algebra. A chunk never stores its own address
  directly unless it is the authoritative root of an address subtree
  ([`position::Position::Absolute`]); everything else computes its address
  on demand from a parent offset or a prior sibling's extent, with
  generation-counter caching so repeated queries stay cheap.
- [`chunk`]: the hierarchical container itself — an arena of chunks
  addressed by [`chunk::ChunkId`], with parent/child/sibling bookkeeping and
  a closed set of variants ([`chunk::ChunkKind`]) dispatched through
  [`chunk::Visitor`].
- [`mutator`]: the only API permitted to change the shape of the tree.
  Every structural edit (`append`, `insert_before`, `split_block_before`, ...)
  goes through a [`mutator::Mutator`], which keeps sizes, sibling links, and
  position generations consistent in the same motion.

Upstream of all that sits [`elf`], which disassembles an ELF image into a
populated tree and runs the fixed sequence of analysis passes in [`pass`].
Downstream sits [`sandbox`] and [`generator`], which pick fresh addresses
for functions and serialise their instructions to bytes.

This library does not parse ELF byte layout itself beyond what is needed to
locate symbol tables and sections (delegated to `xmas-elf`), does not
implement a disassembler (that's a pluggable [`elf::disassembler::Disassembler`]),
and does not provide a command-line front end — those are left to callers.
*/

pub mod chunk;
pub mod elf;
pub mod error;
pub mod generator;
pub mod mutator;
pub mod pass;
pub mod position;
pub mod sandbox;

pub use error::{AllocationError, RewriterError, StructuralViolation};
