//! The payload an [`crate::chunk::ChunkKind::Instruction`] leaf carries: its
//! machine-code meaning and a byte serialiser, per `spec.md` §3.
//!
//! Actual instruction encoding (how a PC-relative displacement gets
//! re-computed when the instruction moves) is the "concrete relocation
//! catalogue" `spec.md` §1 names as a non-goal, so semantics here are
//! write-once: the bytes recorded at disassembly time are what gets
//! serialised, unchanged, when the function is emitted into the sandbox.
//! What a pass *can* do is attach a typed [`Reference`] to a raw address
//! literal it finds inside those bytes, which is the mechanism `spec.md`
//! §4.D describes ("convert raw address literals ... into typed references
//! to chunks").

use std::fmt;
use std::io::Write;

use crate::chunk::ChunkId;
use crate::error::RewriterError;

/// What kind of address literal a [`Reference`] started life as, set by
/// whichever analysis pass first recognised it (`spec.md` §4.D lists the
/// passes in the order they run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Not yet looked at by any pass.
    Unresolved,
    /// An intra-module branch/call, resolved by the internal-calls pass.
    InternalCall,
    /// A call through the PLT, resolved by the external-calls pass.
    ExternalCall,
    /// A PC-relative load/store target, resolved by the PC-relative pass.
    PcRelative,
    /// A literal matched against the relocation list.
    Relocation,
    /// A cross-reference the inferred-link heuristic guessed at.
    InferredLink,
    /// An entry read out of a jump table.
    JumpTableEntry,
}

/// A reference an instruction's semantic makes to another address. Starts
/// out as just the raw literal the disassembler saw; passes fill in `kind`
/// and `target` as they resolve it. The literal is kept even after
/// resolution since the relocation-sanity pass (`spec.md` §4.D item 7)
/// cross-checks it against the relocation list.
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub literal: u64,
    pub target: Option<ChunkId>,
}

impl Reference {
    pub fn unresolved(literal: u64) -> Self {
        Reference {
            kind: ReferenceKind::Unresolved,
            literal,
            target: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    pub fn resolve(&mut self, kind: ReferenceKind, target: ChunkId) {
        self.kind = kind;
        self.target = Some(target);
    }
}

/// The machine-code meaning of an [`crate::chunk::ChunkKind::Instruction`].
/// `size`/`write_to` are what the generator (`spec.md` §4.F) drives during
/// serialisation; `reference`/`reference_mut` are what the analysis passes
/// (`spec.md` §4.D) drive during ingestion. Most semantics carry no
/// reference at all — the default `None` covers them without every impl
/// having to say so.
pub trait Semantic: fmt::Debug {
    fn size(&self) -> u32;
    fn write_to(&self, out: &mut dyn Write) -> Result<(), RewriterError>;

    fn reference(&self) -> Option<&Reference> {
        None
    }

    fn reference_mut(&mut self) -> Option<&mut Reference> {
        None
    }
}

/// The common case: a fixed run of bytes produced by the disassembler,
/// optionally carrying one address reference discovered inside them.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    bytes: Vec<u8>,
    reference: Option<Reference>,
}

impl RawInstruction {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        RawInstruction {
            bytes: bytes.into(),
            reference: None,
        }
    }

    pub fn with_reference(bytes: impl Into<Vec<u8>>, literal: u64) -> Self {
        RawInstruction {
            bytes: bytes.into(),
            reference: Some(Reference::unresolved(literal)),
        }
    }
}

impl Semantic for RawInstruction {
    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn write_to(&self, out: &mut dyn Write) -> Result<(), RewriterError> {
        out.write_all(&self.bytes).map_err(RewriterError::from)
    }

    fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    fn reference_mut(&mut self) -> Option<&mut Reference> {
        self.reference.as_mut()
    }
}
