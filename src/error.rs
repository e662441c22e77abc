//! Error taxonomy for the rewriter core.
//!
//! `spec.md` §7 names four kinds of failure with different propagation
//! rules: structural violations (programmer error, surfaced as a recoverable
//! `Result` so a caller can catch a misused [`crate::mutator::Mutator`] call
//! without the process aborting), malformed input (fatal to ingestion),
//! sandbox allocation failure (fatal to the affected function), and analysis
//! failure (local to a pass — logged with [`log::warn!`] and never
//! surfaced as a [`RewriterError`] at all). A fifth, `Io`, wraps the
//! underlying [`std::io::Error`] a `Semantic::write_to`/sandbox write can
//! fail with during code generation.

use thiserror::Error;

use crate::chunk::ChunkId;

/// Everything that can cause the rewriter pipeline to stop short of its
/// target. Analysis failures are intentionally absent — see the module docs.
#[derive(Debug, Error)]
pub enum RewriterError {
    #[error("structural violation: {0}")]
    Structural(#[from] StructuralViolation),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("sandbox allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("I/O failure during code generation: {0}")]
    Io(#[from] std::io::Error),
}

/// A violation of one of the chunk-tree invariants in `spec.md` §3/§8.
/// These only ever arise from a caller misusing the [`crate::mutator::Mutator`]
/// API, never from ingesting untrusted input, but are still returned as an
/// ordinary `Result` rather than a panic — the Open Questions this crate
/// resolves as errors (`MismatchedJumpToSize`, and the `MissingPosition`/
/// `NotAbsolute`/`NotAChild`/`NotABlock`/`NotAnInstruction` cases a caller can
/// trigger with a stale [`crate::chunk::ChunkId`]) are all things a caller
/// can reasonably want to catch rather than have abort the process.
#[derive(Debug, Error)]
pub enum StructuralViolation {
    #[error("chunk {0:?} is already attached to a parent")]
    AlreadyParented(ChunkId),

    #[error("setPosition called on chunk {0:?} whose position is not Absolute")]
    NotAbsolute(ChunkId),

    #[error(
        "insertBeforeJumpTo requires equal-sized semantics (insert point {insert_point:?} is \
         {insert_point_size} bytes, new chunk {new_chunk:?} is {new_chunk_size} bytes)"
    )]
    MismatchedJumpToSize {
        insert_point: ChunkId,
        insert_point_size: u32,
        new_chunk: ChunkId,
        new_chunk_size: u32,
    },

    #[error("chunk {0:?} has no position; every attached chunk must own one")]
    MissingPosition(ChunkId),

    #[error("chunk {0:?} is not a Block, cannot split it")]
    NotABlock(ChunkId),

    #[error("chunk {0:?} is not an Instruction")]
    NotAnInstruction(ChunkId),

    #[error("chunk {child:?} is not a child of {parent:?}")]
    NotAChild { parent: ChunkId, child: ChunkId },
}

/// Fatal failure to carve a slot out of a [`crate::sandbox::Sandbox`].
#[derive(Debug, Error)]
#[error("could not allocate {requested} bytes (watermark at {watermark}, capacity {capacity})")]
pub struct AllocationError {
    pub requested: u32,
    pub watermark: u64,
    pub capacity: u64,
}
