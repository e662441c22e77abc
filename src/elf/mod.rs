//! ELF ingestion: reading an image's symbol/relocation/section metadata
//! (`image`, `symbol`), turning it into a populated chunk tree
//! (`disassembler`), and the orchestrator that runs the fixed ingestion
//! sequence `spec.md` §4.E describes (`orchestrator`).

pub mod disassembler;
pub mod image;
pub mod orchestrator;
pub mod symbol;

pub use disassembler::{Disassembler, LinearDisassembler};
pub use image::ElfImage;
pub use orchestrator::ElfSpace;
pub use symbol::{ElfSource, RelocEntry, RelocList, SharedLib, Symbol, SymbolList};
