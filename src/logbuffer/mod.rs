//! Log buffer module - terms, tails and the frame-level read/write paths.
//!
//! This module implements the shared memory layout of a stream:
//! - `TermBuffer`: aligned term storage with Release/Acquire frame lengths
//! - `LogBuffers`: three rotating partitions with packed raw tails
//! - `TermAppender`: claims space and writes (possibly fragmented) messages
//! - `FragmentAssembler`: rebuilds messages from BEGIN..END fragments
//! - `Header`: frame header plus position context for handlers

mod appender;
mod assembler;
mod header;
mod log;
mod reader;
mod term;

pub use appender::{AppendOutcome, TermAppender};
pub use assembler::FragmentAssembler;
pub use header::Header;
pub use log::{
    compute_position, compute_term_begin_position, compute_term_id_from_position,
    compute_term_offset_from_position, index_by_term, index_by_term_count, pack_tail,
    position_bits_to_shift, term_id, term_offset, LogBuffers, PARTITION_COUNT,
};
pub(crate) use reader::{scan, Scanned};
pub use term::TermBuffer;
