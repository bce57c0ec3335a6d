//! Protocol module - data frame wire format and frame types.
//!
//! This module implements the binary framing used on every term:
//! - 32-byte data header encoding/decoding
//! - Fragment flags, frame types and alignment
//! - Owned `Frame` for datagrams leaving the log

mod frame;
mod wire_format;

pub use frame::{build_frame, Frame};
pub(crate) use wire_format::read_i32;
pub use wire_format::{
    align, flags, frame_type, DataHeader, CURRENT_VERSION, FLAGS_OFFSET, FRAME_ALIGNMENT,
    FRAME_LENGTH_OFFSET, HEADER_LENGTH, RESERVED_VALUE_OFFSET, SESSION_ID_OFFSET,
    STREAM_ID_OFFSET, TERM_ID_OFFSET, TERM_OFFSET_OFFSET, TYPE_OFFSET, VERSION_OFFSET,
};
