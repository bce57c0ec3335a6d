//! Header view handed to fragment handlers.

use super::log::compute_position;
use crate::protocol::DataHeader;

/// Frame header plus the stream context needed to compute positions.
///
/// For a reassembled message this is the header of its last fragment, so
/// [`position`](Header::position) is the position just past the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    frame: DataHeader,
    initial_term_id: i32,
    position_bits_to_shift: u32,
}

impl Header {
    /// Wrap a frame header.
    pub fn new(frame: DataHeader, initial_term_id: i32, position_bits_to_shift: u32) -> Self {
        Self {
            frame,
            initial_term_id,
            position_bits_to_shift,
        }
    }

    /// Position just past this frame, alignment included.
    #[inline]
    pub fn position(&self) -> i64 {
        compute_position(
            self.frame.term_id,
            self.frame.term_offset as usize + self.frame.aligned_length(),
            self.position_bits_to_shift,
            self.initial_term_id,
        )
    }

    /// Underlying frame header.
    #[inline]
    pub fn frame(&self) -> &DataHeader {
        &self.frame
    }

    #[inline]
    pub fn term_id(&self) -> i32 {
        self.frame.term_id
    }

    #[inline]
    pub fn term_offset(&self) -> i32 {
        self.frame.term_offset
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.frame.session_id
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.frame.stream_id
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.frame.flags
    }

    #[inline]
    pub fn frame_length(&self) -> i32 {
        self.frame.frame_length
    }

    #[inline]
    pub fn reserved_value(&self) -> i64 {
        self.frame.reserved_value
    }

    #[inline]
    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }
}
