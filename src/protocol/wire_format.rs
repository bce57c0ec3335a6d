//! Data frame header encoding and decoding.
//!
//! Implements the 32-byte data header:
//! ```text
//! ┌──────────────┬─────────┬───────┬──────────┐
//! │ Frame Length │ Version │ Flags │ Type     │
//! │ i32 LE       │ u8      │ u8    │ u16 LE   │
//! ├──────────────┴─────────┴───────┴──────────┤
//! │ Term Offset                        i32 LE │
//! │ Session ID                         i32 LE │
//! │ Stream ID                          i32 LE │
//! │ Term ID                            i32 LE │
//! │ Reserved Value                     i64 LE │
//! └───────────────────────────────────────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. `frame_length` covers header
//! plus payload and excludes alignment padding.

use crate::error::{Result, TermwireError};

/// Header size in bytes (fixed, exactly 32).
pub const HEADER_LENGTH: usize = 32;

/// Every frame starts on a multiple of this boundary.
pub const FRAME_ALIGNMENT: usize = 32;

/// Current header version.
pub const CURRENT_VERSION: u8 = 0;

/// Offset of the frame length field.
pub const FRAME_LENGTH_OFFSET: usize = 0;
/// Offset of the version field.
pub const VERSION_OFFSET: usize = 4;
/// Offset of the flags field.
pub const FLAGS_OFFSET: usize = 5;
/// Offset of the frame type field.
pub const TYPE_OFFSET: usize = 6;
/// Offset of the term offset field.
pub const TERM_OFFSET_OFFSET: usize = 8;
/// Offset of the session id field.
pub const SESSION_ID_OFFSET: usize = 12;
/// Offset of the stream id field.
pub const STREAM_ID_OFFSET: usize = 16;
/// Offset of the term id field.
pub const TERM_ID_OFFSET: usize = 20;
/// Offset of the reserved value field.
pub const RESERVED_VALUE_OFFSET: usize = 24;

/// Frame type constants.
pub mod frame_type {
    /// Padding frame filling the tail of a term.
    pub const PAD: u16 = 0;
    /// Application data frame.
    pub const DATA: u16 = 1;
    /// Negative acknowledgement (receiver to sender).
    pub const NAK: u16 = 2;
    /// Status message (receiver to sender).
    pub const SM: u16 = 3;
}

/// Flag constants for the fragment flags byte.
pub mod flags {
    /// First fragment of a message.
    pub const BEGIN_FRAGMENT: u8 = 0b1000_0000;
    /// Last fragment of a message.
    pub const END_FRAGMENT: u8 = 0b0100_0000;
    /// Single-frame message: begin + end = 0xC0.
    pub const UNFRAGMENTED: u8 = BEGIN_FRAGMENT | END_FRAGMENT;

    /// Reserved bits mask (bits 0-5).
    pub const RESERVED_MASK: u8 = 0b0011_1111;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag == flag
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub const fn align(value: usize, alignment: usize) -> usize {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Decoded data frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataHeader {
    /// Header plus payload length in bytes; zero or negative while unpublished.
    pub frame_length: i32,
    /// Header version.
    pub version: u8,
    /// Fragment flags (see `flags` module).
    pub flags: u8,
    /// Frame type (see `frame_type` module).
    pub frame_type: u16,
    /// Offset of this frame within its term.
    pub term_offset: i32,
    /// Publication session.
    pub session_id: i32,
    /// Stream within the channel.
    pub stream_id: i32,
    /// Term this frame belongs to.
    pub term_id: i32,
    /// Application supplied value, zero by default.
    pub reserved_value: i64,
}

impl DataHeader {
    /// Create a data frame header for a payload of `payload_length` bytes.
    pub fn data(
        session_id: i32,
        stream_id: i32,
        term_id: i32,
        term_offset: i32,
        flags: u8,
        payload_length: usize,
    ) -> Self {
        Self {
            frame_length: (HEADER_LENGTH + payload_length) as i32,
            version: CURRENT_VERSION,
            flags,
            frame_type: frame_type::DATA,
            term_offset,
            session_id,
            stream_id,
            term_id,
            reserved_value: 0,
        }
    }

    /// Create a padding frame header covering `length` bytes including itself.
    pub fn padding(session_id: i32, stream_id: i32, term_id: i32, term_offset: i32, length: usize) -> Self {
        Self {
            frame_length: length as i32,
            version: CURRENT_VERSION,
            flags: flags::UNFRAGMENTED,
            frame_type: frame_type::PAD,
            term_offset,
            session_id,
            stream_id,
            term_id,
            reserved_value: 0,
        }
    }

    /// Create a heartbeat: a zero-length data header carrying the sender's position.
    pub fn heartbeat(session_id: i32, stream_id: i32, term_id: i32, term_offset: i32) -> Self {
        Self {
            frame_length: 0,
            version: CURRENT_VERSION,
            flags: flags::UNFRAGMENTED,
            frame_type: frame_type::DATA,
            term_offset,
            session_id,
            stream_id,
            term_id,
            reserved_value: 0,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use termwire::protocol::{DataHeader, flags, HEADER_LENGTH};
    ///
    /// let header = DataHeader::data(7, 1001, 0, 0, flags::UNFRAGMENTED, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_LENGTH);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_LENGTH` (32 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_LENGTH);
        buf[0..4].copy_from_slice(&self.frame_length.to_le_bytes());
        buf[VERSION_OFFSET] = self.version;
        buf[FLAGS_OFFSET] = self.flags;
        buf[6..8].copy_from_slice(&self.frame_type.to_le_bytes());
        buf[8..12].copy_from_slice(&self.term_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.session_id.to_le_bytes());
        buf[16..20].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[20..24].copy_from_slice(&self.term_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.reserved_value.to_le_bytes());
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use termwire::protocol::{DataHeader, flags};
    ///
    /// let header = DataHeader::data(7, 1001, 3, 64, flags::BEGIN_FRAGMENT, 10);
    /// let decoded = DataHeader::decode(&header.encode()).unwrap();
    /// assert_eq!(decoded.term_id, 3);
    /// assert_eq!(decoded.payload_length(), 10);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LENGTH {
            return None;
        }
        Some(Self {
            frame_length: read_i32(buf, FRAME_LENGTH_OFFSET),
            version: buf[VERSION_OFFSET],
            flags: buf[FLAGS_OFFSET],
            frame_type: u16::from_le_bytes([buf[6], buf[7]]),
            term_offset: read_i32(buf, TERM_OFFSET_OFFSET),
            session_id: read_i32(buf, SESSION_ID_OFFSET),
            stream_id: read_i32(buf, STREAM_ID_OFFSET),
            term_id: read_i32(buf, TERM_ID_OFFSET),
            reserved_value: i64::from_le_bytes([
                buf[24], buf[25], buf[26], buf[27], buf[28], buf[29], buf[30], buf[31],
            ]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Version matches `CURRENT_VERSION`
    /// - Frame type is DATA or PAD
    /// - Frame length is either a heartbeat (0) or at least a header
    /// - Frame does not run past the term end
    /// - Reserved flag bits are 0
    pub fn validate(&self, term_length: usize) -> Result<()> {
        if self.version != CURRENT_VERSION {
            return Err(TermwireError::protocol(format!(
                "unsupported frame version {}",
                self.version
            )));
        }

        if self.frame_type != frame_type::DATA && self.frame_type != frame_type::PAD {
            return Err(TermwireError::protocol(format!(
                "unknown frame type {}",
                self.frame_type
            )));
        }

        if self.frame_length != 0 && (self.frame_length as usize) < HEADER_LENGTH {
            return Err(TermwireError::protocol(format!(
                "frame length {} shorter than header",
                self.frame_length
            )));
        }

        if self.term_offset < 0
            || self.term_offset as usize % FRAME_ALIGNMENT != 0
            || self.term_offset as usize + self.aligned_length() > term_length
        {
            return Err(TermwireError::protocol(format!(
                "frame at term offset {} length {} exceeds term length {}",
                self.term_offset, self.frame_length, term_length
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(TermwireError::protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Payload length in bytes (zero for heartbeats).
    #[inline]
    pub fn payload_length(&self) -> usize {
        (self.frame_length.max(0) as usize).saturating_sub(HEADER_LENGTH)
    }

    /// Frame length rounded up to the frame alignment.
    #[inline]
    pub fn aligned_length(&self) -> usize {
        align(self.frame_length.max(0) as usize, FRAME_ALIGNMENT)
    }

    /// Check if this is a padding frame.
    #[inline]
    pub fn is_padding(&self) -> bool {
        self.frame_type == frame_type::PAD
    }

    /// Check if this is a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.frame_type == frame_type::DATA && self.frame_length == 0
    }

    /// Check if this frame begins a message.
    #[inline]
    pub fn is_begin(&self) -> bool {
        flags::has_flag(self.flags, flags::BEGIN_FRAGMENT)
    }

    /// Check if this frame ends a message.
    #[inline]
    pub fn is_end(&self) -> bool {
        flags::has_flag(self.flags, flags::END_FRAGMENT)
    }

    /// Check if this frame carries a whole message.
    #[inline]
    pub fn is_unfragmented(&self) -> bool {
        flags::has_flag(self.flags, flags::UNFRAGMENTED)
    }
}

#[inline]
pub(crate) fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
