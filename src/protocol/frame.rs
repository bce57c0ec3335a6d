//! Owned frame with typed accessors.
//!
//! Represents a complete frame (header + payload) detached from any term
//! buffer, e.g. a datagram on the simulated network medium.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use termwire::protocol::{Frame, DataHeader, flags};
//! use bytes::Bytes;
//!
//! let header = DataHeader::data(7, 1001, 0, 0, flags::UNFRAGMENTED, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.term_id(), 0);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{DataHeader, HEADER_LENGTH};

/// A complete frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: DataHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: DataHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a frame from header and raw bytes (copies data).
    pub fn from_parts(header: DataHeader, payload: &[u8]) -> Self {
        Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Parse a datagram into a frame.
    ///
    /// Padding frames travel as a bare header. Returns `None` if the datagram
    /// is shorter than a header or shorter than the data frame it declares.
    pub fn parse(datagram: &Bytes) -> Option<Self> {
        let header = DataHeader::decode(datagram)?;
        let frame_length = header.frame_length.max(0) as usize;
        if frame_length == 0 || header.is_padding() {
            return Some(Self::new(header, Bytes::new()));
        }
        if datagram.len() < frame_length {
            return None;
        }
        Some(Self::new(header, datagram.slice(HEADER_LENGTH..frame_length)))
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the term id.
    #[inline]
    pub fn term_id(&self) -> i32 {
        self.header.term_id
    }

    /// Get the term offset.
    #[inline]
    pub fn term_offset(&self) -> i32 {
        self.header.term_offset
    }

    /// Get the session id.
    #[inline]
    pub fn session_id(&self) -> i32 {
        self.header.session_id
    }

    /// Get the stream id.
    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.header.stream_id
    }

    /// Check if this is a padding frame.
    #[inline]
    pub fn is_padding(&self) -> bool {
        self.header.is_padding()
    }

    /// Check if this is a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.header.is_heartbeat()
    }

    /// Encode back into a contiguous datagram.
    pub fn to_bytes(&self) -> Bytes {
        build_frame(&self.header, &self.payload)
    }
}

/// Build a complete frame as a single contiguous buffer.
///
/// # Example
///
/// ```
/// use termwire::protocol::{build_frame, DataHeader, flags, HEADER_LENGTH};
///
/// let header = DataHeader::data(1, 1, 0, 0, flags::UNFRAGMENTED, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), HEADER_LENGTH + 5);
/// ```
pub fn build_frame(header: &DataHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.freeze()
}
