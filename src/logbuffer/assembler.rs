//! Fragment reassembly.
//!
//! Uses `bytes::BytesMut` to accumulate the fragments of one message.
//! Implements a small state machine:
//! - `Idle`: waiting for a BEGIN fragment; orphan middle/end fragments are dropped
//! - `Assembling`: BEGIN seen, appending until END
//!
//! Each fragment must start where the previous one ended in the same term. A
//! fragment that does not (a gap was padded over) discards the partial message.
//!
//! Unfragmented messages pass straight through without copying.
//!
//! # Example
//!
//! ```
//! use termwire::logbuffer::FragmentAssembler;
//! use termwire::protocol::{flags, DataHeader};
//!
//! let mut assembler = FragmentAssembler::new();
//!
//! let begin = DataHeader::data(1, 1, 0, 0, flags::BEGIN_FRAGMENT, 3);
//! // BEGIN occupies 32 + 3 bytes, aligned to 64.
//! let end = DataHeader::data(1, 1, 0, 64, flags::END_FRAGMENT, 3);
//!
//! assert!(assembler.on_fragment(b"abc", &begin).is_none());
//! assert_eq!(assembler.on_fragment(b"def", &end), Some(&b"abcdef"[..]));
//! ```

use bytes::BytesMut;
use tracing::debug;

use crate::protocol::DataHeader;

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the first fragment of a message.
    Idle,
    /// Accumulating fragments of `session_id`; the next one must sit at
    /// `next_term_offset` of `term_id`.
    Assembling {
        session_id: i32,
        term_id: i32,
        next_term_offset: i32,
    },
}

/// Accumulates fragments into whole messages.
#[derive(Debug)]
pub struct FragmentAssembler {
    buffer: BytesMut,
    state: State,
    last_fragment_length: usize,
}

impl FragmentAssembler {
    /// Create an assembler with a 4 KiB initial buffer.
    pub fn new() -> Self {
        Self::with_capacity(4 * 1024)
    }

    /// Create an assembler with a custom initial buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::Idle,
            last_fragment_length: 0,
        }
    }

    /// Feed one fragment.
    ///
    /// Returns the complete message when `header` ends one: `payload` itself
    /// for an unfragmented frame, otherwise the accumulated bytes.
    pub fn on_fragment<'a>(&'a mut self, payload: &'a [u8], header: &DataHeader) -> Option<&'a [u8]> {
        if header.is_unfragmented() {
            if self.is_assembling() {
                debug!(session_id = header.session_id, "dropping incomplete message");
                self.reset();
            }
            self.last_fragment_length = 0;
            return Some(payload);
        }

        if header.is_begin() {
            if self.is_assembling() {
                debug!(session_id = header.session_id, "dropping incomplete message");
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(payload);
            self.state = State::Assembling {
                session_id: header.session_id,
                term_id: header.term_id,
                next_term_offset: next_offset(header),
            };
            return None;
        }

        match self.state {
            State::Assembling {
                session_id,
                term_id,
                next_term_offset,
            } if session_id == header.session_id => {
                if term_id != header.term_id || next_term_offset != header.term_offset {
                    debug!(
                        session_id,
                        expected = next_term_offset,
                        actual = header.term_offset,
                        "fragment out of sequence, dropping incomplete message"
                    );
                    self.reset();
                    return None;
                }
                self.buffer.extend_from_slice(payload);
                if header.is_end() {
                    self.state = State::Idle;
                    self.last_fragment_length = payload.len();
                    Some(&self.buffer[..])
                } else {
                    self.state = State::Assembling {
                        session_id,
                        term_id,
                        next_term_offset: next_offset(header),
                    };
                    None
                }
            }
            // Joined mid-message or lost the BEGIN.
            _ => None,
        }
    }

    /// Undo the last completed multi-fragment message so its END fragment can
    /// be fed again.
    pub fn rewind(&mut self, header: &DataHeader) {
        if !header.is_unfragmented() && header.is_end() {
            let length = self.buffer.len() - self.last_fragment_length;
            self.buffer.truncate(length);
            self.state = State::Assembling {
                session_id: header.session_id,
                term_id: header.term_id,
                next_term_offset: header.term_offset,
            };
        }
    }

    /// Whether a message is partially assembled.
    #[inline]
    pub fn is_assembling(&self) -> bool {
        matches!(self.state, State::Assembling { .. })
    }

    /// Bytes accumulated so far.
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::Idle;
    }
}

/// Term offset just past `header`'s frame.
#[inline]
fn next_offset(header: &DataHeader) -> i32 {
    header.term_offset + header.aligned_length() as i32
}

impl Default for FragmentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    fn fragment(flags: u8, term_offset: i32, len: usize) -> DataHeader {
        DataHeader::data(1, 1, 0, term_offset, flags, len)
    }

    #[test]
    fn test_unfragmented_passes_through() {
        let mut assembler = FragmentAssembler::new();
        let payload = b"hello";
        let message = assembler
            .on_fragment(payload, &fragment(flags::UNFRAGMENTED, 0, 5))
            .unwrap();
        assert_eq!(message.as_ptr(), payload.as_ptr());
    }

    #[test]
    fn test_three_fragments() {
        let mut assembler = FragmentAssembler::new();
        assert!(assembler
            .on_fragment(b"aa", &fragment(flags::BEGIN_FRAGMENT, 0, 2))
            .is_none());
        assert!(assembler.on_fragment(b"bb", &fragment(0, 64, 2)).is_none());
        assert_eq!(assembler.buffered_len(), 4);

        let message = assembler
            .on_fragment(b"cc", &fragment(flags::END_FRAGMENT, 128, 2))
            .unwrap();
        assert_eq!(message, b"aabbcc");
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_orphan_fragments_dropped() {
        let mut assembler = FragmentAssembler::new();
        assert!(assembler.on_fragment(b"bb", &fragment(0, 64, 2)).is_none());
        assert!(assembler
            .on_fragment(b"cc", &fragment(flags::END_FRAGMENT, 128, 2))
            .is_none());
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_new_begin_discards_partial() {
        let mut assembler = FragmentAssembler::new();
        assembler.on_fragment(b"old", &fragment(flags::BEGIN_FRAGMENT, 0, 3));
        assembler.on_fragment(b"new", &fragment(flags::BEGIN_FRAGMENT, 64, 3));
        let message = assembler
            .on_fragment(b"!", &fragment(flags::END_FRAGMENT, 128, 1))
            .unwrap();
        assert_eq!(message, b"new!");
    }

    #[test]
    fn test_other_session_ignored() {
        let mut assembler = FragmentAssembler::new();
        assembler.on_fragment(b"a", &fragment(flags::BEGIN_FRAGMENT, 0, 1));
        let other = DataHeader::data(2, 1, 0, 0, flags::END_FRAGMENT, 1);
        assert!(assembler.on_fragment(b"b", &other).is_none());
        assert!(assembler.is_assembling());
    }

    #[test]
    fn test_rewind_redelivers() {
        let mut assembler = FragmentAssembler::new();
        let end = fragment(flags::END_FRAGMENT, 64, 2);
        assembler.on_fragment(b"ab", &fragment(flags::BEGIN_FRAGMENT, 0, 2));
        assert_eq!(assembler.on_fragment(b"cd", &end).unwrap(), b"abcd");

        assembler.rewind(&end);
        assert!(assembler.is_assembling());
        assert_eq!(assembler.on_fragment(b"cd", &end).unwrap(), b"abcd");
    }

    #[test]
    fn test_gap_between_fragments_drops_message() {
        let mut assembler = FragmentAssembler::new();
        assembler.on_fragment(b"aa", &fragment(flags::BEGIN_FRAGMENT, 0, 2));
        // The middle fragment at 64 never arrived.
        assert!(assembler
            .on_fragment(b"cc", &fragment(flags::END_FRAGMENT, 128, 2))
            .is_none());
        assert!(!assembler.is_assembling());
        assert_eq!(assembler.buffered_len(), 0);

        assembler.on_fragment(b"xx", &fragment(flags::BEGIN_FRAGMENT, 160, 2));
        let message = assembler
            .on_fragment(b"yy", &fragment(flags::END_FRAGMENT, 224, 2))
            .unwrap();
        assert_eq!(message, b"xxyy");
    }

    #[test]
    fn test_fragment_from_other_term_drops_message() {
        let mut assembler = FragmentAssembler::new();
        assembler.on_fragment(b"aa", &fragment(flags::BEGIN_FRAGMENT, 0, 2));
        let next_term = DataHeader::data(1, 1, 1, 64, flags::END_FRAGMENT, 2);
        assert!(assembler.on_fragment(b"bb", &next_term).is_none());
        assert!(!assembler.is_assembling());
    }
}
