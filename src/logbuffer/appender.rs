//! Claims term space and writes messages as frames.

use super::log::{self, LogBuffers};
use crate::protocol::{align, flags, DataHeader, FRAME_ALIGNMENT, HEADER_LENGTH};

/// Result of one append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Frames written; term offset just past them.
    Appended {
        /// Offset after the last frame.
        resulting_offset: usize,
    },
    /// The claim crossed the term end; the log must rotate.
    Tripped,
    /// The partition already moved on to another term.
    StaleTerm,
}

/// Writes frames into one partition of a log.
pub struct TermAppender<'a> {
    log: &'a LogBuffers,
    index: usize,
}

impl<'a> TermAppender<'a> {
    /// Appender for partition `index`.
    pub fn new(log: &'a LogBuffers, index: usize) -> Self {
        Self { log, index }
    }

    /// Append a message that fits in one frame.
    pub fn append_unfragmented(&self, payload: &[u8], active_term_id: i32) -> AppendOutcome {
        let frame_length = HEADER_LENGTH + payload.len();
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);

        let (term_id, term_offset) = match self.claim(aligned_length, active_term_id) {
            Ok(claimed) => claimed,
            Err(outcome) => return outcome,
        };

        let header = DataHeader::data(
            self.log.session_id(),
            self.log.stream_id(),
            term_id,
            term_offset as i32,
            flags::UNFRAGMENTED,
            payload.len(),
        );
        // SAFETY: [term_offset, term_offset + aligned_length) was claimed above.
        unsafe {
            self.log
                .term(self.index)
                .write_frame(term_offset, &header, payload)
        };

        AppendOutcome::Appended {
            resulting_offset: term_offset + aligned_length,
        }
    }

    /// Append a message split into frames of at most `max_payload_length` bytes.
    ///
    /// The whole message is claimed at once, so its frames are contiguous.
    pub fn append_fragmented(
        &self,
        payload: &[u8],
        max_payload_length: usize,
        active_term_id: i32,
    ) -> AppendOutcome {
        let full_frames = payload.len() / max_payload_length;
        let remaining = payload.len() % max_payload_length;
        let last_frame_length = if remaining > 0 {
            align(remaining + HEADER_LENGTH, FRAME_ALIGNMENT)
        } else {
            0
        };
        let required_length = full_frames
            * align(max_payload_length + HEADER_LENGTH, FRAME_ALIGNMENT)
            + last_frame_length;

        let (term_id, term_offset) = match self.claim(required_length, active_term_id) {
            Ok(claimed) => claimed,
            Err(outcome) => return outcome,
        };

        let term = self.log.term(self.index);
        let mut frame_offset = term_offset;
        let mut frame_flags = flags::BEGIN_FRAGMENT;
        let mut remaining = payload;
        while !remaining.is_empty() {
            let chunk_length = remaining.len().min(max_payload_length);
            let (chunk, rest) = remaining.split_at(chunk_length);
            if rest.is_empty() {
                frame_flags |= flags::END_FRAGMENT;
            }

            let header = DataHeader::data(
                self.log.session_id(),
                self.log.stream_id(),
                term_id,
                frame_offset as i32,
                frame_flags,
                chunk_length,
            );
            // SAFETY: every frame lies inside the claimed region.
            unsafe { term.write_frame(frame_offset, &header, chunk) };

            frame_offset += align(HEADER_LENGTH + chunk_length, FRAME_ALIGNMENT);
            frame_flags = 0;
            remaining = rest;
        }

        AppendOutcome::Appended {
            resulting_offset: term_offset + required_length,
        }
    }

    /// Claim `length` bytes, writing end-of-term padding when the claim trips.
    fn claim(&self, length: usize, active_term_id: i32) -> Result<(i32, usize), AppendOutcome> {
        let raw_tail = self.log.get_and_add_raw_tail(self.index, length);
        let term_id = log::term_id(raw_tail);
        if term_id != active_term_id {
            return Err(AppendOutcome::StaleTerm);
        }

        let term_length = self.log.term_length();
        let term_offset = (raw_tail & 0xFFFF_FFFF) as usize;
        if term_offset + length > term_length {
            if term_offset < term_length {
                self.pad_to_end(term_id, term_offset);
            }
            return Err(AppendOutcome::Tripped);
        }

        Ok((term_id, term_offset))
    }

    fn pad_to_end(&self, term_id: i32, term_offset: usize) {
        let length = self.log.term_length() - term_offset;
        let header = DataHeader::padding(
            self.log.session_id(),
            self.log.stream_id(),
            term_id,
            term_offset as i32,
            length,
        );
        // SAFETY: the tripping claim owns everything from its offset to the term end.
        unsafe { self.log.term(self.index).write_frame(term_offset, &header, &[]) };
    }
}
