//! Frame-at-a-time scanning of a term.

use super::term::TermBuffer;
use crate::protocol::{align, DataHeader, FRAME_ALIGNMENT, HEADER_LENGTH};

/// What sits at a term offset.
#[derive(Debug)]
pub enum Scanned<'a> {
    /// No published frame yet (or a gap).
    Nothing,
    /// Padding covering `length` bytes.
    Padding {
        /// Header of the padding frame.
        header: DataHeader,
        /// Aligned length to skip.
        length: usize,
    },
    /// A data frame.
    Fragment {
        /// Frame header.
        header: DataHeader,
        /// Payload bytes in the term.
        payload: &'a [u8],
        /// Aligned length to skip.
        length: usize,
    },
}

/// Inspect the frame at `offset`.
///
/// Only frames whose length was observed positive are returned, and the
/// writer never touches a published frame until its partition is cleaned,
/// which flow control keeps away from any live reader.
pub(crate) fn scan(term: &TermBuffer, offset: usize) -> Scanned<'_> {
    if offset >= term.capacity() {
        return Scanned::Nothing;
    }

    let frame_length = term.frame_length_volatile(offset);
    if frame_length <= 0 {
        return Scanned::Nothing;
    }

    // SAFETY: the Acquire load above observed a published frame.
    let header = unsafe { term.header_at(offset) };
    let length = align(frame_length as usize, FRAME_ALIGNMENT);
    if header.is_padding() {
        return Scanned::Padding { header, length };
    }

    let payload_length = frame_length as usize - HEADER_LENGTH;
    // SAFETY: as above; the payload is part of the published frame.
    let payload = unsafe { term.bytes(offset + HEADER_LENGTH, payload_length) };
    Scanned::Fragment {
        header,
        payload,
        length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_scan() {
        let term = TermBuffer::new(1024);
        let data = DataHeader::data(1, 1, 0, 0, flags::UNFRAGMENTED, 3);
        let pad = DataHeader::padding(1, 1, 0, 64, 960);
        unsafe {
            term.write_frame(0, &data, b"abc");
            term.write_frame(64, &pad, &[]);
        }

        match scan(&term, 0) {
            Scanned::Fragment {
                header,
                payload,
                length,
            } => {
                assert_eq!(header, data);
                assert_eq!(payload, b"abc");
                assert_eq!(length, 64);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(scan(&term, 64), Scanned::Padding { length: 960, .. }));
        assert!(matches!(scan(&term, 1024), Scanned::Nothing));
    }

    #[test]
    fn test_scan_unpublished() {
        let term = TermBuffer::new(1024);
        assert!(matches!(scan(&term, 0), Scanned::Nothing));

        term.frame_length_ordered(32, -64);
        assert!(matches!(scan(&term, 32), Scanned::Nothing));
    }
}
