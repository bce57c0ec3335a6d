//! Shared term storage.
//!
//! A term is a fixed block of memory that writers append frames into and
//! readers scan concurrently. The storage is a boxed slice of 32-byte aligned
//! slots, one per frame alignment unit, so every frame header starts on a slot
//! boundary and its length word is a real `AtomicI32`.
//!
//! Publication protocol for a frame:
//! 1. store `-frame_length` in the length word (claimed, not readable)
//! 2. copy the rest of the header and the payload
//! 3. store `frame_length` with `Release`
//!
//! Readers load the length word with `Acquire` and treat `<= 0` as "nothing yet".

use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::protocol::{DataHeader, FRAME_ALIGNMENT, HEADER_LENGTH};

/// One frame alignment unit.
#[repr(C, align(32))]
struct Slot([AtomicI32; FRAME_ALIGNMENT / 4]);

impl Slot {
    fn zeroed() -> Self {
        Self(Default::default())
    }
}

/// Fixed-size term shared between writers and readers.
pub struct TermBuffer {
    slots: Box<[Slot]>,
    capacity: usize,
}

impl TermBuffer {
    /// Allocate a zeroed term of `capacity` bytes (a multiple of the frame alignment).
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity % FRAME_ALIGNMENT == 0);
        let slots = (0..capacity / FRAME_ALIGNMENT).map(|_| Slot::zeroed()).collect();
        Self { slots, capacity }
    }

    /// Term length in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn length_word(&self, offset: usize) -> &AtomicI32 {
        debug_assert!(offset % FRAME_ALIGNMENT == 0);
        &self.slots[offset / FRAME_ALIGNMENT].0[0]
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        // Slots are built from atomics, so writing through this pointer is
        // interior mutation.
        self.slots.as_ptr() as *mut u8
    }

    /// Frame length at `offset`, loaded with `Acquire`.
    #[inline]
    pub fn frame_length_volatile(&self, offset: usize) -> i32 {
        self.length_word(offset).load(Ordering::Acquire)
    }

    /// Publish a frame length at `offset` with `Release`.
    #[inline]
    pub fn frame_length_ordered(&self, offset: usize, length: i32) {
        self.length_word(offset).store(length, Ordering::Release);
    }

    /// Write a complete frame and publish it.
    ///
    /// # Safety
    ///
    /// The caller must own `[offset, offset + align(header.frame_length))`
    /// exclusively: claimed through the tail, or being rebuilt by the only
    /// writer of the log. `payload.len()` must equal the header's payload length
    /// (padding frames pass an empty payload).
    pub unsafe fn write_frame(&self, offset: usize, header: &DataHeader, payload: &[u8]) {
        debug_assert!(offset + HEADER_LENGTH + payload.len() <= self.capacity);
        self.length_word(offset).store(-header.frame_length, Ordering::Relaxed);

        let encoded = header.encode();
        // SAFETY: the region is exclusively owned per the contract above and
        // lies within the slice bounds checked by debug_assert.
        ptr::copy_nonoverlapping(
            encoded.as_ptr().add(4),
            self.base().add(offset + 4),
            HEADER_LENGTH - 4,
        );
        ptr::copy_nonoverlapping(
            payload.as_ptr(),
            self.base().add(offset + HEADER_LENGTH),
            payload.len(),
        );

        self.frame_length_ordered(offset, header.frame_length);
    }

    /// Decode the header at `offset`.
    ///
    /// # Safety
    ///
    /// The frame length at `offset` must have been observed positive with
    /// [`frame_length_volatile`](Self::frame_length_volatile).
    pub unsafe fn header_at(&self, offset: usize) -> DataHeader {
        let bytes = self.bytes(offset, HEADER_LENGTH);
        let mut header = DataHeader::decode(bytes).unwrap_or_default();
        header.frame_length = self.frame_length_volatile(offset);
        header
    }

    /// Borrow `length` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// The bytes must belong to frames that were published and observed with
    /// `Acquire`, and no writer may touch them while the slice lives.
    pub unsafe fn bytes(&self, offset: usize, length: usize) -> &[u8] {
        debug_assert!(offset + length <= self.capacity);
        std::slice::from_raw_parts(self.base().add(offset) as *const u8, length)
    }

    /// Zero-fill the whole term.
    ///
    /// # Safety
    ///
    /// No reader or writer may access the term concurrently.
    pub unsafe fn clean(&self) {
        ptr::write_bytes(self.base(), 0, self.capacity);
    }

    /// Zero-fill `[offset, offset + length)`.
    ///
    /// # Safety
    ///
    /// As for [`clean`](Self::clean), restricted to the range.
    pub unsafe fn clean_range(&self, offset: usize, length: usize) {
        debug_assert!(offset + length <= self.capacity);
        ptr::write_bytes(self.base().add(offset), 0, length);
    }
}

impl std::fmt::Debug for TermBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermBuffer")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::flags;

    #[test]
    fn test_new_term_is_zeroed_and_aligned() {
        let term = TermBuffer::new(1024);
        assert_eq!(term.capacity(), 1024);
        assert_eq!(term.base() as usize % FRAME_ALIGNMENT, 0);
        for offset in (0..1024).step_by(FRAME_ALIGNMENT) {
            assert_eq!(term.frame_length_volatile(offset), 0);
        }
    }

    #[test]
    fn test_write_and_read_frame() {
        let term = TermBuffer::new(1024);
        let header = DataHeader::data(7, 9, 3, 64, flags::UNFRAGMENTED, 5);

        unsafe {
            term.write_frame(64, &header, b"hello");
            assert_eq!(term.frame_length_volatile(64), 37);
            assert_eq!(term.header_at(64), header);
            assert_eq!(term.bytes(64 + HEADER_LENGTH, 5), b"hello");
        }
        assert_eq!(term.frame_length_volatile(0), 0);
    }

    #[test]
    fn test_clean() {
        let term = TermBuffer::new(1024);
        let header = DataHeader::data(1, 1, 0, 0, flags::UNFRAGMENTED, 100);
        unsafe {
            term.write_frame(0, &header, &[0xAB; 100]);
            term.write_frame(160, &header, &[0xCD; 100]);

            term.clean_range(160, 160);
            assert_eq!(term.frame_length_volatile(0), 132);
            assert_eq!(term.frame_length_volatile(160), 0);

            term.clean();
            assert_eq!(term.frame_length_volatile(0), 0);
            assert!(term.bytes(0, 1024).iter().all(|b| *b == 0));
        }
    }
}
