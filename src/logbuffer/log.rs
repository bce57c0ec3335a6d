//! Three-partition rotating log.
//!
//! ```text
//!   partition 0        partition 1        partition 2
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ term t       │   │ term t+1     │   │ term t+2     │ ...
//! └──────────────┘   └──────────────┘   └──────────────┘
//!   raw tail 0         raw tail 1         raw tail 2
//! ```
//!
//! Term `t` lives in partition `(t - initial_term_id) % 3`. Each partition has a
//! raw tail packing `(term_id << 32) | term_offset`; writers claim space with a
//! single `fetch_add` on the active partition's tail. The active term count
//! names the partition writers use.
//!
//! When the log enters term `t` the partition that will hold `t + 1` is
//! zero-filled. Flow control keeps every reader within one term of the writer,
//! so no reader can still be scanning that partition.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

use tracing::debug;

use super::term::TermBuffer;

/// Number of term partitions in a log.
pub const PARTITION_COUNT: usize = 3;

/// Position that marks a stream as still open.
const OPEN_END_POSITION: i64 = i64::MAX;

/// Partition index for a term id.
#[inline]
pub fn index_by_term(initial_term_id: i32, term_id: i32) -> usize {
    (term_id.wrapping_sub(initial_term_id) as u32 as usize) % PARTITION_COUNT
}

/// Partition index for a term count.
#[inline]
pub fn index_by_term_count(term_count: i32) -> usize {
    (term_count as u32 as usize) % PARTITION_COUNT
}

/// Shift converting term counts to positions.
#[inline]
pub fn position_bits_to_shift(term_length: usize) -> u32 {
    term_length.trailing_zeros()
}

/// Stream position of `term_offset` within `term_id`.
#[inline]
pub fn compute_position(term_id: i32, term_offset: usize, bits: u32, initial_term_id: i32) -> i64 {
    let term_count = term_id.wrapping_sub(initial_term_id) as i64;
    (term_count << bits) + term_offset as i64
}

/// Stream position at the start of `term_id`.
#[inline]
pub fn compute_term_begin_position(term_id: i32, bits: u32, initial_term_id: i32) -> i64 {
    compute_position(term_id, 0, bits, initial_term_id)
}

/// Term id holding `position`.
#[inline]
pub fn compute_term_id_from_position(position: i64, bits: u32, initial_term_id: i32) -> i32 {
    ((position >> bits) as i32).wrapping_add(initial_term_id)
}

/// Offset of `position` within its term.
#[inline]
pub fn compute_term_offset_from_position(position: i64, bits: u32) -> usize {
    (position & ((1i64 << bits) - 1)) as usize
}

/// Term id packed in a raw tail.
#[inline]
pub fn term_id(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

/// Term offset packed in a raw tail, clamped to the term length.
#[inline]
pub fn term_offset(raw_tail: i64, term_length: usize) -> usize {
    ((raw_tail & 0xFFFF_FFFF) as usize).min(term_length)
}

/// Raw tail for the start of `term_id`.
#[inline]
pub fn pack_tail(term_id: i32, term_offset: usize) -> i64 {
    ((term_id as i64) << 32) | term_offset as i64
}

/// Terms, tails and stream metadata shared by a publication and its images.
#[derive(Debug)]
pub struct LogBuffers {
    terms: [TermBuffer; PARTITION_COUNT],
    tails: [AtomicI64; PARTITION_COUNT],
    active_term_count: AtomicI32,
    rotating: AtomicBool,
    end_of_stream_position: AtomicI64,
    term_length: usize,
    bits: u32,
    initial_term_id: i32,
    session_id: i32,
    stream_id: i32,
}

impl LogBuffers {
    /// Allocate a log positioned at the start of `initial_term_id`.
    ///
    /// `term_length` must be a validated power of two.
    pub fn new(term_length: usize, initial_term_id: i32, session_id: i32, stream_id: i32) -> Self {
        let tails = [
            AtomicI64::new(pack_tail(initial_term_id, 0)),
            AtomicI64::new(pack_tail(initial_term_id.wrapping_sub(2), 0)),
            AtomicI64::new(pack_tail(initial_term_id.wrapping_sub(1), 0)),
        ];
        Self {
            terms: [
                TermBuffer::new(term_length),
                TermBuffer::new(term_length),
                TermBuffer::new(term_length),
            ],
            tails,
            active_term_count: AtomicI32::new(0),
            rotating: AtomicBool::new(false),
            end_of_stream_position: AtomicI64::new(OPEN_END_POSITION),
            term_length,
            bits: position_bits_to_shift(term_length),
            initial_term_id,
            session_id,
            stream_id,
        }
    }

    /// Term for a partition index.
    #[inline]
    pub fn term(&self, index: usize) -> &TermBuffer {
        &self.terms[index]
    }

    /// Term length in bytes.
    #[inline]
    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// Shift converting term counts to positions.
    #[inline]
    pub fn position_bits_to_shift(&self) -> u32 {
        self.bits
    }

    /// Term id of the first term.
    #[inline]
    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    /// Session id stamped on every frame.
    #[inline]
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Stream id stamped on every frame.
    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Active term count.
    #[inline]
    pub fn active_term_count(&self) -> i32 {
        self.active_term_count.load(Ordering::Acquire)
    }

    /// Raw tail of a partition.
    #[inline]
    pub fn raw_tail_volatile(&self, index: usize) -> i64 {
        self.tails[index].load(Ordering::Acquire)
    }

    /// Claim `length` bytes on a partition's tail, returning the previous raw tail.
    #[inline]
    pub fn get_and_add_raw_tail(&self, index: usize, length: usize) -> i64 {
        self.tails[index].fetch_add(length as i64, Ordering::AcqRel)
    }

    /// Position of the next claim on the active term.
    pub fn tail_position(&self) -> i64 {
        let index = index_by_term_count(self.active_term_count());
        let raw_tail = self.raw_tail_volatile(index);
        compute_position(
            term_id(raw_tail),
            term_offset(raw_tail, self.term_length),
            self.bits,
            self.initial_term_id,
        )
    }

    /// Position of `term_offset` within `term_id`.
    #[inline]
    pub fn position(&self, term_id: i32, term_offset: usize) -> i64 {
        compute_position(term_id, term_offset, self.bits, self.initial_term_id)
    }

    /// Split a position into `(partition index, term id, term offset)`.
    #[inline]
    pub fn locate(&self, position: i64) -> (usize, i32, usize) {
        let term_id = compute_term_id_from_position(position, self.bits, self.initial_term_id);
        (
            index_by_term(self.initial_term_id, term_id),
            term_id,
            compute_term_offset_from_position(position, self.bits),
        )
    }

    /// Largest position the term id space can express.
    #[inline]
    pub fn max_possible_position(&self) -> i64 {
        (self.term_length as i64) << 31
    }

    /// Move the log from `term_count`/`term_id` to the next term.
    ///
    /// Returns `true` once the log is at (or past) the next term, `false` when
    /// another writer is mid-rotation and the caller should back off.
    pub fn rotate(&self, term_count: i32, term_id: i32) -> bool {
        if self
            .rotating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        if self.active_term_count.load(Ordering::Acquire) == term_count {
            let next_term_count = term_count.wrapping_add(1);
            let next_term_id = term_id.wrapping_add(1);

            // SAFETY: the partition following the next term held term_id - 1
            // and is beyond every reader and writer under flow control.
            unsafe {
                self.terms[index_by_term_count(next_term_count.wrapping_add(1))].clean();
            }
            self.tails[index_by_term_count(next_term_count)]
                .store(pack_tail(next_term_id, 0), Ordering::Release);
            self.active_term_count.store(next_term_count, Ordering::Release);

            debug!(
                session_id = self.session_id,
                stream_id = self.stream_id,
                term_id = next_term_id,
                "rotated log"
            );
        }

        self.rotating.store(false, Ordering::Release);
        true
    }

    /// Mark the end of the stream at `position`.
    pub fn set_end_of_stream(&self, position: i64) {
        self.end_of_stream_position.store(position, Ordering::Release);
    }

    /// End of stream position, `None` while the stream is open.
    pub fn end_of_stream_position(&self) -> Option<i64> {
        match self.end_of_stream_position.load(Ordering::Acquire) {
            OPEN_END_POSITION => None,
            position => Some(position),
        }
    }
}
