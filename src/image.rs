//! Image - one publication's stream as seen by a subscriber.
//!
//! An image owns a consumer position in the log. Polling scans published
//! frames from that position, skips padding, reassembles fragments and hands
//! each complete message to the handler exactly once, in position order.
//! Scanning stops at the first unpublished slot, so nothing past a gap is
//! delivered until the gap is filled.

use std::sync::Arc;

use bytes::Bytes;

use crate::logbuffer::{scan, FragmentAssembler, Header, LogBuffers, Scanned};
use crate::publication::ConsumerPosition;

/// What a controlled handler wants done after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlledAction {
    /// Consume the message and keep going.
    Continue,
    /// Consume the message and stop this poll.
    Break,
    /// Stop without consuming; the message is delivered again next poll.
    Abort,
}

/// Owned message yielded by [`Image::messages`].
#[derive(Debug, Clone)]
pub struct Message {
    /// Position just past the message.
    pub position: i64,
    /// Header of the last fragment.
    pub header: Header,
    /// Reassembled payload.
    pub payload: Bytes,
}

/// Reading end of one publication's log.
#[derive(Debug)]
pub struct Image {
    log: Arc<LogBuffers>,
    consumer: Option<ConsumerPosition>,
    position: i64,
    join_position: i64,
    assembler: FragmentAssembler,
}

impl Image {
    /// Image reading `log` from the consumer's current position.
    pub(crate) fn new(log: Arc<LogBuffers>, consumer: ConsumerPosition) -> Self {
        let position = consumer.get();
        Self {
            log,
            consumer: Some(consumer),
            position,
            join_position: position,
            assembler: FragmentAssembler::new(),
        }
    }

    /// Deliver up to `fragment_limit` fragments worth of messages.
    ///
    /// Returns the number of fragments consumed (padding excluded).
    pub fn poll<F>(&mut self, mut handler: F, fragment_limit: usize) -> usize
    where
        F: FnMut(&[u8], &Header),
    {
        let result: Result<usize, std::convert::Infallible> = self.controlled_poll(
            |payload, header| {
                handler(payload, header);
                Ok(ControlledAction::Continue)
            },
            fragment_limit,
        );
        match result {
            Ok(fragments) => fragments,
            Err(never) => match never {},
        }
    }

    /// Like [`poll`](Self::poll) but the handler steers consumption.
    ///
    /// A handler error stops the poll without consuming the message and is
    /// returned to the caller.
    pub fn controlled_poll<F, E>(&mut self, mut handler: F, fragment_limit: usize) -> Result<usize, E>
    where
        F: FnMut(&[u8], &Header) -> Result<ControlledAction, E>,
    {
        if self.consumer.is_none() {
            return Ok(0);
        }

        let (index, _, start) = self.log.locate(self.position);
        let term = self.log.term(index);
        let initial_term_id = self.log.initial_term_id();
        let bits = self.log.position_bits_to_shift();

        let mut offset = start;
        let mut fragments = 0;
        let mut outcome = Ok(());
        while fragments < fragment_limit {
            match scan(term, offset) {
                Scanned::Nothing => break,
                Scanned::Padding { length, .. } => offset += length,
                Scanned::Fragment {
                    header,
                    payload,
                    length,
                } => {
                    let action = match self.assembler.on_fragment(payload, &header) {
                        Some(message) => {
                            let view = Header::new(header, initial_term_id, bits);
                            handler(message, &view)
                        }
                        None => Ok(ControlledAction::Continue),
                    };

                    match action {
                        Ok(ControlledAction::Continue) => {
                            offset += length;
                            fragments += 1;
                        }
                        Ok(ControlledAction::Break) => {
                            offset += length;
                            fragments += 1;
                            break;
                        }
                        Ok(ControlledAction::Abort) => {
                            self.assembler.rewind(&header);
                            break;
                        }
                        Err(e) => {
                            self.assembler.rewind(&header);
                            outcome = Err(e);
                            break;
                        }
                    }
                }
            }
        }

        if offset != start {
            self.position += (offset - start) as i64;
            if let Some(consumer) = &self.consumer {
                consumer.set(self.position);
            }
        }

        outcome.map(|()| fragments)
    }

    /// Pull-based iteration over complete messages.
    ///
    /// The iterator consumes at most `fragment_limit` fragments and ends when
    /// no more data is available; call again to continue. End-of-term padding
    /// does not end it.
    pub fn messages(&mut self, fragment_limit: usize) -> Messages<'_> {
        Messages {
            image: self,
            remaining: fragment_limit,
        }
    }

    /// Current consumer position.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Position the image joined the stream at.
    #[inline]
    pub fn join_position(&self) -> i64 {
        self.join_position
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.log.session_id()
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.log.stream_id()
    }

    #[inline]
    pub fn term_length(&self) -> usize {
        self.log.term_length()
    }

    /// Whether the publisher closed and everything it wrote was consumed.
    pub fn is_end_of_stream(&self) -> bool {
        self.log
            .end_of_stream_position()
            .map_or(false, |end| self.position >= end)
    }

    /// Whether the image was closed or its stream fully drained.
    pub fn is_closed(&self) -> bool {
        self.consumer.is_none() || self.is_end_of_stream()
    }

    /// Stop consuming and release the flow-control registration.
    pub fn close(&mut self) {
        self.consumer = None;
        self.assembler.reset();
    }
}

/// Iterator returned by [`Image::messages`].
#[derive(Debug)]
pub struct Messages<'a> {
    image: &'a mut Image,
    remaining: usize,
}

impl Iterator for Messages<'_> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        while self.remaining > 0 {
            let mut message = None;
            let before = self.image.position();
            let consumed = self.image.poll(
                |payload, header| {
                    message = Some(Message {
                        position: header.position(),
                        header: *header,
                        payload: Bytes::copy_from_slice(payload),
                    })
                },
                1,
            );
            // Padding moves the position without yielding a fragment.
            if consumed == 0 && self.image.position() == before {
                return None;
            }
            self.remaining -= consumed;
            if message.is_some() {
                return message;
            }
        }
        None
    }
}
