//! Publication - the writing end of a stream.
//!
//! A [`Publication`] appends messages to a shared [`LogBuffers`] without
//! blocking. Every call either returns the new stream position or a
//! transport-local [`OfferError`] the caller retries or escalates.
//!
//! # Flow control
//!
//! Consumers (IPC images or a network sender) register their position with
//! the publication. Offers are accepted while the tail is below
//!
//! ```text
//! publication_limit = min(consumer positions) + window
//! ```
//!
//! With no consumer registered the publication is `NOT_CONNECTED`.
//!
//! # Example
//!
//! ```
//! use termwire::{Publication, Subscription};
//! use termwire::config::TransportConfig;
//!
//! let publication = Publication::new(&TransportConfig::default(), 7, 1001).unwrap();
//! let mut subscription = Subscription::new(1001);
//! subscription.add_image(publication.image());
//!
//! assert!(publication.offer(b"hello") > 0);
//!
//! let mut received = Vec::new();
//! subscription.poll(|payload, _header| received.push(payload.to_vec()), 10);
//! assert_eq!(received, vec![b"hello".to_vec()]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::TransportConfig;
use crate::error::{OfferError, Result};
use crate::image::Image;
use crate::logbuffer::{
    compute_term_begin_position, index_by_term_count, term_id, term_offset, AppendOutcome,
    LogBuffers, TermAppender,
};

/// Registry of consumer positions driving flow control.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    positions: Mutex<Vec<(u64, Arc<AtomicI64>)>>,
    count: AtomicUsize,
    next_id: AtomicU64,
}

impl ConsumerRegistry {
    /// Register a consumer starting at `position`.
    pub fn register(self: &Arc<Self>, position: i64) -> ConsumerPosition {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(AtomicI64::new(position));
        let mut positions = self.positions.lock();
        positions.push((id, shared.clone()));
        self.count.store(positions.len(), Ordering::Release);
        ConsumerPosition {
            id,
            position: shared,
            registry: self.clone(),
        }
    }

    fn deregister(&self, id: u64) {
        let mut positions = self.positions.lock();
        positions.retain(|(consumer, _)| *consumer != id);
        self.count.store(positions.len(), Ordering::Release);
    }

    /// Lowest consumer position, `None` without consumers.
    pub fn min_position(&self) -> Option<i64> {
        self.positions
            .lock()
            .iter()
            .map(|(_, position)| position.load(Ordering::Acquire))
            .min()
    }

    /// Number of registered consumers.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether no consumer is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered consumer position; deregisters on drop.
#[derive(Debug)]
pub struct ConsumerPosition {
    id: u64,
    position: Arc<AtomicI64>,
    registry: Arc<ConsumerRegistry>,
}

impl ConsumerPosition {
    /// Current position.
    #[inline]
    pub fn get(&self) -> i64 {
        self.position.load(Ordering::Acquire)
    }

    /// Publish a new position.
    #[inline]
    pub fn set(&self, position: i64) {
        self.position.store(position, Ordering::Release);
    }
}

impl Drop for ConsumerPosition {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

/// State shared by all handles of one publication.
#[derive(Debug)]
struct Inner {
    log: Arc<LogBuffers>,
    consumers: Arc<ConsumerRegistry>,
    publication_limit: AtomicI64,
    window: i64,
    max_payload_length: usize,
    max_message_length: usize,
    closed: AtomicBool,
}

/// Writing end of a stream. Cheap to clone, `Send + Sync`.
#[derive(Debug, Clone)]
pub struct Publication {
    inner: Arc<Inner>,
}

impl Publication {
    /// Create a publication with a fresh log.
    pub fn new(config: &TransportConfig, session_id: i32, stream_id: i32) -> Result<Self> {
        config.validate()?;
        let log = LogBuffers::new(
            config.term_length,
            config.initial_term_id,
            session_id,
            stream_id,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                log: Arc::new(log),
                consumers: Arc::new(ConsumerRegistry::default()),
                publication_limit: AtomicI64::new(0),
                window: config.publication_window() as i64,
                max_payload_length: config.max_payload_length(),
                max_message_length: config.max_message_length(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Offer a message, returning the new position or a negative sentinel.
    ///
    /// See [`try_offer`](Self::try_offer) for the typed form.
    pub fn offer(&self, payload: &[u8]) -> i64 {
        match self.try_offer(payload) {
            Ok(position) => position,
            Err(e) => e.code(),
        }
    }

    /// Offer a message, returning the position just past it.
    ///
    /// Messages longer than the MTU payload are fragmented. A claim that
    /// crosses the term end pads the term, rotates the log and retries once.
    pub fn try_offer(&self, payload: &[u8]) -> std::result::Result<i64, OfferError> {
        let inner = &*self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(OfferError::Closed);
        }
        if payload.len() > inner.max_message_length {
            return Err(OfferError::MessageTooLong {
                length: payload.len(),
                max: inner.max_message_length,
            });
        }
        if inner.consumers.is_empty() {
            return Err(OfferError::NotConnected);
        }

        let log = &*inner.log;
        for _ in 0..2 {
            let term_count = log.active_term_count();
            let index = index_by_term_count(term_count);
            let raw_tail = log.raw_tail_volatile(index);
            let active_term_id = term_id(raw_tail);
            if active_term_id.wrapping_sub(log.initial_term_id()) != term_count {
                return Err(OfferError::AdminAction);
            }

            let term_begin = compute_term_begin_position(
                active_term_id,
                log.position_bits_to_shift(),
                log.initial_term_id(),
            );
            let position = term_begin + term_offset(raw_tail, log.term_length()) as i64;
            if position >= self.publication_limit(position)? {
                return Err(OfferError::BackPressured);
            }

            let appender = TermAppender::new(log, index);
            let outcome = if payload.len() <= inner.max_payload_length {
                appender.append_unfragmented(payload, active_term_id)
            } else {
                appender.append_fragmented(payload, inner.max_payload_length, active_term_id)
            };

            match outcome {
                AppendOutcome::Appended { resulting_offset } => {
                    return Ok(term_begin + resulting_offset as i64)
                }
                AppendOutcome::StaleTerm => return Err(OfferError::AdminAction),
                AppendOutcome::Tripped => {
                    if term_begin + log.term_length() as i64 >= log.max_possible_position() {
                        return Err(OfferError::MaxPositionExceeded);
                    }
                    if !log.rotate(term_count, active_term_id) {
                        return Err(OfferError::AdminAction);
                    }
                }
            }
        }

        Err(OfferError::AdminAction)
    }

    /// Cached limit, refreshed from the consumers once `position` reaches it.
    fn publication_limit(&self, position: i64) -> std::result::Result<i64, OfferError> {
        let inner = &*self.inner;
        let cached = inner.publication_limit.load(Ordering::Acquire);
        if position < cached {
            return Ok(cached);
        }
        let min = inner
            .consumers
            .min_position()
            .ok_or(OfferError::NotConnected)?;
        let limit = min + inner.window;
        inner.publication_limit.store(limit, Ordering::Release);
        Ok(limit)
    }

    /// Create an IPC image joined at the current position.
    pub fn image(&self) -> Image {
        let log = self.inner.log.clone();
        let consumer = self.register_consumer();
        Image::new(log, consumer)
    }

    /// Register a consumer at the current position.
    pub(crate) fn register_consumer(&self) -> ConsumerPosition {
        let consumer = self.inner.consumers.register(self.position());
        debug!(
            session_id = self.session_id(),
            stream_id = self.stream_id(),
            position = consumer.get(),
            "consumer joined"
        );
        consumer
    }

    /// Shared log.
    pub(crate) fn log(&self) -> &Arc<LogBuffers> {
        &self.inner.log
    }

    /// Position of the next message.
    pub fn position(&self) -> i64 {
        self.inner.log.tail_position()
    }

    /// Position at which offers become back pressured.
    pub fn position_limit(&self) -> i64 {
        self.inner.publication_limit.load(Ordering::Acquire)
    }

    /// Largest payload per frame.
    #[inline]
    pub fn max_payload_length(&self) -> usize {
        self.inner.max_payload_length
    }

    /// Largest accepted message.
    #[inline]
    pub fn max_message_length(&self) -> usize {
        self.inner.max_message_length
    }

    #[inline]
    pub fn session_id(&self) -> i32 {
        self.inner.log.session_id()
    }

    #[inline]
    pub fn stream_id(&self) -> i32 {
        self.inner.log.stream_id()
    }

    #[inline]
    pub fn term_length(&self) -> usize {
        self.inner.log.term_length()
    }

    #[inline]
    pub fn initial_term_id(&self) -> i32 {
        self.inner.log.initial_term_id()
    }

    /// Whether at least one consumer is registered.
    pub fn is_connected(&self) -> bool {
        !self.inner.consumers.is_empty()
    }

    /// Close the publication; later offers return `CLOSED`.
    ///
    /// Images may still drain everything written before the close.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let position = self.position();
            self.inner.log.set_end_of_stream(position);
            debug!(
                session_id = self.session_id(),
                stream_id = self.stream_id(),
                position,
                "publication closed"
            );
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
