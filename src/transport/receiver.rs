//! Network receiver - rebuilds a publication's log from datagrams.
//!
//! Frames are inserted at their term offset in the receiver's own log, in
//! whatever order they arrive. Two positions track progress:
//!
//! ```text
//!   rebuild position          high-water mark
//!         │                         │
//! ────────┼──────────┬──────┬───────┼────────
//!  contiguous        │ gap  │ frames│
//! ```
//!
//! The image reads up to the first gap. Gaps are NAKed on a timer and, once
//! retries are exhausted, filled with padding so the stream moves on.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::loss::LossGenerator;
use super::loss_detector::{Gap, LossAction, LossDetector};
use super::medium::{DatagramReceiver, DatagramSender};
use super::status::{ControlMessage, Nak, StatusMessage};
use super::Agent;
use crate::config::TransportConfig;
use crate::error::Result;
use crate::logbuffer::{index_by_term_count, LogBuffers};
use crate::protocol::{align, DataHeader, Frame, FRAME_ALIGNMENT};
use crate::publication::ConsumerRegistry;

/// Receiver statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverCounters {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub duplicates: u64,
    pub invalid_frames: u64,
    pub heartbeats_received: u64,
    pub naks_sent: u64,
    pub gaps_skipped: u64,
    pub bytes_skipped: u64,
    pub status_messages_sent: u64,
}

/// Receiving half of a network stream.
pub struct NetworkReceiver {
    log: Arc<LogBuffers>,
    consumers: Arc<ConsumerRegistry>,
    data_rx: DatagramReceiver,
    control_tx: DatagramSender,
    loss: Box<dyn LossGenerator>,
    loss_detector: LossDetector,
    rebuild_position: i64,
    hwm_position: i64,
    cleaned_term_count: i32,
    accept_window: i64,
    receiver_window: i32,
    status_interval_ns: i64,
    last_status: Option<(i64, i64)>,
    max_datagrams_per_cycle: usize,
    counters: ReceiverCounters,
}

impl NetworkReceiver {
    pub(crate) fn new(
        log: Arc<LogBuffers>,
        consumers: Arc<ConsumerRegistry>,
        join_position: i64,
        config: &TransportConfig,
        data_rx: DatagramReceiver,
        control_tx: DatagramSender,
        loss: Box<dyn LossGenerator>,
    ) -> Self {
        let (_, join_term_id, _) = log.locate(join_position);
        let join_term_count = join_term_id.wrapping_sub(log.initial_term_id());
        Self {
            log,
            consumers,
            data_rx,
            control_tx,
            loss,
            loss_detector: LossDetector::new(
                config.nak_delay,
                config.nak_retry_interval,
                config.max_nak_retries,
            ),
            rebuild_position: join_position,
            hwm_position: join_position,
            // A fresh log has every partition clean.
            cleaned_term_count: join_term_count.wrapping_add(2),
            accept_window: (config.receiver_window() + config.mtu_length) as i64,
            receiver_window: config.receiver_window() as i32,
            status_interval_ns: config.status_message_interval.as_nanos() as i64,
            last_status: None,
            max_datagrams_per_cycle: config.max_datagrams_per_cycle,
            counters: ReceiverCounters::default(),
        }
    }

    /// End of the contiguous data.
    #[inline]
    pub fn rebuild_position(&self) -> i64 {
        self.rebuild_position
    }

    /// Highest position seen in data or heartbeats.
    #[inline]
    pub fn hwm_position(&self) -> i64 {
        self.hwm_position
    }

    #[inline]
    pub fn counters(&self) -> ReceiverCounters {
        self.counters
    }

    /// Position consumed by the image, or the rebuild position once it is gone.
    fn consumption_position(&self) -> i64 {
        self.consumers
            .min_position()
            .unwrap_or(self.rebuild_position)
    }

    fn on_datagram(&mut self, datagram: Bytes) {
        let Some(frame) = Frame::parse(&datagram) else {
            self.counters.invalid_frames += 1;
            return;
        };
        let header = frame.header;
        if header.session_id != self.log.session_id() || header.stream_id != self.log.stream_id() {
            return;
        }
        if let Err(e) = header.validate(self.log.term_length()) {
            debug!(error = %e, "dropping invalid frame");
            self.counters.invalid_frames += 1;
            return;
        }
        if self.loss.should_drop_frame(&header) {
            self.counters.frames_dropped += 1;
            return;
        }

        let position = self
            .log
            .position(header.term_id, header.term_offset as usize);
        if header.is_heartbeat() {
            self.counters.heartbeats_received += 1;
            self.hwm_position = self.hwm_position.max(position);
            return;
        }

        let end = position + header.aligned_length() as i64;
        if end <= self.rebuild_position {
            self.counters.duplicates += 1;
            return;
        }
        if end > self.consumption_position() + self.accept_window {
            debug!(position, "dropping frame beyond receiver window");
            return;
        }

        self.clean_ahead_of(header.term_id);

        let (index, _, offset) = self.log.locate(position);
        let term = self.log.term(index);
        if term.frame_length_volatile(offset) > 0 {
            self.counters.duplicates += 1;
            return;
        }
        // SAFETY: the receiver is the only writer of its log and the slot is
        // unpublished, so no reader can observe it yet.
        unsafe { term.write_frame(offset, &header, frame.payload()) };

        self.counters.frames_received += 1;
        self.hwm_position = self.hwm_position.max(end);
    }

    /// Entering term `t` requires the partition of `t + 1` to be clean.
    fn clean_ahead_of(&mut self, term_id: i32) {
        let needed = term_id
            .wrapping_sub(self.log.initial_term_id())
            .wrapping_add(1);
        while self.cleaned_term_count < needed {
            self.cleaned_term_count += 1;
            // SAFETY: the partition held a term at least two behind the
            // incoming frame, which the accept window keeps beyond the image.
            unsafe {
                self.log
                    .term(index_by_term_count(self.cleaned_term_count))
                    .clean()
            };
        }
    }

    /// Advance the rebuild position over contiguous frames; returns bytes advanced.
    fn rebuild(&mut self) -> usize {
        let start = self.rebuild_position;
        loop {
            let (index, _, offset) = self.log.locate(self.rebuild_position);
            let length = self.log.term(index).frame_length_volatile(offset);
            if length <= 0 {
                break;
            }
            self.rebuild_position += align(length as usize, FRAME_ALIGNMENT) as i64;
        }
        (self.rebuild_position - start) as usize
    }

    /// First gap after the rebuild position, bounded by its term and the hwm.
    fn scan_for_gap(&self) -> Option<Gap> {
        if self.rebuild_position >= self.hwm_position {
            return None;
        }

        let (index, term_id, gap_offset) = self.log.locate(self.rebuild_position);
        let term = self.log.term(index);
        let term_end = self.log.term_length();
        let hwm_offset = if self.hwm_position - self.rebuild_position
            < (term_end - gap_offset) as i64
        {
            gap_offset + (self.hwm_position - self.rebuild_position) as usize
        } else {
            term_end
        };

        let mut offset = gap_offset;
        while offset < hwm_offset && term.frame_length_volatile(offset) <= 0 {
            offset += FRAME_ALIGNMENT;
        }

        Some(Gap {
            term_id,
            term_offset: gap_offset as i32,
            length: (offset - gap_offset) as i32,
        })
    }

    fn process_loss(&mut self, now_ns: i64) -> Result<usize> {
        let gap = self.scan_for_gap();
        match self.loss_detector.on_scan(gap, now_ns) {
            LossAction::Wait => Ok(0),
            LossAction::Nak(gap) => {
                debug!(
                    term_id = gap.term_id,
                    term_offset = gap.term_offset,
                    length = gap.length,
                    "sending NAK"
                );
                let nak = ControlMessage::Nak(Nak {
                    session_id: self.log.session_id(),
                    stream_id: self.log.stream_id(),
                    term_id: gap.term_id,
                    term_offset: gap.term_offset,
                    length: gap.length,
                });
                self.control_tx.send(nak.encode())?;
                self.counters.naks_sent += 1;
                Ok(1)
            }
            LossAction::Skip(gap) => {
                warn!(
                    session_id = self.log.session_id(),
                    stream_id = self.log.stream_id(),
                    term_id = gap.term_id,
                    term_offset = gap.term_offset,
                    length = gap.length,
                    "NAK retries exhausted, skipping gap"
                );
                let header = DataHeader::padding(
                    self.log.session_id(),
                    self.log.stream_id(),
                    gap.term_id,
                    gap.term_offset,
                    gap.length as usize,
                );
                let (index, _, offset) = self
                    .log
                    .locate(self.log.position(gap.term_id, gap.term_offset as usize));
                // SAFETY: the gap is unpublished and only this receiver writes the log.
                unsafe { self.log.term(index).write_frame(offset, &header, &[]) };
                self.counters.gaps_skipped += 1;
                self.counters.bytes_skipped += gap.length as u64;
                Ok(1)
            }
        }
    }

    fn send_status(&mut self, now_ns: i64) -> Result<usize> {
        let consumption = self.consumption_position();
        let due = match self.last_status {
            None => true,
            Some((last_ns, last_position)) => {
                now_ns - last_ns >= self.status_interval_ns
                    || consumption - last_position >= i64::from(self.receiver_window / 4)
            }
        };
        if !due {
            return Ok(0);
        }

        let (_, term_id, term_offset) = self.log.locate(consumption);
        let sm = ControlMessage::Status(StatusMessage {
            session_id: self.log.session_id(),
            stream_id: self.log.stream_id(),
            consumption_term_id: term_id,
            consumption_term_offset: term_offset as i32,
            receiver_window: self.receiver_window,
        });
        self.control_tx.send(sm.encode())?;
        self.counters.status_messages_sent += 1;
        self.last_status = Some((now_ns, consumption));
        Ok(1)
    }
}

impl std::fmt::Debug for NetworkReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkReceiver")
            .field("session_id", &self.log.session_id())
            .field("stream_id", &self.log.stream_id())
            .field("rebuild_position", &self.rebuild_position)
            .field("hwm_position", &self.hwm_position)
            .field("counters", &self.counters)
            .finish()
    }
}

impl Agent for NetworkReceiver {
    fn do_work(&mut self, now_ns: i64) -> Result<usize> {
        let mut work = 0;
        while work < self.max_datagrams_per_cycle {
            let Some(datagram) = self.data_rx.try_recv() else {
                break;
            };
            self.on_datagram(datagram);
            work += 1;
        }

        work += usize::from(self.rebuild() > 0);
        work += self.process_loss(now_ns)?;
        // Padding written for a skipped gap is contiguous now.
        work += usize::from(self.rebuild() > 0);
        work += self.send_status(now_ns)?;
        Ok(work)
    }

    fn role_name(&self) -> &'static str {
        "receiver"
    }
}
