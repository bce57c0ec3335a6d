//! Network sender - moves a publication's frames onto the medium.
//!
//! Per duty cycle the sender:
//! 1. applies status messages (advancing its window) and serves NAKs
//! 2. sends new frames up to the receiver's window
//! 3. emits a heartbeat when idle for `heartbeat_interval`
//!
//! Its send position is registered as a consumer of the publication, so the
//! publication can never overwrite frames the receiver may still NAK.

use tracing::{debug, trace};

use super::medium::{DatagramReceiver, DatagramSender};
use super::retransmit::RetransmitHandler;
use super::status::{ControlMessage, Nak, StatusMessage};
use super::Agent;
use crate::config::TransportConfig;
use crate::error::Result;
use crate::logbuffer::{scan, Scanned};
use crate::protocol::{build_frame, DataHeader};
use crate::publication::{ConsumerPosition, Publication};

/// Sender statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenderCounters {
    pub frames_sent: u64,
    pub retransmits: u64,
    pub heartbeats: u64,
    pub naks_received: u64,
    pub status_messages_received: u64,
}

/// Sending half of a network stream.
#[derive(Debug)]
pub struct NetworkSender {
    publication: Publication,
    position: ConsumerPosition,
    sender_limit: i64,
    data_tx: DatagramSender,
    control_rx: DatagramReceiver,
    retransmit: RetransmitHandler,
    heartbeat_interval_ns: i64,
    last_send_ns: Option<i64>,
    max_frames_per_cycle: usize,
    counters: SenderCounters,
}

impl NetworkSender {
    pub(crate) fn new(
        publication: Publication,
        position: ConsumerPosition,
        config: &TransportConfig,
        data_tx: DatagramSender,
        control_rx: DatagramReceiver,
    ) -> Self {
        let sender_limit = position.get() + config.receiver_window() as i64;
        Self {
            publication,
            position,
            sender_limit,
            data_tx,
            control_rx,
            retransmit: RetransmitHandler::new(config.retransmit_linger, config.max_retransmits),
            heartbeat_interval_ns: config.heartbeat_interval.as_nanos() as i64,
            last_send_ns: None,
            max_frames_per_cycle: config.max_datagrams_per_cycle,
            counters: SenderCounters::default(),
        }
    }

    /// Position up to which frames were sent.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position.get()
    }

    /// Position the receiver allows the sender to reach.
    #[inline]
    pub fn sender_limit(&self) -> i64 {
        self.sender_limit
    }

    #[inline]
    pub fn counters(&self) -> SenderCounters {
        self.counters
    }

    fn process_control(&mut self, now_ns: i64) -> Result<usize> {
        let mut work = 0;
        while let Some(datagram) = self.control_rx.try_recv() {
            work += 1;
            match ControlMessage::decode(&datagram) {
                Ok(ControlMessage::Status(sm)) => self.on_status_message(&sm),
                Ok(ControlMessage::Nak(nak)) => self.on_nak(&nak, now_ns)?,
                Err(e) => debug!(error = %e, "dropping malformed control message"),
            }
        }
        work += self.retransmit.expire(now_ns);
        Ok(work)
    }

    fn on_status_message(&mut self, sm: &StatusMessage) {
        if sm.session_id != self.publication.session_id()
            || sm.stream_id != self.publication.stream_id()
        {
            return;
        }
        self.counters.status_messages_received += 1;

        let log = self.publication.log();
        let consumption = log.position(sm.consumption_term_id, sm.consumption_term_offset as usize);
        let limit = consumption + i64::from(sm.receiver_window);
        if limit > self.sender_limit {
            trace!(limit, "sender window advanced");
            self.sender_limit = limit;
        }
    }

    fn on_nak(&mut self, nak: &Nak, now_ns: i64) -> Result<()> {
        if nak.session_id != self.publication.session_id()
            || nak.stream_id != self.publication.stream_id()
        {
            return Ok(());
        }
        self.counters.naks_received += 1;

        let log = self.publication.log().clone();
        let start = log.position(nak.term_id, nak.term_offset as usize);
        let end = start + i64::from(nak.length);
        let retained_from = self.publication.position() - log.term_length() as i64;
        if nak.length <= 0 || start < retained_from || end > self.position.get() {
            debug!(
                term_id = nak.term_id,
                term_offset = nak.term_offset,
                length = nak.length,
                "ignoring NAK outside retransmit window"
            );
            return Ok(());
        }

        if !self.retransmit.on_nak(nak.term_id, nak.term_offset, now_ns) {
            return Ok(());
        }

        debug!(
            term_id = nak.term_id,
            term_offset = nak.term_offset,
            length = nak.length,
            "retransmitting"
        );
        let (index, _, mut offset) = log.locate(start);
        let stop = offset + nak.length as usize;
        let term = log.term(index);
        while offset < stop {
            let (datagram, length) = match scan(term, offset) {
                Scanned::Nothing => break,
                Scanned::Padding { header, length } => (build_frame(&header, &[]), length),
                Scanned::Fragment {
                    header,
                    payload,
                    length,
                } => (build_frame(&header, payload), length),
            };
            self.data_tx.send(datagram)?;
            self.counters.retransmits += 1;
            offset += length;
        }
        Ok(())
    }

    fn send_data(&mut self, now_ns: i64) -> Result<usize> {
        let log = self.publication.log().clone();
        let start = self.position.get();
        let mut position = start;
        let mut sent = 0;

        while sent < self.max_frames_per_cycle && position < self.sender_limit {
            let (index, _, offset) = log.locate(position);
            let (datagram, length) = match scan(log.term(index), offset) {
                Scanned::Nothing => break,
                Scanned::Padding { header, length } => (build_frame(&header, &[]), length),
                Scanned::Fragment {
                    header,
                    payload,
                    length,
                } => (build_frame(&header, payload), length),
            };
            self.data_tx.send(datagram)?;
            position += length as i64;
            sent += 1;
        }

        if sent > 0 {
            self.position.set(position);
            self.counters.frames_sent += sent as u64;
            self.last_send_ns = Some(now_ns);
        }
        Ok(sent)
    }

    fn send_heartbeat(&mut self, now_ns: i64) -> Result<usize> {
        let due = match self.last_send_ns {
            Some(last) => now_ns - last >= self.heartbeat_interval_ns,
            None => true,
        };
        if !due {
            return Ok(0);
        }

        let log = self.publication.log();
        let (_, term_id, term_offset) = log.locate(self.position.get());
        let header = DataHeader::heartbeat(
            log.session_id(),
            log.stream_id(),
            term_id,
            term_offset as i32,
        );
        self.data_tx.send(build_frame(&header, &[]))?;
        self.counters.heartbeats += 1;
        self.last_send_ns = Some(now_ns);
        Ok(1)
    }
}

impl Agent for NetworkSender {
    fn do_work(&mut self, now_ns: i64) -> Result<usize> {
        let mut work = self.process_control(now_ns)?;
        work += self.send_data(now_ns)?;
        if work == 0 {
            work += self.send_heartbeat(now_ns)?;
        }
        Ok(work)
    }

    fn role_name(&self) -> &'static str {
        "sender"
    }
}
