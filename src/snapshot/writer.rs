//! Snapshot writer - the mirror of the reader.
//!
//! ```text
//!         mark_begin         mark_end
//!  Idle ─────────────► Open ─────────► Closed
//!                        │
//!                        └── offer failure ──► Failed
//! ```
//!
//! Records are only accepted while open. Each record is offered with
//! retries on back pressure. Once BEGIN is in the log a failed offer leaves
//! a truncated snapshot behind it, so the writer fails for good: a retry needs
//! a fresh publication (a new recording). A failed BEGIN wrote nothing and
//! leaves the writer idle.

use bytes::BytesMut;
use tracing::{debug, warn};

use super::state::ConsensusModuleState;
use crate::backpressure::offer_with_idle;
use crate::config::SnapshotConfig;
use crate::error::{Result, TermwireError};
use crate::idle::{BackoffIdleStrategy, IdleStrategy};
use crate::publication::Publication;
use crate::schema::{
    ClusterMembers, ClusterSession, ClusterTimeUnit, ConsensusModule, EncodeRecord, PendingMessage,
    PendingMessageTracker, SessionMessageHeader, SnapshotMark, SnapshotMarker, Timer,
    SNAPSHOT_TYPE_ID,
};

/// Writer progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Open,
    Closed,
    /// An offer failed after BEGIN; the stream holds an unterminated snapshot.
    Failed,
}

/// Writes a consensus module snapshot to a publication.
pub struct SnapshotWriter {
    publication: Publication,
    idle: Box<dyn IdleStrategy>,
    offer_retry_limit: usize,
    state: WriterState,
    begin: Option<SnapshotMarker>,
    buffer: BytesMut,
    records_written: u64,
}

impl SnapshotWriter {
    pub fn new(publication: Publication, config: &SnapshotConfig) -> Self {
        Self {
            publication,
            idle: Box::new(BackoffIdleStrategy::default()),
            offer_retry_limit: config.offer_retry_limit,
            state: WriterState::Idle,
            begin: None,
            buffer: BytesMut::with_capacity(256),
            records_written: 0,
        }
    }

    /// Idle strategy used between retried offers.
    pub fn with_idle_strategy(mut self, idle: impl IdleStrategy + 'static) -> Self {
        self.idle = Box::new(idle);
        self
    }

    #[inline]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Records written in the current snapshot, markers included.
    #[inline]
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    #[inline]
    pub fn publication(&self) -> &Publication {
        &self.publication
    }

    /// Forget a finished snapshot and accept a new BEGIN.
    ///
    /// A failed writer stays failed.
    pub fn reset(&mut self) {
        if self.state == WriterState::Failed {
            return;
        }
        self.state = WriterState::Idle;
        self.begin = None;
        self.records_written = 0;
    }

    /// Write the BEGIN marker.
    pub fn mark_begin(
        &mut self,
        log_position: i64,
        leadership_term_id: i64,
        time_unit: ClusterTimeUnit,
        app_version: i32,
    ) -> Result<i64> {
        match self.state {
            WriterState::Idle => {}
            WriterState::Open => return Err(TermwireError::protocol("already in snapshot")),
            WriterState::Closed => return Err(TermwireError::protocol("snapshot already ended")),
            WriterState::Failed => {
                return Err(TermwireError::protocol(
                    "snapshot aborted, capture again on a new publication",
                ))
            }
        }

        let marker = SnapshotMarker {
            type_id: SNAPSHOT_TYPE_ID,
            log_position,
            leadership_term_id,
            index: 0,
            mark: SnapshotMark::Begin,
            time_unit,
            app_version,
        };
        self.records_written = 0;
        let position = self.offer(&marker)?;
        self.begin = Some(marker);
        self.state = WriterState::Open;
        debug!(log_position, leadership_term_id, "snapshot begin");
        Ok(position)
    }

    /// Write the END marker, mirroring the BEGIN marker's fields.
    pub fn mark_end(&mut self) -> Result<i64> {
        let begin = match (self.state, self.begin) {
            (WriterState::Open, Some(begin)) => begin,
            _ => return Err(TermwireError::protocol("missing begin snapshot")),
        };

        let position = self.offer(&SnapshotMarker {
            mark: SnapshotMark::End,
            ..begin
        })?;
        self.state = WriterState::Closed;
        debug!(records = self.records_written, position, "snapshot end");
        Ok(position)
    }

    pub fn snapshot_session(&mut self, session: &ClusterSession<'_>) -> Result<i64> {
        self.write_record(session)
    }

    pub fn snapshot_timer(&mut self, correlation_id: i64, deadline: i64) -> Result<i64> {
        self.write_record(&Timer {
            correlation_id,
            deadline,
        })
    }

    pub fn snapshot_consensus_module_state(&mut self, state: &ConsensusModule) -> Result<i64> {
        self.write_record(state)
    }

    pub fn snapshot_pending_message_tracker(&mut self, tracker: &PendingMessageTracker) -> Result<i64> {
        self.write_record(tracker)
    }

    pub fn snapshot_pending_message(
        &mut self,
        header: &SessionMessageHeader,
        payload: &[u8],
    ) -> Result<i64> {
        self.write_record(&PendingMessage {
            header: *header,
            payload,
        })
    }

    /// Membership is written for tooling; readers skip it.
    pub fn snapshot_cluster_members(&mut self, members: &ClusterMembers<'_>) -> Result<i64> {
        self.write_record(members)
    }

    /// Write a complete BEGIN … END snapshot of `state`.
    ///
    /// Returns the position after the END marker.
    pub fn take_snapshot(&mut self, state: &ConsensusModuleState) -> Result<i64> {
        self.mark_begin(
            state.log_position,
            state.leadership_term_id,
            state.time_unit,
            state.app_version,
        )?;
        self.snapshot_consensus_module_state(&state.consensus_module)?;
        for session in &state.sessions {
            self.snapshot_session(&session.as_record())?;
        }
        for timer in &state.timers {
            self.snapshot_timer(timer.correlation_id, timer.deadline)?;
        }
        for tracker in &state.pending_message_trackers {
            self.snapshot_pending_message_tracker(tracker)?;
        }
        for message in &state.pending_messages {
            self.write_record(&message.as_record())?;
        }
        self.mark_end()
    }

    fn write_record<R: EncodeRecord>(&mut self, record: &R) -> Result<i64> {
        if self.state != WriterState::Open {
            return Err(TermwireError::protocol(format!(
                "record template {} outside snapshot",
                R::TEMPLATE_ID
            )));
        }
        self.offer(record)
    }

    fn offer<R: EncodeRecord>(&mut self, record: &R) -> Result<i64> {
        self.buffer.clear();
        record.encode_into(&mut self.buffer);

        match offer_with_idle(
            &self.publication,
            &self.buffer,
            self.idle.as_mut(),
            self.offer_retry_limit,
        ) {
            Ok(position) => {
                self.records_written += 1;
                Ok(position)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    template_id = R::TEMPLATE_ID,
                    records = self.records_written,
                    "snapshot aborted"
                );
                if self.state == WriterState::Open {
                    self.state = WriterState::Failed;
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("session_id", &self.publication.session_id())
            .field("stream_id", &self.publication.stream_id())
            .field("state", &self.state)
            .field("records_written", &self.records_written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::idle::NoOpIdleStrategy;
    use crate::snapshot::{ConsensusModuleStateLoader, SnapshotReader};
    use crate::OfferError;

    fn writer(publication: &Publication, retries: usize) -> SnapshotWriter {
        SnapshotWriter::new(
            publication.clone(),
            &SnapshotConfig::default().with_offer_retry_limit(retries),
        )
        .with_idle_strategy(NoOpIdleStrategy)
    }

    #[test]
    fn test_records_require_open_snapshot() {
        let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
        let _image = publication.image();
        let mut writer = writer(&publication, 10);

        assert!(matches!(
            writer.snapshot_timer(1, 2),
            Err(TermwireError::ProtocolViolation(_))
        ));
        assert!(writer.mark_end().is_err());

        writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).unwrap();
        assert!(writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).is_err());
        writer.snapshot_timer(1, 2).unwrap();
        writer.mark_end().unwrap();
        assert_eq!(writer.state(), WriterState::Closed);
        assert_eq!(writer.records_written(), 3);

        assert!(writer.snapshot_timer(3, 4).is_err());
        assert!(writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).is_err());
        writer.reset();
        assert!(writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).is_ok());
    }

    #[test]
    fn test_not_connected_aborts_without_retry() {
        let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
        let mut writer = writer(&publication, 10);

        let err = writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).unwrap_err();
        assert!(matches!(err, TermwireError::Offer(OfferError::NotConnected)));
        assert_eq!(writer.state(), WriterState::Idle);
    }

    #[test]
    fn test_exhausted_retries_fail_writer() {
        let config = TransportConfig::default().with_term_length(1024).with_mtu_length(128);
        let publication = Publication::new(&config, 1, 1).unwrap();
        let _lagging = publication.image();
        let mut writer = writer(&publication, 3);

        writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1).unwrap();
        let result = (0..64).try_for_each(|id| writer.snapshot_timer(id, id).map(|_| ()));

        assert!(matches!(
            result,
            Err(TermwireError::Offer(OfferError::BackPressured))
        ));
        assert_eq!(writer.state(), WriterState::Failed);

        // BEGIN is already in the log; a second one would be unreadable.
        assert!(matches!(
            writer.mark_begin(0, 0, ClusterTimeUnit::Millis, 1),
            Err(TermwireError::ProtocolViolation(_))
        ));
        writer.reset();
        assert_eq!(writer.state(), WriterState::Failed);
    }

    #[test]
    fn test_capture_after_failure_loads_on_new_publication() {
        let state = ConsensusModuleState {
            timers: (0..40).map(|id| Timer { correlation_id: id, deadline: id * 10 }).collect(),
            ..ConsensusModuleState::default()
        };

        let config = TransportConfig::default().with_term_length(1024).with_mtu_length(128);
        let stalled = Publication::new(&config, 1, 1).unwrap();
        let _lagging = stalled.image();
        let mut first = writer(&stalled, 2);
        assert!(matches!(
            first.take_snapshot(&state),
            Err(TermwireError::Offer(OfferError::BackPressured))
        ));
        assert!(first.take_snapshot(&state).is_err());

        let fresh = Publication::new(&TransportConfig::default(), 2, 1).unwrap();
        let mut reader = SnapshotReader::new(fresh.image(), ConsensusModuleStateLoader::new());
        writer(&fresh, 2).take_snapshot(&state).unwrap();

        reader.load(&mut NoOpIdleStrategy).unwrap();
        assert_eq!(reader.into_parts().1.into_state(), state);
    }
}
