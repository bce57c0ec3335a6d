//! Owned consensus module state and the listener that rebuilds it.

use bytes::Bytes;

use super::listener::{ConsensusModuleSnapshotListener, SnapshotContext};
use crate::schema::{
    CloseReason, ClusterSession, ClusterTimeUnit, ConsensusModule, PendingMessage,
    PendingMessageTracker, SessionMessageHeader, SnapshotMarker, Timer,
};

/// An open cluster session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub cluster_session_id: i64,
    pub correlation_id: i64,
    pub opened_log_position: i64,
    pub time_of_last_activity: i64,
    pub close_reason: CloseReason,
    pub response_stream_id: i32,
    pub response_channel: String,
}

impl SessionState {
    /// Borrowed record view for encoding.
    pub fn as_record(&self) -> ClusterSession<'_> {
        ClusterSession {
            cluster_session_id: self.cluster_session_id,
            correlation_id: self.correlation_id,
            opened_log_position: self.opened_log_position,
            time_of_last_activity: self.time_of_last_activity,
            close_reason: self.close_reason,
            response_stream_id: self.response_stream_id,
            response_channel: &self.response_channel,
        }
    }
}

impl From<&ClusterSession<'_>> for SessionState {
    fn from(record: &ClusterSession<'_>) -> Self {
        Self {
            cluster_session_id: record.cluster_session_id,
            correlation_id: record.correlation_id,
            opened_log_position: record.opened_log_position,
            time_of_last_activity: record.time_of_last_activity,
            close_reason: record.close_reason,
            response_stream_id: record.response_stream_id,
            response_channel: record.response_channel.to_owned(),
        }
    }
}

/// A service message waiting to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessageState {
    pub header: SessionMessageHeader,
    pub payload: Bytes,
}

impl PendingMessageState {
    pub fn as_record(&self) -> PendingMessage<'_> {
        PendingMessage {
            header: self.header,
            payload: &self.payload,
        }
    }
}

/// Everything a consensus module snapshot captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusModuleState {
    pub log_position: i64,
    pub leadership_term_id: i64,
    pub time_unit: ClusterTimeUnit,
    pub app_version: i32,
    pub consensus_module: ConsensusModule,
    pub sessions: Vec<SessionState>,
    pub timers: Vec<Timer>,
    pub pending_message_trackers: Vec<PendingMessageTracker>,
    pub pending_messages: Vec<PendingMessageState>,
}

impl Default for ConsensusModuleState {
    fn default() -> Self {
        Self {
            log_position: 0,
            leadership_term_id: 0,
            time_unit: ClusterTimeUnit::Millis,
            app_version: 0,
            consensus_module: ConsensusModule::default(),
            sessions: Vec::new(),
            timers: Vec::new(),
            pending_message_trackers: Vec::new(),
            pending_messages: Vec::new(),
        }
    }
}

/// Listener rebuilding a [`ConsensusModuleState`] from a snapshot.
#[derive(Debug, Default)]
pub struct ConsensusModuleStateLoader {
    state: ConsensusModuleState,
    records_loaded: u64,
    complete: bool,
}

impl ConsensusModuleStateLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> &ConsensusModuleState {
        &self.state
    }

    pub fn into_state(self) -> ConsensusModuleState {
        self.state
    }

    /// Records loaded, markers included.
    #[inline]
    pub fn records_loaded(&self) -> u64 {
        self.records_loaded
    }

    /// Whether the END marker was seen.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl ConsensusModuleSnapshotListener for ConsensusModuleStateLoader {
    fn on_load_begin_snapshot(&mut self, marker: &SnapshotMarker, _ctx: SnapshotContext, _raw: &[u8]) {
        self.state = ConsensusModuleState {
            log_position: marker.log_position,
            leadership_term_id: marker.leadership_term_id,
            time_unit: marker.time_unit,
            app_version: marker.app_version,
            ..ConsensusModuleState::default()
        };
        self.records_loaded = 1;
        self.complete = false;
    }

    fn on_load_end_snapshot(&mut self, _marker: &SnapshotMarker, _ctx: SnapshotContext, _raw: &[u8]) {
        self.records_loaded += 1;
        self.complete = true;
    }

    fn on_load_cluster_session(&mut self, session: &ClusterSession<'_>, _ctx: SnapshotContext, _raw: &[u8]) {
        self.state.sessions.push(SessionState::from(session));
        self.records_loaded += 1;
    }

    fn on_load_timer(&mut self, timer: &Timer, _ctx: SnapshotContext, _raw: &[u8]) {
        self.state.timers.push(*timer);
        self.records_loaded += 1;
    }

    fn on_load_consensus_module_state(
        &mut self,
        state: &ConsensusModule,
        _ctx: SnapshotContext,
        _raw: &[u8],
    ) {
        self.state.consensus_module = *state;
        self.records_loaded += 1;
    }

    fn on_load_pending_message_tracker(
        &mut self,
        tracker: &PendingMessageTracker,
        _ctx: SnapshotContext,
        _raw: &[u8],
    ) {
        self.state.pending_message_trackers.push(*tracker);
        self.records_loaded += 1;
    }

    fn on_load_pending_message(&mut self, message: &PendingMessage<'_>, _ctx: SnapshotContext, _raw: &[u8]) {
        self.state.pending_messages.push(PendingMessageState {
            header: message.header,
            payload: Bytes::copy_from_slice(message.payload),
        });
        self.records_loaded += 1;
    }
}
