//! Control session abstraction and an in-memory implementation.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use super::error_response::{ErrorCode, ErrorResponse};

/// Null value for ids that do not apply to a signal.
pub const NULL_VALUE: i64 = -1;

/// Recording lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingSignal {
    Start,
    Stop,
    Extend,
    Replicate,
    Merge,
    Sync,
    Delete,
    ReplicateEnd,
}

impl RecordingSignal {
    pub fn value(self) -> i32 {
        match self {
            RecordingSignal::Start => 0,
            RecordingSignal::Stop => 1,
            RecordingSignal::Extend => 2,
            RecordingSignal::Replicate => 3,
            RecordingSignal::Merge => 4,
            RecordingSignal::Sync => 5,
            RecordingSignal::Delete => 6,
            RecordingSignal::ReplicateEnd => 7,
        }
    }
}

/// A signal as delivered to the control client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub correlation_id: i64,
    pub recording_id: i64,
    pub subscription_id: i64,
    pub position: i64,
    pub signal: RecordingSignal,
}

/// Outbound side of a client's control connection.
///
/// Both calls are fire-and-forget: a response that cannot be delivered is
/// dropped, never reported back to the caller.
pub trait ControlSession: Send + Sync {
    fn attempt_error_response(&self, correlation_id: i64, message: &str);

    fn send_signal(
        &self,
        correlation_id: i64,
        recording_id: i64,
        subscription_id: i64,
        position: i64,
        signal: RecordingSignal,
    );
}

/// Control session that queues encoded error responses and signals.
#[derive(Debug)]
pub struct QueuedControlSession {
    session_id: i64,
    responses: Mutex<VecDeque<Bytes>>,
    signals: Mutex<VecDeque<SignalEvent>>,
}

impl QueuedControlSession {
    pub fn new(session_id: i64) -> Self {
        Self {
            session_id,
            responses: Mutex::new(VecDeque::new()),
            signals: Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Next encoded [`ErrorResponse`].
    pub fn poll_response(&self) -> Option<Bytes> {
        self.responses.lock().pop_front()
    }

    pub fn poll_signal(&self) -> Option<SignalEvent> {
        self.signals.lock().pop_front()
    }
}

impl ControlSession for QueuedControlSession {
    fn attempt_error_response(&self, correlation_id: i64, message: &str) {
        trace!(session_id = self.session_id, correlation_id, "queueing error response");
        let response = ErrorResponse::new(correlation_id, ErrorCode::GenericError, message);
        self.responses.lock().push_back(response.encode());
    }

    fn send_signal(
        &self,
        correlation_id: i64,
        recording_id: i64,
        subscription_id: i64,
        position: i64,
        signal: RecordingSignal,
    ) {
        self.signals.lock().push_back(SignalEvent {
            correlation_id,
            recording_id,
            subscription_id,
            position,
            signal,
        });
    }
}
