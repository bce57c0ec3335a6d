//! Deletes a recording's segment files, one per duty cycle.
//!
//! A failed delete is answered with an error response on the control session
//! and reported to the error handler; the queue carries on. When the last
//! file is handled the session signals `Delete`.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::Session;
use crate::control::{ControlSession, ErrorHandler, RecordingSignal, NULL_VALUE};
use crate::error::TermwireError;

/// Session deleting queued segment files.
pub struct DeleteSegmentsSession {
    recording_id: i64,
    correlation_id: i64,
    files: VecDeque<PathBuf>,
    control_session: Arc<dyn ControlSession>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl DeleteSegmentsSession {
    pub fn new(
        recording_id: i64,
        correlation_id: i64,
        files: impl IntoIterator<Item = PathBuf>,
        control_session: Arc<dyn ControlSession>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            recording_id,
            correlation_id,
            files: files.into_iter().collect(),
            control_session,
            error_handler,
        }
    }

    /// Files still queued.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.files.len()
    }

    fn segment_error(&self, path: &Path, err: &io::Error) -> TermwireError {
        TermwireError::Segment {
            path: path.to_path_buf(),
            cause: format!("recording {}: {err}", self.recording_id),
        }
    }
}

/// Delete `path`; a file that is already gone counts as deleted.
fn delete_segment(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

impl Session for DeleteSegmentsSession {
    fn do_work(&mut self) -> usize {
        let Some(path) = self.files.pop_front() else {
            return 0;
        };

        match delete_segment(&path) {
            Ok(()) => debug!(recording_id = self.recording_id, path = %path.display(), "deleted segment"),
            Err(e) => {
                self.control_session.attempt_error_response(
                    self.correlation_id,
                    &format!("unable to delete segment file: {}", path.display()),
                );
                self.error_handler.on_error(&self.segment_error(&path, &e));
            }
        }

        if self.files.is_empty() {
            self.control_session.send_signal(
                self.correlation_id,
                self.recording_id,
                NULL_VALUE,
                NULL_VALUE,
                RecordingSignal::Delete,
            );
        }
        1
    }

    fn abort(&mut self) {}

    fn close(&mut self) {
        while let Some(path) = self.files.pop_front() {
            if let Err(e) = delete_segment(&path) {
                self.error_handler.on_error(&self.segment_error(&path, &e));
            }
        }
    }

    fn is_done(&self) -> bool {
        self.files.is_empty()
    }

    fn session_id(&self) -> i64 {
        self.recording_id
    }
}

impl std::fmt::Debug for DeleteSegmentsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteSegmentsSession")
            .field("recording_id", &self.recording_id)
            .field("correlation_id", &self.correlation_id)
            .field("files", &self.files)
            .finish()
    }
}
