//! Snapshot reader - replays a snapshot from an image into a listener.
//!
//! ```text
//!         BEGIN               END
//!  Idle ─────────► InSnapshot ─────► Complete
//! ```
//!
//! - BEGIN while in a snapshot: "already in snapshot"
//! - END while idle: "missing begin snapshot"
//! - any other record while idle: protocol violation
//! - unknown template ids: skipped in every state
//!
//! A failing record is left unconsumed in the image.

use tracing::{debug, trace};

use super::listener::{ConsensusModuleSnapshotListener, SnapshotContext};
use crate::config::SnapshotConfig;
use crate::error::{Result, TermwireError};
use crate::idle::IdleStrategy;
use crate::image::{ControlledAction, Image};
use crate::logbuffer::Header;
use crate::schema::{SnapshotMark, SnapshotRecord, SNAPSHOT_TYPE_ID};

/// Fragments consumed per [`SnapshotReader::poll`] by default.
pub const FRAGMENT_LIMIT: usize = 10;

/// Reader progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    InSnapshot,
    Complete,
}

/// Polls a snapshot out of an image.
#[derive(Debug)]
pub struct SnapshotReader<L> {
    image: Image,
    listener: L,
    state: ReaderState,
    sequence: u64,
    fragment_limit: usize,
}

impl<L: ConsensusModuleSnapshotListener> SnapshotReader<L> {
    pub fn new(image: Image, listener: L) -> Self {
        Self {
            image,
            listener,
            state: ReaderState::Idle,
            sequence: 0,
            fragment_limit: FRAGMENT_LIMIT,
        }
    }

    /// Apply the fragment limit from `config`.
    pub fn with_config(mut self, config: &SnapshotConfig) -> Self {
        self.fragment_limit = config.fragment_limit;
        self
    }

    /// Consume up to the fragment limit; `Ok(0)` means no new data yet.
    ///
    /// Stops right after the END marker. Once complete, always returns 0.
    pub fn poll(&mut self) -> Result<usize> {
        if self.state == ReaderState::Complete {
            return Ok(0);
        }

        let Self {
            image,
            listener,
            state,
            sequence,
            fragment_limit,
        } = self;
        image.controlled_poll(
            |buffer, header| on_fragment(state, sequence, listener, buffer, header),
            *fragment_limit,
        )
    }

    /// Poll until the END marker, idling between empty polls.
    ///
    /// Fails with [`TermwireError::ImageClosed`] if the image closes first.
    pub fn load(&mut self, idle: &mut dyn IdleStrategy) -> Result<()> {
        while !self.is_done() {
            let fragments = self.poll()?;
            if fragments == 0 && self.image.is_closed() {
                return Err(TermwireError::ImageClosed);
            }
            idle.idle_work(fragments);
        }
        Ok(())
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == ReaderState::Complete
    }

    #[inline]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    #[inline]
    pub fn listener(&self) -> &L {
        &self.listener
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn into_parts(self) -> (Image, L) {
        (self.image, self.listener)
    }
}

fn on_fragment<L: ConsensusModuleSnapshotListener>(
    state: &mut ReaderState,
    sequence: &mut u64,
    listener: &mut L,
    buffer: &[u8],
    header: &Header,
) -> Result<ControlledAction> {
    let record = SnapshotRecord::decode(buffer)?;
    let ctx = SnapshotContext {
        sequence: *sequence,
        position: header.position(),
    };

    match record {
        SnapshotRecord::Unknown { template_id } => {
            trace!(template_id, "skipping unknown record");
            return Ok(ControlledAction::Continue);
        }
        SnapshotRecord::Marker(marker) => {
            if marker.type_id != SNAPSHOT_TYPE_ID {
                return Err(TermwireError::protocol(format!(
                    "unexpected snapshot type: {}",
                    marker.type_id
                )));
            }
            match marker.mark {
                SnapshotMark::Begin => {
                    if *state != ReaderState::Idle {
                        return Err(TermwireError::protocol("already in snapshot"));
                    }
                    *state = ReaderState::InSnapshot;
                    let ctx = SnapshotContext { sequence: 0, ..ctx };
                    listener.on_load_begin_snapshot(&marker, ctx, buffer);
                    *sequence = 1;
                    debug!(
                        log_position = marker.log_position,
                        leadership_term_id = marker.leadership_term_id,
                        "loading snapshot"
                    );
                }
                SnapshotMark::End => {
                    if *state != ReaderState::InSnapshot {
                        return Err(TermwireError::protocol("missing begin snapshot"));
                    }
                    listener.on_load_end_snapshot(&marker, ctx, buffer);
                    *state = ReaderState::Complete;
                    debug!(records = *sequence + 1, "snapshot loaded");
                    return Ok(ControlledAction::Break);
                }
                SnapshotMark::Section | SnapshotMark::NullValue => {}
            }
            return Ok(ControlledAction::Continue);
        }
        _ => {}
    }

    if *state != ReaderState::InSnapshot {
        return Err(TermwireError::protocol(format!(
            "record template {} outside snapshot",
            record.template_id()
        )));
    }

    match record {
        SnapshotRecord::Session(session) => listener.on_load_cluster_session(&session, ctx, buffer),
        SnapshotRecord::Timer(timer) => listener.on_load_timer(&timer, ctx, buffer),
        SnapshotRecord::ConsensusModule(state) => {
            listener.on_load_consensus_module_state(&state, ctx, buffer)
        }
        SnapshotRecord::PendingMessageTracker(tracker) => {
            listener.on_load_pending_message_tracker(&tracker, ctx, buffer)
        }
        SnapshotRecord::PendingMessage(message) => listener.on_load_pending_message(&message, ctx, buffer),
        // Membership is rebuilt from configuration, not snapshots.
        SnapshotRecord::ClusterMembers(_) => {}
        SnapshotRecord::Marker(_) | SnapshotRecord::Unknown { .. } => {}
    }
    *sequence += 1;
    Ok(ControlledAction::Continue)
}
