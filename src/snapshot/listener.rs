//! Callbacks receiving a snapshot as it is replayed.

use crate::schema::{
    ClusterSession, ConsensusModule, PendingMessage, PendingMessageTracker, SnapshotMarker, Timer,
};

/// Where a record sits in the snapshot being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotContext {
    /// Arrival index within the snapshot; the BEGIN marker is 0.
    pub sequence: u64,
    /// Stream position just past the record.
    pub position: i64,
}

/// Receives the records of a consensus module snapshot, in order.
///
/// Every callback also gets the raw record bytes (schema header included)
/// for listeners that forward records unchanged.
pub trait ConsensusModuleSnapshotListener {
    fn on_load_begin_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, raw: &[u8]);

    fn on_load_end_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, raw: &[u8]);

    fn on_load_cluster_session(&mut self, session: &ClusterSession<'_>, ctx: SnapshotContext, raw: &[u8]);

    fn on_load_timer(&mut self, timer: &Timer, ctx: SnapshotContext, raw: &[u8]);

    fn on_load_consensus_module_state(
        &mut self,
        state: &ConsensusModule,
        ctx: SnapshotContext,
        raw: &[u8],
    );

    fn on_load_pending_message_tracker(
        &mut self,
        tracker: &PendingMessageTracker,
        ctx: SnapshotContext,
        raw: &[u8],
    );

    fn on_load_pending_message(&mut self, message: &PendingMessage<'_>, ctx: SnapshotContext, raw: &[u8]);
}

impl<L: ConsensusModuleSnapshotListener + ?Sized> ConsensusModuleSnapshotListener for &mut L {
    fn on_load_begin_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, raw: &[u8]) {
        (**self).on_load_begin_snapshot(marker, ctx, raw)
    }

    fn on_load_end_snapshot(&mut self, marker: &SnapshotMarker, ctx: SnapshotContext, raw: &[u8]) {
        (**self).on_load_end_snapshot(marker, ctx, raw)
    }

    fn on_load_cluster_session(&mut self, session: &ClusterSession<'_>, ctx: SnapshotContext, raw: &[u8]) {
        (**self).on_load_cluster_session(session, ctx, raw)
    }

    fn on_load_timer(&mut self, timer: &Timer, ctx: SnapshotContext, raw: &[u8]) {
        (**self).on_load_timer(timer, ctx, raw)
    }

    fn on_load_consensus_module_state(
        &mut self,
        state: &ConsensusModule,
        ctx: SnapshotContext,
        raw: &[u8],
    ) {
        (**self).on_load_consensus_module_state(state, ctx, raw)
    }

    fn on_load_pending_message_tracker(
        &mut self,
        tracker: &PendingMessageTracker,
        ctx: SnapshotContext,
        raw: &[u8],
    ) {
        (**self).on_load_pending_message_tracker(tracker, ctx, raw)
    }

    fn on_load_pending_message(&mut self, message: &PendingMessage<'_>, ctx: SnapshotContext, raw: &[u8]) {
        (**self).on_load_pending_message(message, ctx, raw)
    }
}
