//! Schema module - typed records of the consensus module snapshot.
//!
//! Every record starts with an 8-byte [`MessageHeader`] followed by a
//! fixed-offset block and optional var-data (u32 LE length + bytes):
//!
//! | Template | Id  | Block | Var-data           |
//! |----------|-----|-------|--------------------|
//! | SessionMessageHeader | 1 | 24 | message payload (to the end) |
//! | SnapshotMarker | 100 | 40 | |
//! | ClusterSession | 103 | 40 | response channel |
//! | Timer | 104 | 16 | |
//! | ConsensusModule | 105 | 28 | |
//! | ClusterMembers | 106 | 8 | members |
//! | PendingMessageTracker | 107 | 24 | |
//!
//! Decoding goes through [`SnapshotRecord::decode`], a single switch on the
//! template id. Ids it does not know come back as
//! [`SnapshotRecord::Unknown`] so newer writers stay readable.

mod codec;
mod header;
mod records;
mod types;

pub use codec::{NULL_I32, NULL_I64};
pub use header::{MessageHeader, MESSAGE_HEADER_LENGTH};
pub use records::{
    ClusterMembers, ClusterSession, ConsensusModule, EncodeRecord, PendingMessage,
    PendingMessageTracker, SessionMessageHeader, SnapshotMarker, SnapshotRecord, Timer,
};
pub use types::{CloseReason, ClusterTimeUnit, SnapshotMark};

/// Schema id of every record.
pub const SCHEMA_ID: u16 = 111;

/// Schema version written by this crate.
pub const SCHEMA_VERSION: u16 = 8;

/// Marker type id of a consensus module snapshot.
pub const SNAPSHOT_TYPE_ID: i64 = 1;

/// Template ids.
pub mod template_id {
    pub const SESSION_MESSAGE_HEADER: u16 = 1;
    pub const SNAPSHOT_MARKER: u16 = 100;
    pub const CLUSTER_SESSION: u16 = 103;
    pub const TIMER: u16 = 104;
    pub const CONSENSUS_MODULE: u16 = 105;
    pub const CLUSTER_MEMBERS: u16 = 106;
    pub const PENDING_MESSAGE_TRACKER: u16 = 107;
}
