//! Snapshot module - consensus module state capture and recovery.
//!
//! A snapshot is a `BEGIN … records … END` sequence of schema records on a
//! stream:
//!
//! ```text
//! SnapshotWriter ─► Publication ═══ log ═══ Image ─► SnapshotReader ─► listener
//! ```
//!
//! # Example
//!
//! ```
//! use termwire::config::{SnapshotConfig, TransportConfig};
//! use termwire::idle::NoOpIdleStrategy;
//! use termwire::snapshot::{
//!     ConsensusModuleState, ConsensusModuleStateLoader, SnapshotReader, SnapshotWriter,
//! };
//! use termwire::Publication;
//!
//! let publication = Publication::new(&TransportConfig::default(), 1, 108).unwrap();
//! let mut reader = SnapshotReader::new(publication.image(), ConsensusModuleStateLoader::new());
//!
//! let mut state = ConsensusModuleState::default();
//! state.log_position = 4096;
//! state.consensus_module.next_session_id = 17;
//!
//! let mut writer = SnapshotWriter::new(publication, &SnapshotConfig::default());
//! writer.take_snapshot(&state).unwrap();
//!
//! reader.load(&mut NoOpIdleStrategy).unwrap();
//! let (_, loader) = reader.into_parts();
//! assert_eq!(loader.into_state(), state);
//! ```

mod listener;
mod reader;
mod state;
mod writer;

pub use listener::{ConsensusModuleSnapshotListener, SnapshotContext};
pub use reader::{ReaderState, SnapshotReader, FRAGMENT_LIMIT};
pub use state::{ConsensusModuleState, ConsensusModuleStateLoader, PendingMessageState, SessionState};
pub use writer::{SnapshotWriter, WriterState};
