//! # termwire
//!
//! Term-buffer log transport with a replicated snapshot protocol.
//!
//! ## Architecture
//!
//! - **Log transport**: messages are fragmented into frames and appended to a
//!   log of three rotating terms shared lock-free between one publication and
//!   its images. Network delivery (loss, NAKs, flow control) is simulated by
//!   the [`transport`] agents.
//! - **Snapshot protocol**: a consensus module's state is written as a
//!   `BEGIN … records … END` sequence of schema-tagged records and replayed by
//!   a [`snapshot::SnapshotReader`] into a listener.
//!
//! Nothing here spawns threads. Every `offer` and `poll` returns immediately;
//! the embedding duty cycle decides how to idle between attempts.
//!
//! ## Example
//!
//! ```
//! use termwire::config::TransportConfig;
//! use termwire::{Publication, Subscription};
//!
//! let publication = Publication::new(&TransportConfig::default(), 1, 10).unwrap();
//! let mut subscription = Subscription::new(10);
//! subscription.add_image(publication.image());
//!
//! let position = publication.offer(b"ping");
//! assert!(position > 0);
//!
//! let fragments = subscription.poll(|payload, header| {
//!     assert_eq!(payload, b"ping");
//!     assert_eq!(header.position(), position);
//! }, 10);
//! assert_eq!(fragments, 1);
//! ```

pub mod archive;
pub mod backpressure;
pub mod config;
pub mod control;
pub mod error;
pub mod idle;
pub mod logbuffer;
pub mod protocol;
pub mod schema;
pub mod snapshot;
pub mod transport;

mod image;
mod publication;
mod subscription;

pub use error::{
    OfferError, Result, TermwireError, ADMIN_ACTION, BACK_PRESSURED, CLOSED,
    MAX_POSITION_EXCEEDED, MESSAGE_TOO_LONG, NOT_CONNECTED,
};
pub use image::{ControlledAction, Image, Message, Messages};
pub use logbuffer::Header;
pub use publication::{ConsumerPosition, ConsumerRegistry, Publication};
pub use subscription::Subscription;
