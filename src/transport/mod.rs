//! Transport module - network delivery of a publication's log.
//!
//! Simulates a unicast channel between a publication and a remote image:
//!
//! ```text
//! Publication log ─► NetworkSender ─► data medium ─► NetworkReceiver ─► image log ─► Image
//!                         ▲                                 │
//!                         └──── status messages, NAKs ◄─────┘
//! ```
//!
//! - Flow control: the receiver advertises its consumption position and
//!   window in status messages; the sender never runs past them, and the
//!   sender's position holds back the publication.
//! - Loss: a [`LossGenerator`] drops data frames on the receive side. Gaps
//!   are NAKed after a delay and retransmitted from the publication's log;
//!   a gap still open after `max_nak_retries` NAKs is filled with padding.
//! - Heartbeats: an idle sender sends zero-length data headers so the
//!   receiver can detect loss at the tail of the stream.
//!
//! Both halves are [`Agent`]s driven by the caller's duty cycle; nothing here
//! spawns threads.
//!
//! # Example
//!
//! ```
//! use termwire::config::TransportConfig;
//! use termwire::transport::{connect, Agent, NoLoss};
//! use termwire::Publication;
//!
//! let config = TransportConfig::default();
//! let publication = Publication::new(&config, 1, 10).unwrap();
//! let (mut sender, mut receiver, mut image) =
//!     connect(&publication, &config, Box::new(NoLoss)).unwrap();
//!
//! publication.offer(b"over the wire");
//! for now in 0..4 {
//!     sender.do_work(now).unwrap();
//!     receiver.do_work(now).unwrap();
//! }
//!
//! let mut received = Vec::new();
//! image.poll(|payload, _| received.push(payload.to_vec()), 10);
//! assert_eq!(received, vec![b"over the wire".to_vec()]);
//! ```

mod clock;
mod loss;
mod loss_detector;
mod medium;
mod receiver;
mod retransmit;
mod sender;
mod status;

use std::sync::Arc;

pub use clock::{ManualClock, NanoClock, SystemNanoClock};
pub use loss::{BlackholeLoss, LossGenerator, NoLoss, RandomLoss, TargetedLoss};
pub use loss_detector::{Gap, LossAction, LossDetector};
pub use medium::{datagram_channel, DatagramReceiver, DatagramSender, MediumCounters};
pub use receiver::{NetworkReceiver, ReceiverCounters};
pub use retransmit::RetransmitHandler;
pub use sender::{NetworkSender, SenderCounters};
pub use status::{ControlMessage, Nak, StatusMessage, CONTROL_MESSAGE_LENGTH};

use tracing::debug;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::image::Image;
use crate::logbuffer::LogBuffers;
use crate::publication::{ConsumerRegistry, Publication};

/// A unit of work driven by a duty-cycle loop.
pub trait Agent {
    /// Do one cycle of work at `now_ns`; returns the amount of work done.
    fn do_work(&mut self, now_ns: i64) -> Result<usize>;

    /// Short name for logs.
    fn role_name(&self) -> &'static str;
}

/// Connect a publication to a new remote image over an in-memory medium.
///
/// The image joins at the publication's current position.
pub fn connect(
    publication: &Publication,
    config: &TransportConfig,
    loss: Box<dyn LossGenerator>,
) -> Result<(NetworkSender, NetworkReceiver, Image)> {
    config.validate()?;

    let (data_tx, data_rx) = datagram_channel();
    let (control_tx, control_rx) = datagram_channel();

    let sender_position = publication.register_consumer();
    let join_position = sender_position.get();

    let log = Arc::new(LogBuffers::new(
        publication.term_length(),
        publication.initial_term_id(),
        publication.session_id(),
        publication.stream_id(),
    ));
    let consumers = Arc::new(ConsumerRegistry::default());
    let image = Image::new(log.clone(), consumers.register(join_position));

    debug!(
        session_id = publication.session_id(),
        stream_id = publication.stream_id(),
        join_position,
        "network image connected"
    );

    let sender = NetworkSender::new(
        publication.clone(),
        sender_position,
        config,
        data_tx,
        control_rx,
    );
    let receiver = NetworkReceiver::new(
        log,
        consumers,
        join_position,
        config,
        data_rx,
        control_tx,
        loss,
    );
    Ok((sender, receiver, image))
}
