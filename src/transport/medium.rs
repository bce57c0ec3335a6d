//! In-memory datagram medium.
//!
//! A one-way channel of datagrams built on `tokio::sync::mpsc`. The sending
//! side never blocks and the receiving side is drained with `try_recv`, so
//! both ends can be driven from synchronous duty cycles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, TermwireError};

/// Counters shared by both ends of a channel.
#[derive(Debug, Default)]
pub struct MediumCounters {
    datagrams: AtomicU64,
    bytes: AtomicU64,
}

impl MediumCounters {
    /// Datagrams sent.
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    /// Bytes sent.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Sending end of a datagram channel.
#[derive(Debug, Clone)]
pub struct DatagramSender {
    tx: mpsc::UnboundedSender<Bytes>,
    counters: Arc<MediumCounters>,
}

impl DatagramSender {
    /// Send one datagram.
    pub fn send(&self, datagram: Bytes) -> Result<()> {
        let length = datagram.len() as u64;
        self.tx.send(datagram).map_err(|_| {
            TermwireError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "datagram receiver closed",
            ))
        })?;
        self.counters.datagrams.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(length, Ordering::Relaxed);
        Ok(())
    }

    /// Counters of this channel.
    pub fn counters(&self) -> &Arc<MediumCounters> {
        &self.counters
    }
}

/// Receiving end of a datagram channel.
#[derive(Debug)]
pub struct DatagramReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl DatagramReceiver {
    /// Next datagram if one is queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

/// Create a datagram channel.
pub fn datagram_channel() -> (DatagramSender, DatagramReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DatagramSender {
            tx,
            counters: Arc::new(MediumCounters::default()),
        },
        DatagramReceiver { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_order_and_counters() {
        let (tx, mut rx) = datagram_channel();
        tx.send(Bytes::from_static(b"one")).unwrap();
        tx.send(Bytes::from_static(b"three")).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"three"));
        assert!(rx.try_recv().is_none());
        assert_eq!(tx.counters().datagrams(), 2);
        assert_eq!(tx.counters().bytes(), 8);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = datagram_channel();
        drop(rx);
        assert!(matches!(
            tx.send(Bytes::from_static(b"x")),
            Err(TermwireError::Io(_))
        ));
    }
}
