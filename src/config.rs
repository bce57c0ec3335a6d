//! Configuration for publications, images, the network simulation and
//! snapshot capture.
//!
//! Both config types implement `Default`, builder-style `with_*` setters and
//! `serde::Deserialize`, so they can be built in code or loaded from JSON:
//!
//! ```
//! use termwire::config::TransportConfig;
//!
//! let config = TransportConfig::from_json(r#"{ "term_length": 65536, "mtu_length": 1408 }"#).unwrap();
//! assert_eq!(config.term_length, 65536);
//! assert_eq!(config.publication_window(), 32768);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TermwireError};
use crate::protocol::{FRAME_ALIGNMENT, HEADER_LENGTH};

/// Smallest allowed term length (1 KiB).
pub const MIN_TERM_LENGTH: usize = 1024;

/// Largest allowed term length (1 GiB).
pub const MAX_TERM_LENGTH: usize = 1024 * 1024 * 1024;

/// Default term length (64 KiB).
pub const DEFAULT_TERM_LENGTH: usize = 64 * 1024;

/// Default MTU, header included.
pub const DEFAULT_MTU_LENGTH: usize = 1408;

/// Upper bound on a single message regardless of term length (16 MiB).
pub const MAX_MESSAGE_LENGTH_CAP: usize = 16 * 1024 * 1024;

/// Default fragments consumed per snapshot reader poll.
pub const DEFAULT_FRAGMENT_LIMIT: usize = 10;

/// Default offer attempts before a snapshot capture gives up.
pub const DEFAULT_OFFER_RETRY_LIMIT: usize = 10_000;

/// Transport settings shared by publications, images, senders and receivers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Term length in bytes, a power of two.
    pub term_length: usize,
    /// Maximum frame length on the wire, header included.
    pub mtu_length: usize,
    /// Term id of the first term.
    pub initial_term_id: i32,
    /// Publication flow-control window; `None` means half a term.
    pub publication_window: Option<usize>,
    /// Receiver window advertised in status messages; `None` means a quarter term.
    pub receiver_window: Option<usize>,
    /// Delay before the first NAK for a newly detected gap.
    #[serde(with = "duration_nanos")]
    pub nak_delay: Duration,
    /// Delay between repeated NAKs for the same gap.
    #[serde(with = "duration_nanos")]
    pub nak_retry_interval: Duration,
    /// NAKs sent for one gap before it is skipped.
    pub max_nak_retries: u32,
    /// Window in which duplicate NAKs for a retransmitted range are ignored.
    #[serde(with = "duration_nanos")]
    pub retransmit_linger: Duration,
    /// Concurrent retransmit actions the sender keeps.
    pub max_retransmits: usize,
    /// Idle time after which the sender emits a heartbeat.
    #[serde(with = "duration_nanos")]
    pub heartbeat_interval: Duration,
    /// Interval between unsolicited status messages.
    #[serde(with = "duration_nanos")]
    pub status_message_interval: Duration,
    /// Datagrams processed per duty cycle.
    pub max_datagrams_per_cycle: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            term_length: DEFAULT_TERM_LENGTH,
            mtu_length: DEFAULT_MTU_LENGTH,
            initial_term_id: 0,
            publication_window: None,
            receiver_window: None,
            nak_delay: Duration::from_micros(100),
            nak_retry_interval: Duration::from_millis(1),
            max_nak_retries: 8,
            retransmit_linger: Duration::from_micros(500),
            max_retransmits: 16,
            heartbeat_interval: Duration::from_millis(100),
            status_message_interval: Duration::from_millis(200),
            max_datagrams_per_cycle: 64,
        }
    }
}

impl TransportConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field and the relations between them.
    pub fn validate(&self) -> Result<()> {
        if !self.term_length.is_power_of_two()
            || self.term_length < MIN_TERM_LENGTH
            || self.term_length > MAX_TERM_LENGTH
        {
            return Err(TermwireError::Config(format!(
                "term_length {} must be a power of two in [{}, {}]",
                self.term_length, MIN_TERM_LENGTH, MAX_TERM_LENGTH
            )));
        }

        if self.mtu_length <= HEADER_LENGTH
            || self.mtu_length % FRAME_ALIGNMENT != 0
            || self.mtu_length > self.term_length / 2
        {
            return Err(TermwireError::Config(format!(
                "mtu_length {} must be a multiple of {} between {} and term_length / 2",
                self.mtu_length,
                FRAME_ALIGNMENT,
                HEADER_LENGTH + FRAME_ALIGNMENT
            )));
        }

        let window = self.publication_window();
        if window < self.mtu_length || window > self.term_length / 2 {
            return Err(TermwireError::Config(format!(
                "publication_window {} must be in [mtu_length, term_length / 2]",
                window
            )));
        }

        let receiver_window = self.receiver_window();
        if receiver_window < self.mtu_length {
            return Err(TermwireError::Config(format!(
                "receiver_window {} smaller than mtu_length {}",
                receiver_window, self.mtu_length
            )));
        }

        // Retransmits and late readers must never reach a cleaned partition.
        if window + receiver_window + self.max_message_length() > self.term_length {
            return Err(TermwireError::Config(format!(
                "publication_window {} + receiver_window {} + max message {} exceeds term_length {}",
                window,
                receiver_window,
                self.max_message_length(),
                self.term_length
            )));
        }

        if self.max_datagrams_per_cycle == 0 || self.max_retransmits == 0 {
            return Err(TermwireError::Config(
                "max_datagrams_per_cycle and max_retransmits must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective publication window.
    #[inline]
    pub fn publication_window(&self) -> usize {
        self.publication_window.unwrap_or(self.term_length / 2)
    }

    /// Effective receiver window.
    #[inline]
    pub fn receiver_window(&self) -> usize {
        self.receiver_window.unwrap_or(self.term_length / 4)
    }

    /// Largest payload carried by one frame.
    #[inline]
    pub fn max_payload_length(&self) -> usize {
        self.mtu_length - HEADER_LENGTH
    }

    /// Largest message a publication accepts.
    #[inline]
    pub fn max_message_length(&self) -> usize {
        (self.term_length / 8).min(MAX_MESSAGE_LENGTH_CAP)
    }

    /// Set the term length.
    pub fn with_term_length(mut self, term_length: usize) -> Self {
        self.term_length = term_length;
        self
    }

    /// Set the MTU.
    pub fn with_mtu_length(mut self, mtu_length: usize) -> Self {
        self.mtu_length = mtu_length;
        self
    }

    /// Set the initial term id.
    pub fn with_initial_term_id(mut self, initial_term_id: i32) -> Self {
        self.initial_term_id = initial_term_id;
        self
    }

    /// Set the publication window.
    pub fn with_publication_window(mut self, window: usize) -> Self {
        self.publication_window = Some(window);
        self
    }

    /// Set the receiver window.
    pub fn with_receiver_window(mut self, window: usize) -> Self {
        self.receiver_window = Some(window);
        self
    }

    /// Set the initial NAK delay.
    pub fn with_nak_delay(mut self, delay: Duration) -> Self {
        self.nak_delay = delay;
        self
    }

    /// Set the NAK retry interval.
    pub fn with_nak_retry_interval(mut self, interval: Duration) -> Self {
        self.nak_retry_interval = interval;
        self
    }

    /// Set the NAK retry limit.
    pub fn with_max_nak_retries(mut self, retries: u32) -> Self {
        self.max_nak_retries = retries;
        self
    }

    /// Set the retransmit linger.
    pub fn with_retransmit_linger(mut self, linger: Duration) -> Self {
        self.retransmit_linger = linger;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the status message interval.
    pub fn with_status_message_interval(mut self, interval: Duration) -> Self {
        self.status_message_interval = interval;
        self
    }
}

/// Snapshot capture and recovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Fragments consumed per reader poll.
    pub fragment_limit: usize,
    /// Offer attempts per record before the capture aborts.
    pub offer_retry_limit: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            offer_retry_limit: DEFAULT_OFFER_RETRY_LIMIT,
        }
    }
}

impl SnapshotConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Both limits must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_limit == 0 {
            return Err(TermwireError::Config("fragment_limit must be positive".to_string()));
        }
        if self.offer_retry_limit == 0 {
            return Err(TermwireError::Config("offer_retry_limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the fragment limit.
    pub fn with_fragment_limit(mut self, limit: usize) -> Self {
        self.fragment_limit = limit;
        self
    }

    /// Set the offer retry limit.
    pub fn with_offer_retry_limit(mut self, limit: usize) -> Self {
        self.offer_retry_limit = limit;
        self
    }
}

/// Durations are written as integer nanoseconds in JSON.
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
