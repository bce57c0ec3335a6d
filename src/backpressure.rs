//! Back pressure handling for offers.
//!
//! A publication never blocks: when the flow-control window is exhausted or
//! the log is rotating, `offer` returns `BACK_PRESSURED` / `ADMIN_ACTION`.
//! This module provides the retry loops callers wrap around it.
//!
//! # Usage
//!
//! - [`OfferRetry::offer`] - async, sleeps between attempts (tokio), gives up
//!   with `BackpressureTimeout` after the timeout
//! - [`offer_with_idle`] - sync, idles between attempts with an
//!   [`IdleStrategy`], gives up after a number of attempts
//!
//! Non-retryable outcomes (`NOT_CONNECTED`, `CLOSED`, ...) return at once.
//!
//! # Configuration
//!
//! - Timeout: how long to keep retrying (default: 5s)
//! - Check interval: sleep between attempts (default: 100µs)

use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, TermwireError};
use crate::idle::IdleStrategy;
use crate::publication::Publication;

/// Default back pressure timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between attempts.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_micros(100);

/// Async retry policy for offers.
#[derive(Debug, Clone, Copy)]
pub struct OfferRetry {
    timeout: Duration,
    check_interval: Duration,
}

impl OfferRetry {
    /// Policy with the given timeout and the default check interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the interval between attempts.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Offer until accepted, a hard failure, or the timeout.
    pub async fn offer(&self, publication: &Publication, payload: &[u8]) -> Result<i64> {
        // Fast path: try immediately
        match publication.try_offer(payload) {
            Ok(position) => return Ok(position),
            Err(e) if !e.is_retryable() => return Err(e.into()),
            Err(_) => {}
        }

        let start = Instant::now();
        loop {
            tokio::time::sleep(self.check_interval).await;

            match publication.try_offer(payload) {
                Ok(position) => return Ok(position),
                Err(e) if !e.is_retryable() => return Err(e.into()),
                Err(_) => {}
            }

            if start.elapsed() > self.timeout {
                warn!(
                    session_id = publication.session_id(),
                    stream_id = publication.stream_id(),
                    "offer timed out under back pressure"
                );
                return Err(TermwireError::BackpressureTimeout);
            }
        }
    }
}

impl Default for OfferRetry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Offer until accepted, idling between retryable failures.
///
/// Gives up with the last retryable outcome after `max_attempts`.
pub fn offer_with_idle(
    publication: &Publication,
    payload: &[u8],
    idle: &mut dyn IdleStrategy,
    max_attempts: usize,
) -> Result<i64> {
    let mut last = None;
    for _ in 0..max_attempts {
        match publication.try_offer(payload) {
            Ok(position) => {
                idle.reset();
                return Ok(position);
            }
            Err(e) if !e.is_retryable() => return Err(e.into()),
            Err(e) => {
                last = Some(e);
                idle.idle();
            }
        }
    }

    warn!(
        session_id = publication.session_id(),
        stream_id = publication.stream_id(),
        max_attempts,
        "offer retries exhausted"
    );
    Err(last.map_or(TermwireError::BackpressureTimeout, TermwireError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::error::OfferError;
    use crate::idle::NoOpIdleStrategy;

    fn saturated() -> (Publication, crate::Image) {
        let config = TransportConfig::default()
            .with_term_length(4096)
            .with_mtu_length(512)
            .with_publication_window(1024);
        let publication = Publication::new(&config, 1, 1).unwrap();
        let image = publication.image();
        while publication.try_offer(&[0; 224]).is_ok() {}
        (publication, image)
    }

    #[test]
    fn test_offer_with_idle_success() {
        let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
        let _image = publication.image();
        let position = offer_with_idle(&publication, b"abc", &mut NoOpIdleStrategy, 3).unwrap();
        assert_eq!(position, 64);
    }

    #[test]
    fn test_offer_with_idle_exhausted() {
        let (publication, _image) = saturated();
        let err = offer_with_idle(&publication, b"abc", &mut NoOpIdleStrategy, 5).unwrap_err();
        assert!(matches!(err, TermwireError::Offer(OfferError::BackPressured)));
    }

    #[test]
    fn test_offer_with_idle_not_retryable() {
        let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
        let err = offer_with_idle(&publication, b"abc", &mut NoOpIdleStrategy, 5).unwrap_err();
        assert!(matches!(err, TermwireError::Offer(OfferError::NotConnected)));
    }

    #[tokio::test]
    async fn test_offer_immediate() {
        let publication = Publication::new(&TransportConfig::default(), 1, 1).unwrap();
        let _image = publication.image();
        let position = OfferRetry::default().offer(&publication, b"x").await.unwrap();
        assert_eq!(position, 64);
    }

    #[tokio::test]
    async fn test_offer_timeout() {
        let (publication, _image) = saturated();
        let retry = OfferRetry::new(Duration::from_millis(10));

        let start = Instant::now();
        let result = retry.offer(&publication, b"x").await;
        assert!(matches!(result, Err(TermwireError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_offer_succeeds_after_consumer_catches_up() {
        let (publication, mut image) = saturated();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            image.poll(|_, _| {}, 100);
            // keep the consumer registered until the offer lands
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let result = OfferRetry::new(Duration::from_secs(1))
            .offer(&publication, b"x")
            .await;
        assert!(result.is_ok());
    }
}
