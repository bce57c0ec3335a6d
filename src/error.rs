//! Error types for termwire.
//!
//! Two families live here:
//! - [`OfferError`] - transport-local, retryable outcomes of an offer
//!   (back pressure, admin action, closed). These are expected and map to the
//!   negative sentinels returned by [`Publication::offer`](crate::Publication::offer).
//! - [`TermwireError`] - hard failures: protocol violations, schema
//!   mismatches, I/O, configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Sentinel: no consumer is attached to the publication.
pub const NOT_CONNECTED: i64 = -1;

/// Sentinel: the flow-control window is exhausted, retry later.
pub const BACK_PRESSURED: i64 = -2;

/// Sentinel: a term rotation is in progress, retry immediately.
pub const ADMIN_ACTION: i64 = -3;

/// Sentinel: the publication has been closed.
pub const CLOSED: i64 = -4;

/// Sentinel: the stream reached the maximum representable position.
pub const MAX_POSITION_EXCEEDED: i64 = -5;

/// Sentinel: the message is longer than the publication accepts.
pub const MESSAGE_TOO_LONG: i64 = -6;

/// Non-exceptional offer outcomes the caller is expected to retry or escalate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OfferError {
    /// Message exceeds the maximum message length; never retryable.
    #[error("message length {length} exceeds maximum {max}")]
    MessageTooLong {
        /// Offered length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// No subscriber or sender is consuming the stream.
    #[error("publication is not connected")]
    NotConnected,

    /// The receiver is lagging beyond the flow-control window.
    #[error("publication is back pressured")]
    BackPressured,

    /// Another writer is rotating the log.
    #[error("publication is performing an admin action")]
    AdminAction,

    /// The publication is closed.
    #[error("publication is closed")]
    Closed,

    /// Term id space exhausted.
    #[error("publication reached its maximum position")]
    MaxPositionExceeded,
}

impl OfferError {
    /// The negative sentinel for this outcome.
    #[inline]
    pub fn code(self) -> i64 {
        match self {
            OfferError::NotConnected => NOT_CONNECTED,
            OfferError::BackPressured => BACK_PRESSURED,
            OfferError::AdminAction => ADMIN_ACTION,
            OfferError::Closed => CLOSED,
            OfferError::MaxPositionExceeded => MAX_POSITION_EXCEEDED,
            OfferError::MessageTooLong { .. } => MESSAGE_TOO_LONG,
        }
    }

    /// Map a sentinel back to its outcome. Non-negative values are positions.
    ///
    /// `MESSAGE_TOO_LONG` carries lengths and cannot be mapped back.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            NOT_CONNECTED => Some(OfferError::NotConnected),
            BACK_PRESSURED => Some(OfferError::BackPressured),
            ADMIN_ACTION => Some(OfferError::AdminAction),
            CLOSED => Some(OfferError::Closed),
            MAX_POSITION_EXCEEDED => Some(OfferError::MaxPositionExceeded),
            _ => None,
        }
    }

    /// Whether a retry can succeed without outside intervention.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(self, OfferError::BackPressured | OfferError::AdminAction)
    }
}

/// Main error type for all termwire operations.
#[derive(Debug, Error)]
pub enum TermwireError {
    /// I/O error, e.g. deleting a segment file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A payload carried a schema id other than the one expected.
    #[error("expected schemaId={expected}, actual={actual}")]
    SchemaMismatch {
        /// Schema id the decoder understands.
        expected: u16,
        /// Schema id found on the wire.
        actual: u16,
    },

    /// Snapshot stream is malformed (duplicate begin, end without begin, ...).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Buffer too short for the layout being decoded.
    #[error("Truncated buffer: needed {needed} bytes, available {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Offer failed and the caller chose not to retry further.
    #[error("Offer failed: {0}")]
    Offer(#[from] OfferError),

    /// The image closed before the expected data arrived.
    #[error("Image closed")]
    ImageClosed,

    /// Back pressure persisted past the retry timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Segment file could not be deleted.
    #[error("segment delete failed for {path}: {cause}")]
    Segment {
        /// Segment file path.
        path: PathBuf,
        /// Underlying failure.
        cause: String,
    },
}

impl TermwireError {
    /// Shorthand for a protocol violation.
    pub fn protocol(msg: impl Into<String>) -> Self {
        TermwireError::ProtocolViolation(msg.into())
    }

    /// Whether the failure is a transport-local outcome worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TermwireError::Offer(e) if e.is_retryable())
    }
}

/// Result type alias using TermwireError.
pub type Result<T> = std::result::Result<T, TermwireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_error_codes_are_distinct_and_negative() {
        let all = [
            OfferError::NotConnected,
            OfferError::BackPressured,
            OfferError::AdminAction,
            OfferError::Closed,
            OfferError::MaxPositionExceeded,
        ];
        for e in all {
            assert!(e.code() < 0);
            assert_eq!(OfferError::from_code(e.code()), Some(e));
        }
        assert_eq!(OfferError::from_code(0), None);
        assert_eq!(OfferError::from_code(4096), None);
    }

    #[test]
    fn test_retryable() {
        assert!(OfferError::BackPressured.is_retryable());
        assert!(OfferError::AdminAction.is_retryable());
        assert!(!OfferError::Closed.is_retryable());
        assert!(!OfferError::NotConnected.is_retryable());
        assert!(!OfferError::MessageTooLong { length: 10, max: 5 }.is_retryable());
        assert_eq!(
            OfferError::MessageTooLong { length: 10, max: 5 }.code(),
            MESSAGE_TOO_LONG
        );

        assert!(TermwireError::Offer(OfferError::AdminAction).is_retryable());
        assert!(!TermwireError::ImageClosed.is_retryable());
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = TermwireError::SchemaMismatch {
            expected: 111,
            actual: 7,
        };
        assert_eq!(err.to_string(), "expected schemaId=111, actual=7");
    }
}
