//! Error response sent back on a control channel.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Offending Correlation ID          i64 LE │
//! ├──────────────────────┬───────────────────┤
//! │ Error Code    i32 LE │ Msg Length i32 LE │
//! ├──────────────────────┴───────────────────┤
//! │ Message (UTF-8)                      ... │
//! └──────────────────────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TermwireError};

/// Fixed prefix before the message bytes.
pub const ERROR_RESPONSE_HEADER_LENGTH: usize = 16;

/// Error codes carried by an [`ErrorResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unused,
    InvalidChannel,
    UnknownSubscription,
    UnknownPublication,
    ChannelEndpointError,
    UnknownCounter,
    UnknownCommandTypeId,
    MalformedCommand,
    NotSupported,
    UnknownHost,
    ResourceTemporarilyUnavailable,
    GenericError,
    /// Any code this side does not know.
    Unknown,
}

impl ErrorCode {
    pub fn value(self) -> i32 {
        match self {
            ErrorCode::Unused => 0,
            ErrorCode::InvalidChannel => 1,
            ErrorCode::UnknownSubscription => 2,
            ErrorCode::UnknownPublication => 3,
            ErrorCode::ChannelEndpointError => 4,
            ErrorCode::UnknownCounter => 5,
            ErrorCode::UnknownCommandTypeId => 6,
            ErrorCode::MalformedCommand => 7,
            ErrorCode::NotSupported => 8,
            ErrorCode::UnknownHost => 9,
            ErrorCode::ResourceTemporarilyUnavailable => 10,
            ErrorCode::GenericError => 11,
            ErrorCode::Unknown => -1,
        }
    }

    pub fn from_value(value: i32) -> Self {
        match value {
            0 => ErrorCode::Unused,
            1 => ErrorCode::InvalidChannel,
            2 => ErrorCode::UnknownSubscription,
            3 => ErrorCode::UnknownPublication,
            4 => ErrorCode::ChannelEndpointError,
            5 => ErrorCode::UnknownCounter,
            6 => ErrorCode::UnknownCommandTypeId,
            7 => ErrorCode::MalformedCommand,
            8 => ErrorCode::NotSupported,
            9 => ErrorCode::UnknownHost,
            10 => ErrorCode::ResourceTemporarilyUnavailable,
            11 => ErrorCode::GenericError,
            _ => ErrorCode::Unknown,
        }
    }
}

/// A correlated error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub offending_correlation_id: i64,
    pub error_code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(offending_correlation_id: i64, error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            offending_correlation_id,
            error_code,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ERROR_RESPONSE_HEADER_LENGTH + self.message.len());
        buf.put_i64_le(self.offending_correlation_id);
        buf.put_i32_le(self.error_code.value());
        buf.put_i32_le(self.message.len() as i32);
        buf.put_slice(self.message.as_bytes());
        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ERROR_RESPONSE_HEADER_LENGTH {
            return Err(TermwireError::Truncated {
                needed: ERROR_RESPONSE_HEADER_LENGTH,
                available: buf.len(),
            });
        }

        let mut correlation = [0u8; 8];
        correlation.copy_from_slice(&buf[0..8]);
        let code = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let length = i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let length = usize::try_from(length)
            .map_err(|_| TermwireError::protocol(format!("negative error message length {length}")))?;

        let needed = ERROR_RESPONSE_HEADER_LENGTH + length;
        if buf.len() < needed {
            return Err(TermwireError::Truncated {
                needed,
                available: buf.len(),
            });
        }
        let message = std::str::from_utf8(&buf[ERROR_RESPONSE_HEADER_LENGTH..needed])
            .map_err(|e| TermwireError::protocol(format!("invalid UTF-8 in error message: {e}")))?;

        Ok(Self {
            offending_correlation_id: i64::from_le_bytes(correlation),
            error_code: ErrorCode::from_value(code),
            message: message.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let response = ErrorResponse::new(42, ErrorCode::GenericError, "boom");
        let bytes = response.encode();

        assert_eq!(&bytes[0..8], &42i64.to_le_bytes());
        assert_eq!(&bytes[8..12], &11i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &4i32.to_le_bytes());
        assert_eq!(&bytes[16..], b"boom");
        assert_eq!(ErrorResponse::decode(&bytes).unwrap(), response);
    }

    #[test]
    fn test_codes() {
        for value in 0..=11 {
            assert_eq!(ErrorCode::from_value(value).value(), value);
        }
        assert_eq!(ErrorCode::from_value(12), ErrorCode::Unknown);
        assert_eq!(ErrorCode::Unknown.value(), -1);
    }

    #[test]
    fn test_truncated_message() {
        let bytes = ErrorResponse::new(1, ErrorCode::NotSupported, "too long").encode();
        assert!(matches!(
            ErrorResponse::decode(&bytes[..20]),
            Err(TermwireError::Truncated {
                needed: 24,
                available: 20
            })
        ));
    }

    #[test]
    fn test_negative_length() {
        let mut buf = BytesMut::new();
        buf.put_i64_le(1);
        buf.put_i32_le(11);
        buf.put_i32_le(-3);
        assert!(matches!(
            ErrorResponse::decode(&buf),
            Err(TermwireError::ProtocolViolation(_))
        ));
    }
}
