//! Receiver-to-sender control messages.
//!
//! Both messages share a 16-byte prefix followed by three i32 fields:
//! ```text
//! ┌──────────────┬─────────┬───────┬──────────┐
//! │ Frame Length │ Version │ Flags │ Type     │
//! │ i32 LE       │ u8      │ u8    │ u16 LE   │
//! ├──────────────┴─────────┴───────┴──────────┤
//! │ Session ID                         i32 LE │
//! │ Stream ID                          i32 LE │
//! ├───────────────────────────────────────────┤
//! │ SM:  consumption term id / offset, window │
//! │ NAK: term id / term offset / length       │
//! └───────────────────────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, TermwireError};
use crate::protocol::{frame_type, read_i32, CURRENT_VERSION};

/// Encoded length of every control message.
pub const CONTROL_MESSAGE_LENGTH: usize = 28;

/// Receiver progress and window, driving sender flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub session_id: i32,
    pub stream_id: i32,
    /// Term of the receiver's consumption position.
    pub consumption_term_id: i32,
    /// Offset of the receiver's consumption position.
    pub consumption_term_offset: i32,
    /// Bytes the sender may run ahead of the consumption position.
    pub receiver_window: i32,
}

/// Request to retransmit `[term_offset, term_offset + length)` of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nak {
    pub session_id: i32,
    pub stream_id: i32,
    pub term_id: i32,
    pub term_offset: i32,
    pub length: i32,
}

/// A decoded control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Status(StatusMessage),
    Nak(Nak),
}

impl ControlMessage {
    /// Encode into a datagram.
    pub fn encode(&self) -> Bytes {
        let (kind, session_id, stream_id, fields) = match self {
            ControlMessage::Status(sm) => (
                frame_type::SM,
                sm.session_id,
                sm.stream_id,
                [sm.consumption_term_id, sm.consumption_term_offset, sm.receiver_window],
            ),
            ControlMessage::Nak(nak) => (
                frame_type::NAK,
                nak.session_id,
                nak.stream_id,
                [nak.term_id, nak.term_offset, nak.length],
            ),
        };

        let mut buf = BytesMut::with_capacity(CONTROL_MESSAGE_LENGTH);
        buf.put_i32_le(CONTROL_MESSAGE_LENGTH as i32);
        buf.put_u8(CURRENT_VERSION);
        buf.put_u8(0);
        buf.put_u16_le(kind);
        buf.put_i32_le(session_id);
        buf.put_i32_le(stream_id);
        for field in fields {
            buf.put_i32_le(field);
        }
        buf.freeze()
    }

    /// Decode a datagram.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CONTROL_MESSAGE_LENGTH {
            return Err(TermwireError::Truncated {
                needed: CONTROL_MESSAGE_LENGTH,
                available: buf.len(),
            });
        }

        let kind = u16::from_le_bytes([buf[6], buf[7]]);
        let session_id = read_i32(buf, 8);
        let stream_id = read_i32(buf, 12);
        let fields = [read_i32(buf, 16), read_i32(buf, 20), read_i32(buf, 24)];

        match kind {
            frame_type::SM => Ok(ControlMessage::Status(StatusMessage {
                session_id,
                stream_id,
                consumption_term_id: fields[0],
                consumption_term_offset: fields[1],
                receiver_window: fields[2],
            })),
            frame_type::NAK => Ok(ControlMessage::Nak(Nak {
                session_id,
                stream_id,
                term_id: fields[0],
                term_offset: fields[1],
                length: fields[2],
            })),
            other => Err(TermwireError::protocol(format!(
                "unknown control message type {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_layout() {
        let sm = ControlMessage::Status(StatusMessage {
            session_id: 1,
            stream_id: 2,
            consumption_term_id: 3,
            consumption_term_offset: 4096,
            receiver_window: 16384,
        });
        let bytes = sm.encode();
        assert_eq!(bytes.len(), CONTROL_MESSAGE_LENGTH);
        assert_eq!(&bytes[6..8], &frame_type::SM.to_le_bytes());
        assert_eq!(&bytes[20..24], &4096i32.to_le_bytes());
        assert_eq!(ControlMessage::decode(&bytes).unwrap(), sm);
    }

    #[test]
    fn test_nak_decode() {
        let nak = ControlMessage::Nak(Nak {
            session_id: 1,
            stream_id: 2,
            term_id: 7,
            term_offset: 256,
            length: 128,
        });
        assert_eq!(ControlMessage::decode(&nak.encode()).unwrap(), nak);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ControlMessage::decode(&[0u8; 10]),
            Err(TermwireError::Truncated { needed: 28, available: 10 })
        ));

        let mut bytes = BytesMut::from(&ControlMessage::Nak(Nak {
            session_id: 0,
            stream_id: 0,
            term_id: 0,
            term_offset: 0,
            length: 0,
        })
        .encode()[..]);
        bytes[6] = 9;
        assert!(matches!(
            ControlMessage::decode(&bytes),
            Err(TermwireError::ProtocolViolation(_))
        ));
    }
}
