//! Record codecs.
//!
//! Encoders write the schema header, the fixed block and any var-data.
//! Decoders wrap the body once per call and honour the acting block length.

use bytes::{BufMut, Bytes, BytesMut};

use super::codec::{BlockDecoder, VAR_DATA_LENGTH_PREFIX};
use super::header::{MessageHeader, MESSAGE_HEADER_LENGTH};
use super::template_id;
use super::types::{CloseReason, ClusterTimeUnit, SnapshotMark};
use super::SCHEMA_ID;
use crate::error::{Result, TermwireError};

/// A record that can be written to a snapshot.
pub trait EncodeRecord {
    const TEMPLATE_ID: u16;
    const BLOCK_LENGTH: u16;

    /// Write the fixed block and any var-data.
    fn encode_body(&self, buf: &mut BytesMut);

    /// Write the schema header followed by the body.
    fn encode_into(&self, buf: &mut BytesMut) {
        MessageHeader::new(Self::TEMPLATE_ID, Self::BLOCK_LENGTH).encode_into(buf);
        self.encode_body(buf);
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_LENGTH + usize::from(Self::BLOCK_LENGTH));
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

fn put_var_data(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(VAR_DATA_LENGTH_PREFIX + data.len());
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

/// Begin, section or end marker of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMarker {
    pub type_id: i64,
    pub log_position: i64,
    pub leadership_term_id: i64,
    pub index: i32,
    pub mark: SnapshotMark,
    pub time_unit: ClusterTimeUnit,
    pub app_version: i32,
}

impl EncodeRecord for SnapshotMarker {
    const TEMPLATE_ID: u16 = template_id::SNAPSHOT_MARKER;
    const BLOCK_LENGTH: u16 = 40;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.type_id);
        buf.put_i64_le(self.log_position);
        buf.put_i64_le(self.leadership_term_id);
        buf.put_i32_le(self.index);
        buf.put_i32_le(self.mark.value());
        buf.put_i32_le(self.time_unit.value());
        buf.put_i32_le(self.app_version);
    }
}

impl SnapshotMarker {
    fn decode(d: &BlockDecoder<'_>) -> Self {
        Self {
            type_id: d.i64_at(0),
            log_position: d.i64_at(8),
            leadership_term_id: d.i64_at(16),
            index: d.i32_at(24),
            mark: SnapshotMark::from_value(d.i32_at(28)),
            time_unit: ClusterTimeUnit::from_value(d.i32_at(32)),
            app_version: d.i32_at(36),
        }
    }
}

/// An open client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSession<'a> {
    pub cluster_session_id: i64,
    pub correlation_id: i64,
    pub opened_log_position: i64,
    pub time_of_last_activity: i64,
    pub close_reason: CloseReason,
    pub response_stream_id: i32,
    pub response_channel: &'a str,
}

impl EncodeRecord for ClusterSession<'_> {
    const TEMPLATE_ID: u16 = template_id::CLUSTER_SESSION;
    const BLOCK_LENGTH: u16 = 40;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.cluster_session_id);
        buf.put_i64_le(self.correlation_id);
        buf.put_i64_le(self.opened_log_position);
        buf.put_i64_le(self.time_of_last_activity);
        buf.put_i32_le(self.close_reason.value());
        buf.put_i32_le(self.response_stream_id);
        put_var_data(buf, self.response_channel.as_bytes());
    }
}

impl<'a> ClusterSession<'a> {
    fn decode(d: &BlockDecoder<'a>) -> Result<Self> {
        Ok(Self {
            cluster_session_id: d.i64_at(0),
            correlation_id: d.i64_at(8),
            opened_log_position: d.i64_at(16),
            time_of_last_activity: d.i64_at(24),
            close_reason: CloseReason::from_value(d.i32_at(32)),
            response_stream_id: d.i32_at(36),
            response_channel: d.var_str()?,
        })
    }
}

/// A scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub correlation_id: i64,
    pub deadline: i64,
}

impl EncodeRecord for Timer {
    const TEMPLATE_ID: u16 = template_id::TIMER;
    const BLOCK_LENGTH: u16 = 16;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.correlation_id);
        buf.put_i64_le(self.deadline);
    }
}

impl Timer {
    fn decode(d: &BlockDecoder<'_>) -> Self {
        Self {
            correlation_id: d.i64_at(0),
            deadline: d.i64_at(8),
        }
    }
}

/// Consensus module counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsensusModule {
    pub next_session_id: i64,
    pub next_service_session_id: i64,
    pub log_service_session_id: i64,
    pub pending_message_capacity: i32,
}

impl EncodeRecord for ConsensusModule {
    const TEMPLATE_ID: u16 = template_id::CONSENSUS_MODULE;
    const BLOCK_LENGTH: u16 = 28;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.next_session_id);
        buf.put_i64_le(self.next_service_session_id);
        buf.put_i64_le(self.log_service_session_id);
        buf.put_i32_le(self.pending_message_capacity);
    }
}

impl ConsensusModule {
    fn decode(d: &BlockDecoder<'_>) -> Self {
        Self {
            next_session_id: d.i64_at(0),
            next_service_session_id: d.i64_at(8),
            log_service_session_id: d.i64_at(16),
            pending_message_capacity: d.i32_at(24),
        }
    }
}

/// Per-service tracking of pending service messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessageTracker {
    pub next_service_session_id: i64,
    pub log_service_session_id: i64,
    pub pending_message_capacity: i32,
    pub service_id: i32,
}

impl EncodeRecord for PendingMessageTracker {
    const TEMPLATE_ID: u16 = template_id::PENDING_MESSAGE_TRACKER;
    const BLOCK_LENGTH: u16 = 24;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.next_service_session_id);
        buf.put_i64_le(self.log_service_session_id);
        buf.put_i32_le(self.pending_message_capacity);
        buf.put_i32_le(self.service_id);
    }
}

impl PendingMessageTracker {
    fn decode(d: &BlockDecoder<'_>) -> Self {
        Self {
            next_service_session_id: d.i64_at(0),
            log_service_session_id: d.i64_at(8),
            pending_message_capacity: d.i32_at(16),
            service_id: d.i32_at(20),
        }
    }
}

/// Header of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMessageHeader {
    pub leadership_term_id: i64,
    pub cluster_session_id: i64,
    pub timestamp: i64,
}

impl SessionMessageHeader {
    fn decode(d: &BlockDecoder<'_>) -> Self {
        Self {
            leadership_term_id: d.i64_at(0),
            cluster_session_id: d.i64_at(8),
            timestamp: d.i64_at(16),
        }
    }
}

/// A service message not yet appended to the log; header plus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessage<'a> {
    pub header: SessionMessageHeader,
    pub payload: &'a [u8],
}

impl EncodeRecord for PendingMessage<'_> {
    const TEMPLATE_ID: u16 = template_id::SESSION_MESSAGE_HEADER;
    const BLOCK_LENGTH: u16 = 24;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.reserve(usize::from(Self::BLOCK_LENGTH) + self.payload.len());
        buf.put_i64_le(self.header.leadership_term_id);
        buf.put_i64_le(self.header.cluster_session_id);
        buf.put_i64_le(self.header.timestamp);
        buf.put_slice(self.payload);
    }
}

/// Cluster membership, carried in snapshots but not restored from them.
///
/// The member list stays raw until asked for, so a reader that skips the
/// record never fails on its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMembers<'a> {
    pub member_id: i32,
    pub high_member_id: i32,
    /// Member list bytes, UTF-8 when written by [`ClusterMembers::new`].
    pub members: &'a [u8],
}

impl EncodeRecord for ClusterMembers<'_> {
    const TEMPLATE_ID: u16 = template_id::CLUSTER_MEMBERS;
    const BLOCK_LENGTH: u16 = 8;

    fn encode_body(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.member_id);
        buf.put_i32_le(self.high_member_id);
        put_var_data(buf, self.members);
    }
}

impl<'a> ClusterMembers<'a> {
    pub fn new(member_id: i32, high_member_id: i32, members: &'a str) -> Self {
        Self {
            member_id,
            high_member_id,
            members: members.as_bytes(),
        }
    }

    /// The member list as text.
    pub fn members_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.members)
            .map_err(|e| TermwireError::protocol(format!("invalid UTF-8 in cluster members: {e}")))
    }

    fn decode(d: &BlockDecoder<'a>) -> Result<Self> {
        Ok(Self {
            member_id: d.i32_at(0),
            high_member_id: d.i32_at(4),
            members: d.var_data()?,
        })
    }
}

/// One decoded snapshot record, borrowing var-data from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRecord<'a> {
    Marker(SnapshotMarker),
    Session(ClusterSession<'a>),
    Timer(Timer),
    ConsensusModule(ConsensusModule),
    PendingMessageTracker(PendingMessageTracker),
    PendingMessage(PendingMessage<'a>),
    ClusterMembers(ClusterMembers<'a>),
    /// A template this reader does not know; skipped by consumers.
    Unknown { template_id: u16 },
}

impl<'a> SnapshotRecord<'a> {
    /// Decode a record from its schema header onwards.
    ///
    /// # Errors
    ///
    /// - [`TermwireError::SchemaMismatch`] when the schema id is foreign
    /// - [`TermwireError::Truncated`] when the buffer is shorter than the
    ///   acting block or its var-data
    ///
    /// # Example
    ///
    /// ```
    /// use termwire::schema::{EncodeRecord, SnapshotRecord, Timer};
    ///
    /// let bytes = Timer { correlation_id: 7, deadline: 1_000 }.encode();
    /// match SnapshotRecord::decode(&bytes).unwrap() {
    ///     SnapshotRecord::Timer(timer) => assert_eq!(timer.deadline, 1_000),
    ///     other => panic!("unexpected {other:?}"),
    /// }
    /// ```
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        let header = MessageHeader::decode(buf)?;
        if header.schema_id != SCHEMA_ID {
            return Err(TermwireError::SchemaMismatch {
                expected: SCHEMA_ID,
                actual: header.schema_id,
            });
        }

        let body = &buf[MESSAGE_HEADER_LENGTH..];
        let record = match header.template_id {
            template_id::SNAPSHOT_MARKER => {
                SnapshotRecord::Marker(SnapshotMarker::decode(&BlockDecoder::wrap(body, header.block_length)?))
            }
            template_id::CLUSTER_SESSION => {
                SnapshotRecord::Session(ClusterSession::decode(&BlockDecoder::wrap(body, header.block_length)?)?)
            }
            template_id::TIMER => {
                SnapshotRecord::Timer(Timer::decode(&BlockDecoder::wrap(body, header.block_length)?))
            }
            template_id::CONSENSUS_MODULE => SnapshotRecord::ConsensusModule(ConsensusModule::decode(
                &BlockDecoder::wrap(body, header.block_length)?,
            )),
            template_id::PENDING_MESSAGE_TRACKER => SnapshotRecord::PendingMessageTracker(
                PendingMessageTracker::decode(&BlockDecoder::wrap(body, header.block_length)?),
            ),
            template_id::SESSION_MESSAGE_HEADER => {
                let d = BlockDecoder::wrap(body, header.block_length)?;
                SnapshotRecord::PendingMessage(PendingMessage {
                    header: SessionMessageHeader::decode(&d),
                    payload: d.remainder(),
                })
            }
            template_id::CLUSTER_MEMBERS => {
                SnapshotRecord::ClusterMembers(ClusterMembers::decode(&BlockDecoder::wrap(body, header.block_length)?)?)
            }
            template_id => SnapshotRecord::Unknown { template_id },
        };
        Ok(record)
    }

    /// Template id of the record.
    pub fn template_id(&self) -> u16 {
        match self {
            SnapshotRecord::Marker(_) => template_id::SNAPSHOT_MARKER,
            SnapshotRecord::Session(_) => template_id::CLUSTER_SESSION,
            SnapshotRecord::Timer(_) => template_id::TIMER,
            SnapshotRecord::ConsensusModule(_) => template_id::CONSENSUS_MODULE,
            SnapshotRecord::PendingMessageTracker(_) => template_id::PENDING_MESSAGE_TRACKER,
            SnapshotRecord::PendingMessage(_) => template_id::SESSION_MESSAGE_HEADER,
            SnapshotRecord::ClusterMembers(_) => template_id::CLUSTER_MEMBERS,
            SnapshotRecord::Unknown { template_id } => *template_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::codec::{NULL_I32, NULL_I64};
    use crate::schema::SCHEMA_VERSION;

    fn marker(mark: SnapshotMark) -> SnapshotMarker {
        SnapshotMarker {
            type_id: 1,
            log_position: 4096,
            leadership_term_id: 3,
            index: 0,
            mark,
            time_unit: ClusterTimeUnit::Nanos,
            app_version: 7,
        }
    }

    #[test]
    fn test_marker_layout() {
        let bytes = marker(SnapshotMark::End).encode();
        assert_eq!(bytes.len(), MESSAGE_HEADER_LENGTH + 40);
        // mark at block offset 28
        assert_eq!(&bytes[8 + 28..8 + 32], &2i32.to_le_bytes());

        assert_eq!(
            SnapshotRecord::decode(&bytes).unwrap(),
            SnapshotRecord::Marker(marker(SnapshotMark::End))
        );
    }

    #[test]
    fn test_session_with_channel() {
        let session = ClusterSession {
            cluster_session_id: 11,
            correlation_id: 12,
            opened_log_position: 1024,
            time_of_last_activity: 99,
            close_reason: CloseReason::NullValue,
            response_stream_id: 102,
            response_channel: "aeron:udp?endpoint=localhost:9020",
        };
        let bytes = session.encode();
        assert_eq!(
            bytes.len(),
            MESSAGE_HEADER_LENGTH + 40 + 4 + session.response_channel.len()
        );
        assert_eq!(SnapshotRecord::decode(&bytes).unwrap(), SnapshotRecord::Session(session));

        // Cutting the var-data short is a truncation, not a silent empty string.
        assert!(matches!(
            SnapshotRecord::decode(&bytes[..bytes.len() - 1]),
            Err(TermwireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_pending_message_payload_follows_block() {
        let message = PendingMessage {
            header: SessionMessageHeader {
                leadership_term_id: 1,
                cluster_session_id: -5,
                timestamp: 77,
            },
            payload: b"service payload",
        };
        let bytes = message.encode();
        let SnapshotRecord::PendingMessage(decoded) = SnapshotRecord::decode(&bytes).unwrap() else {
            panic!("expected pending message");
        };
        assert_eq!(decoded, message);
        assert_eq!(decoded.header.cluster_session_id, -5);
    }

    #[test]
    fn test_older_writer_block_reads_null() {
        // A writer whose consensus module block stopped after two fields.
        let mut buf = BytesMut::new();
        MessageHeader::new(template_id::CONSENSUS_MODULE, 16).encode_into(&mut buf);
        buf.put_i64_le(5);
        buf.put_i64_le(6);

        let SnapshotRecord::ConsensusModule(state) = SnapshotRecord::decode(&buf).unwrap() else {
            panic!("expected consensus module");
        };
        assert_eq!(state.next_session_id, 5);
        assert_eq!(state.next_service_session_id, 6);
        assert_eq!(state.log_service_session_id, NULL_I64);
        assert_eq!(state.pending_message_capacity, NULL_I32);
    }

    #[test]
    fn test_newer_writer_block_is_skipped() {
        // A newer timer block with an extra trailing field.
        let mut buf = BytesMut::new();
        MessageHeader::new(template_id::TIMER, 24).encode_into(&mut buf);
        buf.put_i64_le(1);
        buf.put_i64_le(2);
        buf.put_i64_le(3);

        assert_eq!(
            SnapshotRecord::decode(&buf).unwrap(),
            SnapshotRecord::Timer(Timer {
                correlation_id: 1,
                deadline: 2
            })
        );
    }

    #[test]
    fn test_schema_mismatch() {
        let mut buf = BytesMut::new();
        MessageHeader {
            block_length: 16,
            template_id: template_id::TIMER,
            schema_id: 42,
            version: SCHEMA_VERSION,
        }
        .encode_into(&mut buf);
        buf.put_bytes(0, 16);

        let err = SnapshotRecord::decode(&buf).unwrap_err();
        assert_eq!(err.to_string(), "expected schemaId=111, actual=42");
    }

    #[test]
    fn test_unknown_template() {
        let mut buf = BytesMut::new();
        MessageHeader::new(999, 4).encode_into(&mut buf);
        buf.put_u32_le(0);

        let record = SnapshotRecord::decode(&buf).unwrap();
        assert_eq!(record, SnapshotRecord::Unknown { template_id: 999 });
        assert_eq!(record.template_id(), 999);
    }

    #[test]
    fn test_cluster_members() {
        let members = ClusterMembers::new(0, 2, "0,a:1,b:2,c");
        let bytes = members.encode();
        let decoded = SnapshotRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, SnapshotRecord::ClusterMembers(members));
        match decoded {
            SnapshotRecord::ClusterMembers(m) => assert_eq!(m.members_str().unwrap(), "0,a:1,b:2,c"),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_cluster_members_with_invalid_utf8_still_decode() {
        let members = ClusterMembers {
            member_id: 1,
            high_member_id: 1,
            members: &[0xff, 0xfe, b'a'],
        };
        let bytes = members.encode();
        match SnapshotRecord::decode(&bytes).unwrap() {
            SnapshotRecord::ClusterMembers(m) => {
                assert_eq!(m.members, &[0xff, 0xfe, b'a'][..]);
                assert!(matches!(m.members_str(), Err(TermwireError::ProtocolViolation(_))));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
