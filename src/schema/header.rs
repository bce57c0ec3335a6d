//! Schema message header.
//!
//! ```text
//! ┌──────────────┬─────────────┬───────────┬─────────┐
//! │ Block Length │ Template ID │ Schema ID │ Version │
//! │ u16 LE       │ u16 LE      │ u16 LE    │ u16 LE  │
//! └──────────────┴─────────────┴───────────┴─────────┘
//! ```

use bytes::{BufMut, BytesMut};

use super::codec::{read_u16, require};
use super::{SCHEMA_ID, SCHEMA_VERSION};
use crate::error::Result;

/// Schema header size in bytes.
pub const MESSAGE_HEADER_LENGTH: usize = 8;

/// Prefix of every record identifying its decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Length of the fixed block that follows, as written.
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    /// Header for a record of this crate's schema.
    pub fn new(template_id: u16, block_length: u16) -> Self {
        Self {
            block_length,
            template_id,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.block_length);
        buf.put_u16_le(self.template_id);
        buf.put_u16_le(self.schema_id);
        buf.put_u16_le(self.version);
    }

    /// Decode the header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        require(buf, MESSAGE_HEADER_LENGTH)?;
        Ok(Self {
            block_length: read_u16(buf, 0),
            template_id: read_u16(buf, 2),
            schema_id: read_u16(buf, 4),
            version: read_u16(buf, 6),
        })
    }
}
