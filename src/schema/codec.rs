//! Little-endian field access for record blocks.
//!
//! A [`BlockDecoder`] wraps one record body for the duration of a decode.
//! Fields past the acting block length read as their null value, so a reader
//! accepts records from writers with fewer fields.

use crate::error::{Result, TermwireError};

/// Null value of an `i64` field.
pub const NULL_I64: i64 = i64::MIN;
/// Null value of an `i32` field.
pub const NULL_I32: i32 = i32::MIN;

/// Length prefix of a var-data field.
pub(crate) const VAR_DATA_LENGTH_PREFIX: usize = 4;

pub(crate) fn require(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(TermwireError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

#[inline]
pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockDecoder<'a> {
    body: &'a [u8],
    block_length: usize,
}

impl<'a> BlockDecoder<'a> {
    /// Wrap `body` (everything after the schema header).
    pub(crate) fn wrap(body: &'a [u8], block_length: u16) -> Result<Self> {
        let block_length = usize::from(block_length);
        require(body, block_length)?;
        Ok(Self { body, block_length })
    }

    pub(crate) fn i64_at(&self, offset: usize) -> i64 {
        if offset + 8 > self.block_length {
            return NULL_I64;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.body[offset..offset + 8]);
        i64::from_le_bytes(bytes)
    }

    pub(crate) fn i32_at(&self, offset: usize) -> i32 {
        if offset + 4 > self.block_length {
            return NULL_I32;
        }
        read_u32(self.body, offset) as i32
    }

    /// The first var-data field, starting at the block end.
    pub(crate) fn var_data(&self) -> Result<&'a [u8]> {
        let start = self.block_length;
        require(self.body, start + VAR_DATA_LENGTH_PREFIX)?;
        let length = read_u32(self.body, start) as usize;
        let data_start = start + VAR_DATA_LENGTH_PREFIX;
        require(self.body, data_start + length)?;
        Ok(&self.body[data_start..data_start + length])
    }

    /// The first var-data field as UTF-8.
    pub(crate) fn var_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.var_data()?)
            .map_err(|e| TermwireError::protocol(format!("invalid UTF-8 in var-data: {e}")))
    }

    /// Bytes following the fixed block.
    pub(crate) fn remainder(&self) -> &'a [u8] {
        &self.body[self.block_length..]
    }
}
