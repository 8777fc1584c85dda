//! Result record carried by `Res` envelopes.
//!
//! ```text
//! [i32 LE: len][i32 LE: source_id][i32 LE: status][len - 12 result bytes]
//! ```
//!
//! `len` counts the whole record including the prefix, so a void result is
//! exactly 12 bytes.

use super::control::ReplyTag;
use crate::error::{BridgeError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Length of the fixed record prefix.
pub const RECORD_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub tag: ReplyTag,
    pub payload: Bytes,
}

impl ResultRecord {
    pub fn new(tag: ReplyTag, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn void(tag: ReplyTag) -> Self {
        Self {
            tag,
            payload: Bytes::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn encoded_len(&self) -> usize {
        RECORD_PREFIX_LEN + self.payload.len()
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let len = self.encoded_len();
        let len_i32 = i32::try_from(len).map_err(|_| BridgeError::PayloadTooLarge { len })?;
        let mut out = BytesMut::with_capacity(len);
        out.put_i32_le(len_i32);
        out.put_i32_le(self.tag.source_id);
        out.put_i32_le(self.tag.status);
        out.put_slice(&self.payload);
        Ok(out.freeze())
    }

    /// Parse a record; trailing bytes past the declared length are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let len = declared_len(bytes)?;
        if len < RECORD_PREFIX_LEN || len > bytes.len() {
            return Err(BridgeError::malformed(
                "Res",
                format!(
                    "declared length {} does not fit a {}-byte record",
                    len,
                    bytes.len()
                ),
            ));
        }
        let tag = ReplyTag::new(read_i32(bytes, 4), read_i32(bytes, 8));
        Ok(Self {
            tag,
            payload: Bytes::copy_from_slice(&bytes[RECORD_PREFIX_LEN..len]),
        })
    }

    /// Source id stored at bytes 4..8, without validating the rest.
    pub fn peek_source_id(bytes: &[u8]) -> Option<i32> {
        if bytes.len() < 8 {
            return None;
        }
        Some(read_i32(bytes, 4))
    }
}

/// Length prefix of a record, validated to be non-negative.
pub fn declared_len(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < 4 {
        return Err(BridgeError::malformed(
            "Res",
            format!("record of {} bytes has no length prefix", bytes.len()),
        ));
    }
    let raw = read_i32(bytes, 0);
    usize::try_from(raw)
        .map_err(|_| BridgeError::malformed("Res", format!("negative record length {}", raw)))
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(word)
}
