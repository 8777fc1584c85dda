//! UTF-8 and JSON decoding helpers for payloads read out of shared buffers.

use crate::error::{BridgeError, Result};
use serde::de::DeserializeOwned;
use std::borrow::Cow;

/// Decode UTF-8, replacing invalid sequences with U+FFFD.
pub fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Decode a UTF-8 JSON document into `T`.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let text = decode_utf8(bytes);
    serde_json::from_str(&text).map_err(|e| BridgeError::Json {
        message: format!("Failed to parse JSON payload: {}", e),
        source: Some(e),
    })
}
