//! NDJSON framing
//!
//! Each message is one JSON object terminated by `\n`. JSON string escaping
//! guarantees no unescaped newline can appear inside a frame, so a frame is
//! always exactly one line. The codec is message-oriented: one frame out,
//! one frame back, then the connection closes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GatewayError;

/// Encode a message as a single newline-terminated frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, GatewayError> {
    let mut buf = serde_json::to_vec(msg)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one frame. The trailing newline, if still present, is ignored.
///
/// Anything that is not a syntactically valid JSON object of the expected
/// shape is a protocol error.
pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, GatewayError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(GatewayError::Protocol("empty frame".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|e| GatewayError::Protocol(e.to_string()))
}
