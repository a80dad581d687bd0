//! Record framing for the JSON hub protocol
//!
//! Every hub record is a JSON text terminated by the ASCII record separator
//! (`0x1E`). A single WebSocket text message may carry several records, and
//! the handshake response may arrive in the same message as the first push
//! events, so decoding always works on a whole frame and returns every
//! record it contains.
//!
//! # Examples
//!
//! ```rust
//! use tablehub_core::codec;
//! use tablehub_core::protocol::{HubMessage, Invocation};
//!
//! let frame = codec::encode(&HubMessage::Invocation(Invocation::send("JoinArea", vec![3.into()]))).unwrap();
//! assert!(frame.ends_with(codec::RECORD_SEPARATOR));
//!
//! let decoded = codec::decode_records(&frame).unwrap();
//! assert_eq!(decoded.len(), 1);
//! ```

use crate::error::{Error, Result};
use crate::protocol::{HandshakeRequest, HandshakeResponse, HubMessage};

/// Terminator of every hub record
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Encode a hub message as one framed record
pub fn encode(message: &HubMessage) -> Result<String> {
    let value = message.to_value()?;
    let mut text = serde_json::to_string(&value)?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Encode the client handshake record
pub fn encode_handshake(request: &HandshakeRequest) -> Result<String> {
    let mut text = serde_json::to_string(request)?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Split a frame into its records, ignoring the empty tail after the last
/// separator
fn records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

/// Decode every record in a frame
///
/// # Errors
///
/// Returns `Error::Protocol` if a record is not valid JSON or carries an
/// unknown discriminator, and `Error::Serialization` if a known record has
/// the wrong shape. One bad record fails the whole frame.
pub fn decode_records(frame: &str) -> Result<Vec<HubMessage>> {
    records(frame)
        .map(|record| {
            let value: serde_json::Value = serde_json::from_str(record)
                .map_err(|e| Error::Protocol(format!("invalid record: {}", e)))?;
            HubMessage::from_value(value)
        })
        .collect()
}

/// Decode the handshake response at the start of a frame
///
/// Returns the response together with whatever follows its separator, which
/// the caller decodes with [`decode_records`].
///
/// # Errors
///
/// `Error::Handshake` when the frame does not start with a complete
/// handshake record or the record cannot be parsed.
pub fn decode_handshake_response(frame: &str) -> Result<(HandshakeResponse, &str)> {
    let (head, rest) = frame
        .split_once(RECORD_SEPARATOR)
        .ok_or_else(|| Error::Handshake("incomplete handshake response".to_string()))?;

    let response: HandshakeResponse = serde_json::from_str(head.trim())
        .map_err(|e| Error::Handshake(format!("invalid handshake response: {}", e)))?;

    Ok((response, rest))
}
