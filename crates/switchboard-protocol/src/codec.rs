//! JSON codec for Switchboard frames.
//!
//! Inbound frames must be UTF-8 JSON objects with a string `type` field.
//! Outbound replies are the JSON serialization of whatever the handler
//! produced.

use serde_json::Value;
use thiserror::Error;

use crate::message::{InboundMessage, TYPE_FIELD};

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is not valid UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// JSON syntax or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame decoded to something other than a JSON object.
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Object has no string `type` field.
    #[error("Missing or non-string `type` field")]
    MissingType,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode an inbound frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, not UTF-8, not JSON,
/// not an object, or has no string `type` field.
pub fn decode(data: &[u8]) -> Result<InboundMessage, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let text = std::str::from_utf8(data)?;
    let value: Value = serde_json::from_str(text)?;

    let mut fields = match value {
        Value::Object(map) => map,
        other => return Err(ProtocolError::NotAnObject(kind_of(&other))),
    };

    let message_type = match fields.remove(TYPE_FIELD) {
        Some(Value::String(t)) => t,
        _ => return Err(ProtocolError::MissingType),
    };

    Ok(InboundMessage {
        message_type,
        fields,
    })
}

/// Encode a reply as a JSON text frame.
///
/// # Errors
///
/// Returns an error if the encoded reply exceeds [`MAX_FRAME_SIZE`].
pub fn encode_reply(reply: &Value) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(reply)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}
