//! Inbound message type for Switchboard.
//!
//! Every inbound frame is a JSON object carrying a string `type` field that
//! names the message kind. All other fields are kept as-is and handed to the
//! matched handler untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field that carries the message kind.
pub const TYPE_FIELD: &str = "type";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message kind, used together with the channel to pick a handler.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Remaining fields of the object, in their original form.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InboundMessage {
    /// Create a message with no extra fields.
    #[must_use]
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Map::new(),
        }
    }

    /// Add a field to the message.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get the message kind.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Get a payload field by name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Rebuild the full JSON object, `type` included.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut object = self.fields;
        object.insert(TYPE_FIELD.to_string(), Value::String(self.message_type));
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_fields() {
        let msg = InboundMessage::new("move").with_field("dx", 1);
        assert_eq!(msg.message_type(), "move");
        assert_eq!(msg.get("dx"), Some(&json!(1)));
        assert!(msg.get("dy").is_none());
    }

    #[test]
    fn test_into_value_restores_type() {
        let msg = InboundMessage::new("join").with_field("name", "alice");
        assert_eq!(msg.into_value(), json!({"type": "join", "name": "alice"}));
    }

    #[test]
    fn test_serde_flattens_fields() {
        let msg: InboundMessage =
            serde_json::from_value(json!({"type": "chat", "text": "hi", "n": [1, 2]})).unwrap();
        assert_eq!(msg.message_type, "chat");
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.get("n"), Some(&json!([1, 2])));
    }
}
