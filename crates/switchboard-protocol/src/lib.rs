//! # switchboard-protocol
//!
//! Wire message definitions for the Switchboard channel router.
//!
//! Clients send UTF-8 text frames holding a JSON object with a `type` field;
//! the server answers with the JSON encoding of the handler's result.
//!
//! ## Example
//!
//! ```rust
//! use switchboard_protocol::codec;
//!
//! let msg = codec::decode(br#"{"type":"move","dx":1}"#).unwrap();
//! assert_eq!(msg.message_type(), "move");
//!
//! let reply = codec::encode_reply(&serde_json::json!({"ok": true})).unwrap();
//! assert_eq!(reply, r#"{"ok":true}"#);
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode_reply, ProtocolError, MAX_FRAME_SIZE};
pub use message::InboundMessage;
