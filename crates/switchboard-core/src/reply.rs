//! Reply writing.

use crate::metrics;
use crate::router::RouterError;
use serde_json::Value;
use switchboard_protocol::codec;
use switchboard_transport::Connection;
use tracing::trace;

/// Encode `reply` as JSON text and write it to `connection` as one text frame.
///
/// # Errors
///
/// Returns [`RouterError::Encode`] if the value cannot be serialized, or
/// [`RouterError::Transport`] if the write fails.
pub async fn send_reply<C: Connection + ?Sized>(
    connection: &mut C,
    reply: &Value,
) -> Result<(), RouterError> {
    let text = codec::encode_reply(reply).map_err(RouterError::Encode)?;
    let len = text.len();

    connection.send(text).await?;

    trace!(connection = %connection.id(), bytes = len, "Sent reply");
    metrics::record_reply(len);
    Ok(())
}
