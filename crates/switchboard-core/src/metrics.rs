//! Router metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding binary installs a recorder.

use metrics::counter;

/// Metric names.
pub mod names {
    /// Frames processed, labelled by `outcome`.
    pub const MESSAGES_TOTAL: &str = "switchboard_messages_total";
    /// Replies written.
    pub const REPLIES_TOTAL: &str = "switchboard_replies_total";
    /// Bytes written as replies.
    pub const REPLY_BYTES_TOTAL: &str = "switchboard_reply_bytes_total";
    /// Handlers that returned an error or panicked.
    pub const HANDLER_ERRORS_TOTAL: &str = "switchboard_handler_errors_total";
    /// Connections accepted.
    pub const CONNECTIONS_TOTAL: &str = "switchboard_connections_total";
}

/// A reply was produced.
pub const OUTCOME_REPLIED: &str = "replied";
/// Nothing to send: no handler matched or it produced no value.
pub const OUTCOME_NO_REPLY: &str = "no_reply";
/// The frame was not a valid message.
pub const OUTCOME_MALFORMED: &str = "malformed";
/// The handler or the router failed.
pub const OUTCOME_FAILED: &str = "failed";

pub(crate) fn record_outcome(outcome: &'static str) {
    counter!(names::MESSAGES_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_reply(bytes: usize) {
    counter!(names::REPLIES_TOTAL).increment(1);
    counter!(names::REPLY_BYTES_TOTAL).increment(bytes as u64);
}

pub(crate) fn record_handler_error() {
    counter!(names::HANDLER_ERRORS_TOTAL).increment(1);
}

pub(crate) fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
}
