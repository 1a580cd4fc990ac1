//! Protocol error taxonomy.

use crate::protocol::ErrorPayload;

/// Errors raised while decoding or handling a client event.
///
/// Every variant maps to a stable wire code sent back in an `error` event.
/// Unroutable destinations are deliberately absent: dropping a message for
/// an empty group is not an error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON `[event, payload]` array.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The event name is not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The payload does not match the event's shape.
    #[error("invalid {event} payload: {reason}")]
    InvalidPayload {
        /// Event whose payload failed to decode.
        event: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// A `send_message` arrived before any `register`.
    #[error("connection must register before sending")]
    NotRegistered,

    /// The connection has already been torn down.
    #[error("connection is closed")]
    Closed,
}

impl ProtocolError {
    /// Wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "INVALID_FRAME",
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::InvalidPayload { .. } => "INVALID_PAYLOAD",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::Closed => "CLOSED",
        }
    }

    /// Name of the client event that triggered the error, when known.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::InvalidPayload { event, .. } => Some(*event),
            Self::UnknownEvent(name) => Some(name.as_str()),
            Self::NotRegistered => Some(crate::protocol::SEND_MESSAGE),
            Self::InvalidFrame(_) | Self::Closed => None,
        }
    }

    /// Build the payload of the `error` event reported to the client.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            event: self.event().map(str::to_string),
        }
    }
}
