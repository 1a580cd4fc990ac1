//! Event-frame wire protocol.
//!
//! Every WebSocket text frame carries exactly one event encoded as a JSON
//! array: `[event_name, payload]`. The payload may be omitted, in which case
//! it decodes as `null`. Trailing array elements are ignored.
//!
//! ```text
//! -> ["register", "alice"]
//! -> ["send_message", {"to": "bob", "messageId": "m1", "text": "hi"}]
//! <- ["receive_message", {"messageId": "m1", "text": "hi", "from": "alice"}]
//! -> ["message_delivered", {"messageId": "m1"}]
//! <- ["error", {"code": "INVALID_PAYLOAD", "message": "...", "event": "send_message"}]
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{Identity, MessageId};

/// Client → server: bind the connection to an identity.
pub const REGISTER: &str = "register";
/// Client → server: forward a message to an identity's group.
pub const SEND_MESSAGE: &str = "send_message";
/// Server → client: a forwarded message.
pub const RECEIVE_MESSAGE: &str = "receive_message";
/// Client → server: delivery acknowledgment.
pub const MESSAGE_DELIVERED: &str = "message_delivered";
/// Server → client: rejection of a malformed or disallowed frame.
pub const ERROR: &str = "error";

/// `send_message` payload.
///
/// Any `from` field supplied by the client is ignored; attribution comes
/// from the sending connection's registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Destination identity.
    pub to: Identity,
    /// Caller-supplied correlation ID.
    pub message_id: MessageId,
    /// Message body. Opaque: any JSON value, relayed unchanged. Must be present.
    pub text: Value,
}

/// `receive_message` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessage {
    /// Correlation ID copied from the send.
    pub message_id: MessageId,
    /// Message body copied from the send.
    pub text: Value,
    /// Registered identity of the sending connection.
    pub from: Identity,
}

/// `message_delivered` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivered {
    /// ID of the message being acknowledged.
    pub message_id: MessageId,
}

/// `error` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable machine-readable code (`INVALID_PAYLOAD`, ...).
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Client event that was rejected, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// Events a client may send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// `register`
    Register(Identity),
    /// `send_message`
    SendMessage(SendMessage),
    /// `message_delivered`
    MessageDelivered(MessageDelivered),
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_frame(text)?;
        Self::from_parts(&name, payload)
    }

    /// Build an event from an already-split name and payload.
    pub fn from_parts(name: &str, payload: Value) -> Result<Self, ProtocolError> {
        match name {
            REGISTER => match payload {
                Value::String(s) => Ok(Self::Register(Identity::new(s))),
                other => Err(ProtocolError::InvalidPayload {
                    event: REGISTER,
                    reason: format!("expected identity string, got {}", json_kind(&other)),
                }),
            },
            SEND_MESSAGE => decode_payload(SEND_MESSAGE, payload).map(Self::SendMessage),
            MESSAGE_DELIVERED => decode_payload(MESSAGE_DELIVERED, payload).map(Self::MessageDelivered),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => REGISTER,
            Self::SendMessage(_) => SEND_MESSAGE,
            Self::MessageDelivered(_) => MESSAGE_DELIVERED,
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Register(identity) => serde_json::to_string(&(REGISTER, identity)),
            Self::SendMessage(p) => serde_json::to_string(&(SEND_MESSAGE, p)),
            Self::MessageDelivered(p) => serde_json::to_string(&(MESSAGE_DELIVERED, p)),
        }
    }
}

/// Events the server emits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// `receive_message`
    ReceiveMessage(ReceiveMessage),
    /// `error`
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => RECEIVE_MESSAGE,
            Self::Error(_) => ERROR,
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::ReceiveMessage(p) => serde_json::to_string(&(RECEIVE_MESSAGE, p)),
            Self::Error(p) => serde_json::to_string(&(ERROR, p)),
        }
    }

    /// Decode one text frame. Used by clients and tests.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_frame(text)?;
        match name.as_str() {
            RECEIVE_MESSAGE => decode_payload(RECEIVE_MESSAGE, payload).map(Self::ReceiveMessage),
            ERROR => decode_payload(ERROR, payload).map(Self::Error),
            _ => Err(ProtocolError::UnknownEvent(name)),
        }
    }
}

impl From<&ProtocolError> for ServerEvent {
    fn from(err: &ProtocolError) -> Self {
        Self::Error(err.to_payload())
    }
}

fn split_frame(text: &str) -> Result<(String, Value), ProtocolError> {
    let frame: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))?;
    let parts = match frame {
        Value::Array(parts) => parts,
        other => {
            return Err(ProtocolError::InvalidFrame(format!(
                "expected [event, payload] array, got {}",
                json_kind(&other)
            )))
        }
    };
    let mut parts = parts.into_iter();
    let name = match parts.next() {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(ProtocolError::InvalidFrame(format!(
                "event name must be a string, got {}",
                json_kind(&other)
            )))
        }
        None => return Err(ProtocolError::InvalidFrame("empty frame".into())),
    };
    Ok((name, parts.next().unwrap_or(Value::Null)))
}

fn decode_payload<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        event,
        reason: e.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
