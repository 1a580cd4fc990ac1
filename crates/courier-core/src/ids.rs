//! Identifier types.
//!
//! `ConnectionId` is server-assigned and prefixed. `Identity` and
//! `MessageId` are client-supplied and carried verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing identifier string.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Transport-assigned identifier of a live connection.
    ConnectionId,
    "conn"
);

/// Logical address a client registers under.
///
/// Opaque: no format or non-emptiness checks are applied.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a client-supplied identity string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Caller-supplied message identifier.
///
/// Opaque: any JSON value is accepted and echoed back unchanged. Only used
/// to correlate a `receive_message` with its acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Value);

impl MessageId {
    /// Wrap a raw JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the raw JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_owned()))
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self(Value::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_has_prefix() {
        let id = ConnectionId::new();
        assert!(id.as_str().starts_with("conn_"), "got: {id}");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn connection_ids_are_time_ordered() {
        let ids: Vec<ConnectionId> = (0..50).map(|_| ConnectionId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str(), "not monotonic: {} >= {}", w[0], w[1]);
        }
    }

    #[test]
    fn connection_id_from_raw_preserves_value() {
        let id = ConnectionId::from_raw("conn-fixed");
        assert_eq!(id.as_str(), "conn-fixed");
        let parsed: ConnectionId = "conn-fixed".parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn identity_is_verbatim() {
        assert_eq!(Identity::from("alice").as_str(), "alice");
        assert_eq!(Identity::from("").as_str(), "");
        assert_eq!(Identity::new("  spaced ").to_string(), "  spaced ");
    }

    #[test]
    fn identity_serializes_as_plain_string() {
        let json = serde_json::to_string(&Identity::from("bob")).unwrap();
        assert_eq!(json, "\"bob\"");
    }

    #[test]
    fn message_id_keeps_json_type() {
        let text: MessageId = serde_json::from_str("\"m1\"").unwrap();
        assert_eq!(text, MessageId::from("m1"));
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"m1\"");

        let num: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(num, MessageId::from(42u64));
        assert_eq!(serde_json::to_string(&num).unwrap(), "42");
        assert_eq!(num.to_string(), "42");
    }

    #[test]
    fn message_id_is_opaque() {
        for raw in ["null", "{\"device\":\"phone\",\"seq\":3}", "[1,2]", "true", "1.5"] {
            let id: MessageId = serde_json::from_str(raw).unwrap();
            assert_eq!(serde_json::to_string(&id).unwrap(), raw);
        }
        let id = MessageId::new(serde_json::json!({"seq": 3}));
        assert_eq!(id.as_value()["seq"], 3);
        assert_eq!(id.to_string(), "{\"seq\":3}");
    }
}
