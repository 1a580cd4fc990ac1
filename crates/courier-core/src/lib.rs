//! # courier-core
//!
//! Shared vocabulary for the Courier relay.
//!
//! - Branded identifiers for connections, identities, and message IDs
//! - The JSON event-frame wire protocol (`[event, payload]`)
//! - The protocol error taxonomy and its wire error codes

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::ProtocolError;
pub use ids::{ConnectionId, Identity, MessageId};
pub use protocol::{ClientEvent, ErrorPayload, MessageDelivered, ReceiveMessage, SendMessage, ServerEvent};
