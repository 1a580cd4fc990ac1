//! Per-connection relay protocol state machine.
//!
//! `Unregistered` → `Registered(identity)` → `Closed`. One handler lives in
//! each session's reader loop, so events from one connection are applied
//! strictly in arrival order.

use std::sync::Arc;

use courier_core::{
    ClientEvent, ConnectionId, Identity, MessageDelivered, ProtocolError, ReceiveMessage,
    SendMessage, ServerEvent,
};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    ACKNOWLEDGMENTS_TOTAL, DELIVERIES_TOTAL, MESSAGES_DROPPED_TOTAL, MESSAGES_RELAYED_TOTAL,
    REGISTRATIONS_TOTAL, REJECTED_FRAMES_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::ClientConnection;

/// Lifecycle of one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, no identity yet.
    Unregistered,
    /// Member of the identity's group.
    Registered(Identity),
    /// Torn down. Further events are ignored.
    Closed,
}

/// Applies client events for a single connection.
pub struct RelayHandler {
    connection: Arc<ClientConnection>,
    registry: Arc<ConnectionRegistry>,
    state: ConnectionState,
}

impl RelayHandler {
    /// Create a handler for a freshly attached connection.
    pub fn new(connection: Arc<ClientConnection>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connection,
            registry,
            state: ConnectionState::Unregistered,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Registered identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            ConnectionState::Registered(identity) => Some(identity),
            _ => None,
        }
    }

    /// ID of the connection this handler drives.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection.id
    }

    /// Decode and apply one text frame.
    ///
    /// Failures are reported to this connection as an `error` event; the
    /// connection stays open.
    pub fn handle_text(&mut self, text: &str) {
        if self.state == ConnectionState::Closed {
            debug!(conn_id = %self.connection.id, "ignoring frame on closed connection");
            return;
        }
        let result = ClientEvent::decode(text).and_then(|event| self.handle_event(event));
        if let Err(err) = result {
            self.reject(&err);
        }
    }

    /// Report a rejected frame to the client.
    pub fn reject(&self, err: &ProtocolError) {
        counter!(REJECTED_FRAMES_TOTAL, "code" => err.code()).increment(1);
        warn!(
            conn_id = %self.connection.id,
            code = err.code(),
            event = err.event().unwrap_or("-"),
            error = %err,
            "rejected client frame"
        );
        let _ = self.connection.send_event(&ServerEvent::from(err));
    }

    /// Apply a decoded event.
    pub fn handle_event(&mut self, event: ClientEvent) -> Result<(), ProtocolError> {
        match event {
            ClientEvent::Register(identity) => self.register(identity),
            ClientEvent::SendMessage(msg) => self.send_message(msg).map(|_| ()),
            ClientEvent::MessageDelivered(ack) => self.message_delivered(&ack),
        }
    }

    /// Bind this connection to `identity`.
    ///
    /// Re-registering under a different identity moves the connection to
    /// the new group; registering the same identity again changes nothing.
    pub fn register(&mut self, identity: Identity) -> Result<(), ProtocolError> {
        let previous = match &self.state {
            ConnectionState::Closed => return Err(ProtocolError::Closed),
            ConnectionState::Registered(current) => Some(current.clone()),
            ConnectionState::Unregistered => None,
        };

        self.registry.join(&identity, &self.connection);
        counter!(REGISTRATIONS_TOTAL).increment(1);
        info!(
            conn_id = %self.connection.id,
            identity = %identity,
            previous = previous.as_ref().map(Identity::as_str),
            "connection registered"
        );
        self.state = ConnectionState::Registered(identity);
        Ok(())
    }

    /// Fan a message out to every live connection registered as `msg.to`.
    ///
    /// Returns the number of connections the frame was queued to. An empty
    /// destination group is not an error.
    #[instrument(skip_all, fields(conn_id = %self.connection.id, to = %msg.to, message_id = %msg.message_id))]
    pub fn send_message(&mut self, msg: SendMessage) -> Result<usize, ProtocolError> {
        let from = match &self.state {
            ConnectionState::Registered(identity) => identity.clone(),
            ConnectionState::Unregistered => return Err(ProtocolError::NotRegistered),
            ConnectionState::Closed => return Err(ProtocolError::Closed),
        };

        let recipients = self.registry.resolve(&msg.to);
        if recipients.is_empty() {
            counter!(MESSAGES_DROPPED_TOTAL).increment(1);
            debug!("no connections registered for destination, dropping");
            return Ok(0);
        }

        let event = ServerEvent::ReceiveMessage(ReceiveMessage {
            message_id: msg.message_id,
            text: msg.text,
            from,
        });
        let frame = match event.encode() {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                warn!(error = %e, "failed to encode receive_message");
                return Ok(0);
            }
        };

        let mut delivered = 0;
        for recipient in &recipients {
            if recipient.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                warn!(
                    recipient = %recipient.id,
                    dropped_frames = recipient.drop_count(),
                    "outbound queue full or closed, frame dropped"
                );
            }
        }

        counter!(DELIVERIES_TOTAL).increment(delivered as u64);
        if delivered > 0 {
            counter!(MESSAGES_RELAYED_TOTAL).increment(1);
        }
        debug!(recipients = recipients.len(), delivered, "message relayed");
        Ok(delivered)
    }

    /// Record a delivery acknowledgment. Nothing is sent back.
    pub fn message_delivered(&self, ack: &MessageDelivered) -> Result<(), ProtocolError> {
        if self.state == ConnectionState::Closed {
            return Err(ProtocolError::Closed);
        }
        counter!(ACKNOWLEDGMENTS_TOTAL).increment(1);
        info!(
            conn_id = %self.connection.id,
            identity = self.identity().map(Identity::as_str),
            message_id = %ack.message_id,
            "message delivered"
        );
        Ok(())
    }

    /// Leave the registered group and close. Idempotent.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let left = self.registry.leave(&self.connection.id);
        info!(
            conn_id = %self.connection.id,
            identity = left.as_ref().map(Identity::as_str),
            "connection disconnected"
        );
        self.state = ConnectionState::Closed;
    }
}
