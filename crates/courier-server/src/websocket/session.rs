//! WebSocket session lifecycle: one connected client from upgrade through
//! teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use courier_core::{ConnectionId, ProtocolError};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::RelayHandler;
use super::heartbeat::{run_heartbeat, HeartbeatResult};
use crate::config::ServerConfig;
use crate::metrics::{
    CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, CONNECTION_DURATION_SECONDS, DISCONNECTIONS_TOTAL,
    HEARTBEAT_TIMEOUTS_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// How long teardown waits for the writer to flush before aborting it.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a session for an upgraded socket.
///
/// 1. Attaches a [`ClientConnection`] with a bounded outbound queue
/// 2. Spawns the writer (queue → socket, periodic pings) and the heartbeat monitor
/// 3. Feeds inbound text frames to a [`RelayHandler`] in arrival order
/// 4. Tears down on close, transport error, heartbeat timeout or server shutdown
#[instrument(skip_all, fields(conn_id))]
pub async fn run_session(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) {
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), send_tx));
    let _ = tracing::Span::current().record("conn_id", connection.id.as_str());

    registry.attach(Arc::clone(&connection));
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
    info!(connections = registry.connection_count(), "client connected");

    let token = shutdown.child_token();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_token = token.clone();
    let ping_every = config.heartbeat_interval();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_token.cancel();
    });

    let heartbeat = tokio::spawn({
        let connection = Arc::clone(&connection);
        let token = token.clone();
        let interval = config.heartbeat_interval();
        let timeout = config.heartbeat_timeout();
        async move {
            let result = run_heartbeat(Arc::clone(&connection), interval, timeout, token.clone()).await;
            if result == HeartbeatResult::TimedOut {
                counter!(HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                warn!(
                    conn_id = %connection.id,
                    silent_for = ?connection.last_seen_elapsed(),
                    "heartbeat timed out, closing connection"
                );
                token.cancel();
            }
        }
    });

    let mut handler = RelayHandler::new(Arc::clone(&connection), Arc::clone(&registry));

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                connection.mark_alive();
                match msg {
                    Message::Text(text) => handler.handle_text(text.as_str()),
                    Message::Binary(data) => handler.reject(&ProtocolError::InvalidFrame(format!(
                        "binary frames are not supported ({} bytes)",
                        data.len()
                    ))),
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            () = token.cancelled() => {
                debug!("session cancelled");
                break;
            }
        }
    }

    handler.disconnect();
    let _ = registry.detach(&connection.id);
    counter!(DISCONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    token.cancel();

    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }
    heartbeat.abort();

    info!(
        duration = ?connection.age(),
        dropped_frames = connection.drop_count(),
        connections = registry.connection_count(),
        "session closed"
    );
}
