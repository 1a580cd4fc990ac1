//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_core::{ConnectionId, ServerEvent};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::error;

use crate::metrics::FRAMES_DROPPED_TOTAL;

/// A live transport session.
///
/// The socket itself is owned by the session task; this struct is the shared
/// handle other connections use to push frames at it.
pub struct ClientConnection {
    /// Transport-assigned connection ID.
    pub id: ConnectionId,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection around its outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue an encoded frame for the client.
    ///
    /// Never waits. Returns `false` if the queue is full or the write task
    /// is gone, and counts the drop.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            counter!(FRAMES_DROPPED_TOTAL).increment(1);
            false
        }
    }

    /// Encode an event and queue it.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match event.encode() {
            Ok(frame) => self.send(Arc::new(frame)),
            Err(e) => {
                error!(conn_id = %self.id, event = event.name(), error = %e, "failed to encode event");
                false
            }
        }
    }

    /// Whether the write side has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("dropped_frames", &self.drop_count())
            .finish_non_exhaustive()
    }
}
