//! WebSocket connection state, relay protocol handling, heartbeat, and session loop.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
