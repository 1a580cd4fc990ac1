//! # courier-server
//!
//! Axum WebSocket gateway for the Courier relay.
//!
//! - Connection registry: identity → group of live connections
//! - Relay protocol handler: per-connection `register` / `send_message` /
//!   `message_delivered` / disconnect state machine
//! - WebSocket sessions with heartbeat liveness and bounded outbound queues
//! - `/health` endpoint and Prometheus `/metrics`
//! - Graceful shutdown that waits for every session's teardown

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use registry::ConnectionRegistry;
pub use server::CourierServer;
