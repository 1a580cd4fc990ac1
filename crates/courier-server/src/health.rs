//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Attached WebSocket connections, registered or not.
    pub connections: usize,
    /// Identities with at least one live connection.
    pub identities: usize,
}

/// Build a health response from registry counts.
pub fn health_check(start_time: Instant, connections: usize, identities: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        identities,
    }
}
