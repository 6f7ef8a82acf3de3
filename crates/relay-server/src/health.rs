//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server accepts connections.
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connections with a running session.
    pub sessions: usize,
    /// Registered workflow names, sorted.
    pub workflows: Vec<String>,
}

pub fn health_check(
    start_time: Instant,
    connections: usize,
    sessions: usize,
    workflows: Vec<String>,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        workflows,
    }
}
