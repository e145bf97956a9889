//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the process is serving.
    pub status: String,
    /// Whether the backing store answered a probe.
    pub store_connected: bool,
    /// Live connection count.
    pub connections: usize,
    /// Seconds since startup.
    pub uptime_secs: u64,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(
    start_time: Instant,
    store_connected: bool,
    connections: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        store_connected,
        connections,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
