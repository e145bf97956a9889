//! Server configuration.

use std::time::Duration;

/// Runtime configuration for the gateway's HTTP layer.
///
/// The binary derives this from the layered settings; tests construct it
/// directly.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns, useful in tests).
    pub port: u16,
    /// Registry-wide connection cap.
    pub max_connections: usize,
    /// Heartbeat emission period.
    pub heartbeat_interval: Duration,
    /// A connection idle for more than `factor × interval` is reaped.
    pub heartbeat_timeout_factor: u32,
    /// Per-connection outbound frame buffer.
    pub channel_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_connections: 10_000,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout_factor: 2,
            channel_buffer: 64,
        }
    }
}

impl ServerConfig {
    /// Idle cutoff after which the heartbeat monitor reaps a connection.
    #[must_use]
    pub fn idle_cutoff(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_timeout_factor.max(1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
