//! Heartbeat Monitor.
//!
//! One central task for all connections: every period it emits a
//! heartbeat frame to each live connection and reaps any connection
//! whose activity clock has fallen behind the idle cutoff. Reaping races
//! with transport-side closes; both paths converge on `unregister`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::ConnectionState;
use crate::frame::Frame;
use crate::registry::ConnectionRegistry;

/// Why the heartbeat loop exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Shutdown token cancelled.
    Cancelled,
}

/// One emission-and-reap pass. Returns how many connections were reaped.
pub fn heartbeat_tick(registry: &ConnectionRegistry, idle_cutoff: Duration) -> usize {
    let frame = Frame::heartbeat();
    let mut reaped = 0;
    for conn in registry.all_connections() {
        if conn.idle_for() > idle_cutoff {
            info!(
                connection = %conn.id(),
                idle_ms = conn.idle_for().as_millis() as u64,
                "reaping idle connection"
            );
            conn.close(ConnectionState::TimedOut);
            registry.unregister(conn.id());
            reaped += 1;
            continue;
        }
        if !conn.send_frame(&frame) {
            // Full buffer on a heartbeat means the peer stopped reading.
            conn.close(ConnectionState::ClosedByPeer);
            registry.unregister(conn.id());
            reaped += 1;
        }
    }
    reaped
}

/// Run the monitor until cancelled.
pub async fn run_heartbeat(
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    timeout_factor: u32,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let idle_cutoff = period * timeout_factor.max(1);
    let mut ticker = tokio::time::interval(period);
    // First tick fires immediately; skip it so fresh connections are not
    // pinged before they start streaming.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("heartbeat monitor cancelled");
                return HeartbeatResult::Cancelled;
            }
            _ = ticker.tick() => {
                let reaped = heartbeat_tick(&registry, idle_cutoff);
                if reaped > 0 {
                    debug!(reaped, "heartbeat pass reaped connections");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
