//! Per-connection state.
//!
//! A [`ClientConnection`] is shared as an `Arc` between the registry, the
//! dispatcher, the heartbeat monitor, and its own transport task. Writes
//! go through a bounded mpsc channel; a full channel is a failed write,
//! never a blocked fan-out.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use spinfeed_core::{ChannelId, ConnectionId, EntitlementPolicy, Identity};

use crate::frame::Frame;

/// Lifecycle of a connection. Every terminal state converges on
/// `unregister`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted, transport not yet streaming.
    Admitted,
    /// Frames flowing.
    Streaming,
    /// Reaped by the heartbeat monitor.
    TimedOut,
    /// The peer closed or stopped reading.
    ClosedByPeer,
    /// Closed by the server (shutdown, refused write path).
    ClosedByPolicy,
}

impl ConnectionState {
    /// True for states a connection never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::ClosedByPeer | Self::ClosedByPolicy
        )
    }
}

/// Which transport the connection speaks. Decides how frames render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Text stream (`GET /stream`).
    Sse,
    /// Duplex (`GET /ws`).
    WebSocket,
}

/// One admitted client connection.
pub struct ClientConnection {
    id: ConnectionId,
    identity: Option<Identity>,
    policy: EntitlementPolicy,
    transport: TransportKind,
    tx: mpsc::Sender<Arc<String>>,
    subscriptions: RwLock<HashSet<ChannelId>>,
    last_activity: Mutex<Instant>,
    state: Mutex<ConnectionState>,
    dropped_frames: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Wrap an admission and its outbound channel.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        identity: Option<Identity>,
        policy: EntitlementPolicy,
        transport: TransportKind,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        Self {
            id,
            identity,
            policy,
            transport,
            tx,
            subscriptions: RwLock::new(HashSet::new()),
            last_activity: Mutex::new(Instant::now()),
            state: Mutex::new(ConnectionState::Admitted),
            dropped_frames: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Verified identity, absent for degraded-mode anonymous admissions.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Immutable policy attached at admission.
    #[must_use]
    pub fn policy(&self) -> &EntitlementPolicy {
        &self.policy
    }

    /// Transport kind.
    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Queue a pre-rendered frame. Returns `false` if the outbound
    /// buffer is full or the transport is gone; the caller unregisters.
    pub fn try_send(&self, text: Arc<String>) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Render a frame for this connection's transport and queue it.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        let text = match self.transport {
            TransportKind::Sse => frame.to_sse(),
            TransportKind::WebSocket => frame.to_ws_text(),
        };
        self.try_send(Arc::new(text))
    }

    /// Frames dropped on a full or closed channel.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Refresh the activity clock. Called on transport-level activity
    /// (ping/pong, successful stream write), not application messages.
    pub fn mark_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// How long since the last transport-level activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `Streaming` once the transport loop starts.
    pub fn mark_streaming(&self) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = ConnectionState::Streaming;
        }
    }

    /// Move to a terminal state and cancel the transport task. Terminal
    /// states never change again, so close races resolve first-wins.
    pub fn close(&self, terminal: ConnectionState) {
        {
            let mut state = self.state.lock();
            if !state.is_terminal() {
                *state = terminal;
            }
        }
        self.closed.cancel();
    }

    /// Token the transport task watches to shut down.
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Number of channels currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Whether a channel is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, channel: &ChannelId) -> bool {
        self.subscriptions.read().contains(channel)
    }

    /// Snapshot of subscribed channels.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelId> {
        self.subscriptions.read().iter().cloned().collect()
    }

    pub(crate) fn add_subscription(&self, channel: ChannelId) -> bool {
        self.subscriptions.write().insert(channel)
    }

    pub(crate) fn remove_subscription(&self, channel: &ChannelId) -> bool {
        self.subscriptions.write().remove(channel)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
