//! Fan-out dispatch.
//!
//! Receives parsed outcomes from the ingester and pushes them to every
//! live subscriber of the event's channel. The payload is serialized (and
//! optionally sealed) once per event; per-subscriber work is one rendered
//! frame clone and one channel send.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use spinfeed_core::{OutcomeEvent, OutcomePayload};
use spinfeed_ingest::{EventSink, SinkError};

use crate::connection::{ConnectionState, TransportKind};
use crate::errors::ServerError;
use crate::frame::Frame;
use crate::registry::ConnectionRegistry;
use crate::seal::PayloadSealer;

/// Pushes outcomes to channel subscribers.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    sealer: Arc<dyn PayloadSealer>,
}

impl Dispatcher {
    /// Build over a registry and a sealer.
    pub fn new(registry: Arc<ConnectionRegistry>, sealer: Arc<dyn PayloadSealer>) -> Self {
        Self { registry, sealer }
    }

    /// Deliver one event to its channel's subscribers. Returns how many
    /// connections the frame was queued to. A failed write unregisters
    /// that connection and never aborts delivery to the rest.
    pub fn dispatch(&self, event: &OutcomeEvent) -> Result<usize, ServerError> {
        let subscribers = self.registry.channel_subscribers(&event.channel_id);
        if subscribers.is_empty() {
            return Ok(0);
        }

        let json = serde_json::to_string(&OutcomePayload::from(event))?;
        let data = self.sealer.seal(&json)?;
        let frame = Frame::Update {
            sequence_key: event.sequence_key,
            data,
        };

        // Rendered once per transport kind actually present.
        let mut sse_text: Option<Arc<String>> = None;
        let mut ws_text: Option<Arc<String>> = None;

        let mut delivered = 0;
        for conn in subscribers {
            if !conn.policy().live_access {
                continue;
            }
            let text = match conn.transport() {
                TransportKind::Sse => sse_text
                    .get_or_insert_with(|| Arc::new(frame.to_sse()))
                    .clone(),
                TransportKind::WebSocket => ws_text
                    .get_or_insert_with(|| Arc::new(frame.to_ws_text()))
                    .clone(),
            };
            if conn.try_send(text) {
                delivered += 1;
            } else {
                warn!(
                    connection = %conn.id(),
                    channel = %event.channel_id,
                    dropped = conn.dropped_frames(),
                    "write failed, dropping connection"
                );
                conn.close(ConnectionState::ClosedByPeer);
                self.registry.unregister(conn.id());
            }
        }

        debug!(
            channel = %event.channel_id,
            sequence = event.sequence_key,
            delivered,
            "dispatched outcome"
        );
        Ok(delivered)
    }
}

#[async_trait]
impl EventSink for Dispatcher {
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), SinkError> {
        let _ = self
            .dispatch(event)
            .map_err(|e| SinkError(e.to_string()))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
