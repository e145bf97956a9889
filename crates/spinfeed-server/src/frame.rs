//! Wire framing.
//!
//! One [`Frame`] value renders to both transports: the text-stream form
//! (`event:`/`id:`/`data:` lines) and the duplex form (one JSON text
//! message). Update frames carry an already-serialized payload so the
//! dispatcher serializes once per event, not once per subscriber.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use spinfeed_core::Tier;

/// An outbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Admission acknowledgement, sent once per connection.
    Connected {
        /// The minted connection id.
        connection_id: String,
        /// Resolved tier, so clients can self-report their shaping.
        tier: Tier,
    },
    /// An outcome delivery. `data` is the serialized (and possibly
    /// sealed) payload.
    Update {
        /// Per-channel sequence key, for client-side dedup.
        sequence_key: i64,
        /// Serialized payload text.
        data: String,
    },
    /// Liveness signal emitted on a fixed period.
    Heartbeat {
        /// Emission instant.
        timestamp: DateTime<Utc>,
    },
    /// A per-connection error (bad command, refused subscribe).
    Error {
        /// Machine-readable reason code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

impl Frame {
    /// Heartbeat frame stamped now.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    /// Error frame from a code and message.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The `event:` field value.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Update { .. } => "update",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Error { .. } => "error",
        }
    }

    /// Render for the text-stream transport. Updates carry an `id:` line
    /// with the sequence key; the other frame types have no position.
    #[must_use]
    pub fn to_sse(&self) -> String {
        match self {
            Self::Update { sequence_key, data } => {
                format!(
                    "event: update\nid: {sequence_key}\ndata: {data}\n\n"
                )
            }
            other => {
                format!(
                    "event: {}\ndata: {}\n\n",
                    other.event_type(),
                    other.control_json()
                )
            }
        }
    }

    /// Render for the duplex transport: one JSON text message. Updates
    /// are sent as the bare payload text; control frames carry their own
    /// `event` field.
    #[must_use]
    pub fn to_ws_text(&self) -> String {
        match self {
            Self::Update { data, .. } => data.clone(),
            other => other.control_json(),
        }
    }

    fn control_json(&self) -> String {
        let value = match self {
            Self::Connected {
                connection_id,
                tier,
            } => json!({
                "event": "connected",
                "connection_id": connection_id,
                "tier": tier,
            }),
            Self::Heartbeat { timestamp } => json!({
                "event": "heartbeat",
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::Error { code, message } => json!({
                "event": "error",
                "code": code,
                "message": message,
            }),
            Self::Update { .. } => json!({}),
        };
        value.to_string()
    }
}

/// Client → server commands on the duplex transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Start receiving a channel's outcomes.
    Subscribe {
        /// Channel to follow.
        channel: String,
    },
    /// Stop receiving a channel's outcomes.
    Unsubscribe {
        /// Channel to drop.
        channel: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
