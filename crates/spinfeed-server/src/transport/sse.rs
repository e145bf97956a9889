//! Text-stream transport (`GET /stream`).
//!
//! One-way: the client picks channels with a `channels` query parameter
//! at connect time and receives pre-rendered `event:`/`id:`/`data:`
//! frames. Activity is marked per delivered frame, so a reader that keeps
//! consuming never times out.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use spinfeed_core::ChannelId;

use crate::connection::{ClientConnection, ConnectionState, TransportKind};
use crate::frame::Frame;
use crate::registry::ConnectionRegistry;
use crate::server::{AppState, header_credential, rejection};

/// Query parameters accepted on the stream handshake.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Credential, as an alternative to the `Authorization` header.
    pub token: Option<String>,
    /// Comma-separated channel ids to follow from the first frame.
    pub channels: Option<String>,
}

/// Unregisters the connection when the response body is dropped, which
/// is how an HTTP stream observes the peer going away.
struct StreamGuard {
    registry: Arc<ConnectionRegistry>,
    conn: Arc<ClientConnection>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.conn.close(ConnectionState::ClosedByPeer);
        self.registry.unregister(self.conn.id());
        debug!(connection = %self.conn.id(), "stream closed");
    }
}

/// GET /stream
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let token = header_credential(&headers).or_else(|| query.token.clone());
    let admission = match state.gate.admit(token.as_deref()).await {
        Ok(a) => a,
        Err(e) => return rejection(&e),
    };

    let (tx, rx) = mpsc::channel(state.config.channel_buffer);
    let conn = Arc::new(ClientConnection::new(
        admission.connection_id,
        admission.identity,
        admission.policy,
        TransportKind::Sse,
        tx,
    ));

    if let Err(e) = state.registry.register(conn.clone()) {
        let body = Json(serde_json::json!({
            "event": "error",
            "code": e.reason_code(),
            "message": e.to_string(),
        }));
        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    }

    let _ = conn.send_frame(&Frame::Connected {
        connection_id: conn.id().to_string(),
        tier: conn.policy().tier,
    });

    for channel in query
        .channels
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        if let Err(e) = state.registry.subscribe(conn.id(), &ChannelId::from(channel)) {
            let _ = conn.send_frame(&Frame::error(e.reason_code(), e.to_string()));
        }
    }

    conn.mark_streaming();

    let guard = StreamGuard {
        registry: state.registry.clone(),
        conn: conn.clone(),
    };
    let closed = conn.closed();
    let activity = conn;
    let stream = ReceiverStream::new(rx)
        .map(move |text: Arc<String>| {
            let _ = &guard;
            activity.mark_activity();
            Ok::<_, Infallible>(Bytes::copy_from_slice(text.as_bytes()))
        })
        .take_until(Box::pin(closed.cancelled_owned()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
