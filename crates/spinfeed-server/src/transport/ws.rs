//! Duplex transport (`GET /ws`).
//!
//! Admission happens on the handshake, before the upgrade. After upgrade
//! the socket task forwards queued frames outward and parses inbound text
//! as subscribe/unsubscribe commands. Transport-level ping/pong and every
//! successfully written frame refresh the activity clock, so a client
//! that only listens is never mistaken for an idle one.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use spinfeed_auth::Admission;
use spinfeed_core::ChannelId;

use crate::connection::{ClientConnection, ConnectionState, TransportKind};
use crate::frame::{ClientCommand, Frame};
use crate::registry::ConnectionRegistry;
use crate::server::{AppState, header_credential, rejection};

/// Query parameters accepted on the duplex handshake.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Credential, as an alternative to the `Authorization` header.
    pub token: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Admission is checked first so a bad credential is a 401 even when
    // the request is not a well-formed upgrade.
    let token = query.token.clone().or_else(|| header_credential(&headers));
    let admission = match state.gate.admit(token.as_deref()).await {
        Ok(a) => a,
        Err(e) => return rejection(&e),
    };

    match upgrade {
        Ok(upgrade) => {
            upgrade.on_upgrade(move |socket| run_socket(state, admission, socket))
        }
        Err(rej) => rej.into_response(),
    }
}

async fn run_socket(state: AppState, admission: Admission, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel(state.config.channel_buffer);
    let conn = Arc::new(ClientConnection::new(
        admission.connection_id,
        admission.identity,
        admission.policy,
        TransportKind::WebSocket,
        tx,
    ));
    let (mut sink, mut source) = socket.split();

    if let Err(e) = state.registry.register(conn.clone()) {
        let refusal = Frame::error(e.reason_code(), e.to_string());
        let _ = sink.send(Message::Text(refusal.to_ws_text().into())).await;
        let _ = sink.close().await;
        return;
    }

    let _ = conn.send_frame(&Frame::Connected {
        connection_id: conn.id().to_string(),
        tier: conn.policy().tier,
    });
    conn.mark_streaming();

    let closed = conn.closed();
    loop {
        tokio::select! {
            () = closed.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outbound = rx.recv() => {
                let Some(text) = outbound else {
                    break;
                };
                if !forward_outbound(&mut sink, &conn, text.as_str()).await {
                    conn.close(ConnectionState::ClosedByPeer);
                    break;
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(&state.registry, &conn, text.as_str());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        conn.mark_activity();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let _ = conn.send_frame(&Frame::error(
                            "bad_command",
                            "binary messages are not accepted",
                        ));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection = %conn.id(), "peer closed");
                        conn.close(ConnectionState::ClosedByPeer);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %conn.id(), error = %e, "socket read failed");
                        conn.close(ConnectionState::ClosedByPeer);
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(conn.id());
}

/// Write one frame to the socket. A write the peer accepted counts as
/// transport activity; pure listeners stay fresh on delivered frames
/// alone.
async fn forward_outbound<S>(sink: &mut S, conn: &ClientConnection, text: &str) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    if sink.send(Message::Text(text.into())).await.is_ok() {
        conn.mark_activity();
        true
    } else {
        false
    }
}

/// Apply one inbound command; refusals come back as error frames on the
/// same connection, which stays live.
fn handle_command(registry: &ConnectionRegistry, conn: &Arc<ClientConnection>, text: &str) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Subscribe { channel }) => {
            if let Err(e) = registry.subscribe(conn.id(), &ChannelId::from(channel)) {
                let _ = conn.send_frame(&Frame::error(e.reason_code(), e.to_string()));
            }
        }
        Ok(ClientCommand::Unsubscribe { channel }) => {
            if let Err(e) = registry.unsubscribe(conn.id(), &ChannelId::from(channel)) {
                let _ = conn.send_frame(&Frame::error(e.reason_code(), e.to_string()));
            }
        }
        Err(e) => {
            let _ = conn.send_frame(&Frame::error("bad_command", e.to_string()));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spinfeed_core::{ConnectionId, Tier, TierTable};

    fn registered_conn(
        registry: &ConnectionRegistry,
        tier: Tier,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            None,
            TierTable::default().policy_for(tier),
            TransportKind::WebSocket,
            tx,
        ));
        registry.register(conn.clone()).unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn subscribe_command_adds_subscriber() {
        let registry = ConnectionRegistry::new(10);
        let (conn, _rx) = registered_conn(&registry, Tier::Pro);

        handle_command(
            &registry,
            &conn,
            r#"{"action":"subscribe","channel":"r1"}"#,
        );
        assert_eq!(registry.channel_subscribers(&ChannelId::from("r1")).len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_command_removes_subscriber() {
        let registry = ConnectionRegistry::new(10);
        let (conn, _rx) = registered_conn(&registry, Tier::Pro);

        handle_command(&registry, &conn, r#"{"action":"subscribe","channel":"r1"}"#);
        handle_command(
            &registry,
            &conn,
            r#"{"action":"unsubscribe","channel":"r1"}"#,
        );
        assert!(registry.channel_subscribers(&ChannelId::from("r1")).is_empty());
    }

    #[tokio::test]
    async fn over_cap_subscribe_sends_error_frame_and_keeps_connection() {
        let registry = ConnectionRegistry::new(10);
        let (conn, mut rx) = registered_conn(&registry, Tier::Basic);

        handle_command(&registry, &conn, r#"{"action":"subscribe","channel":"r1"}"#);
        handle_command(&registry, &conn, r#"{"action":"subscribe","channel":"r2"}"#);
        handle_command(&registry, &conn, r#"{"action":"subscribe","channel":"r3"}"#);

        let text = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "error");
        assert_eq!(parsed["code"], "capacity_exceeded");

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(conn.subscription_count(), 2);
    }

    #[tokio::test]
    async fn successful_forward_refreshes_activity() {
        use std::time::Duration;

        let registry = ConnectionRegistry::new(10);
        let (conn, _rx) = registered_conn(&registry, Tier::Pro);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(conn.idle_for() >= Duration::from_millis(20));

        let (mut sink, _peer) = futures::channel::mpsc::channel::<Message>(4);
        assert!(forward_outbound(&mut sink, &conn, "{}").await);
        assert!(conn.idle_for() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn failed_forward_reports_failure() {
        let registry = ConnectionRegistry::new(10);
        let (conn, _rx) = registered_conn(&registry, Tier::Pro);

        let (mut sink, peer) = futures::channel::mpsc::channel::<Message>(4);
        drop(peer);
        assert!(!forward_outbound(&mut sink, &conn, "{}").await);
    }

    #[tokio::test]
    async fn listening_only_client_survives_heartbeat_cutoff() {
        use crate::heartbeat::heartbeat_tick;
        use std::time::Duration;

        let registry = ConnectionRegistry::new(10);
        let (conn, mut rx) = registered_conn(&registry, Tier::Pro);
        conn.mark_streaming();

        // Socket half: drains every queued frame and writes it out
        // successfully, but the peer never sends anything back.
        let socket_conn = conn.clone();
        let socket = tokio::spawn(async move {
            let (mut sink, _peer) = futures::channel::mpsc::channel::<Message>(64);
            let closed = socket_conn.closed();
            let mut written = 0usize;
            loop {
                tokio::select! {
                    () = closed.cancelled() => break,
                    frame = rx.recv() => {
                        let Some(text) = frame else { break };
                        if !forward_outbound(&mut sink, &socket_conn, text.as_str()).await {
                            break;
                        }
                        written += 1;
                    }
                }
            }
            written
        });

        // Several heartbeat periods past the idle cutoff: the delivered
        // heartbeats themselves keep the connection fresh.
        let cutoff = Duration::from_millis(50);
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            assert_eq!(heartbeat_tick(&registry, cutoff), 0);
        }
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Streaming);

        conn.close(ConnectionState::ClosedByPeer);
        registry.unregister(conn.id());
        let written = tokio::time::timeout(Duration::from_secs(1), socket)
            .await
            .expect("socket half should stop once the connection closes")
            .unwrap();
        // The final frame may still be queued when the close lands.
        assert!(written >= 3);
    }

    #[tokio::test]
    async fn malformed_command_sends_bad_command_frame() {
        let registry = ConnectionRegistry::new(10);
        let (conn, mut rx) = registered_conn(&registry, Tier::Pro);

        handle_command(&registry, &conn, "not json");
        let text = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "error");
        assert_eq!(parsed["code"], "bad_command");
    }
}
