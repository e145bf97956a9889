//! Axum router and shared handler state.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::warn;

use spinfeed_auth::{AccessError, AccessGate, bearer_token};
use spinfeed_core::{ChannelId, OutcomePayload, RawOutcome};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::seal::PayloadSealer;
use crate::shutdown::ShutdownCoordinator;
use crate::transport;

/// Read side of the backing store used by the HTTP layer: the history
/// pull endpoint and the health probe. The binary implements this over
/// SQLite; tests inject fakes.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Most recent outcomes for a channel, newest first, capped by
    /// `limit` (`None` = uncapped).
    async fn history(
        &self,
        channel: &ChannelId,
        limit: Option<u32>,
    ) -> Result<Vec<RawOutcome>, ServerError>;

    /// Whether the store currently answers queries.
    async fn store_connected(&self) -> bool;
}

/// Shared state accessible from every handler.
#[derive(Clone)]
pub struct AppState {
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Admission control.
    pub gate: Arc<AccessGate>,
    /// History and health reads.
    pub history: Arc<dyn HistorySource>,
    /// Payload sealer shared with the dispatcher.
    pub sealer: Arc<dyn PayloadSealer>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the process started.
    pub start_time: Instant,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stream", get(transport::sse::stream_handler))
        .route("/ws", get(transport::ws::ws_handler))
        .route("/channels/{channel}/history", get(history_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extract the bearer credential from an `Authorization` header.
pub(crate) fn header_credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
}

/// 401 with a machine-readable error body.
pub(crate) fn rejection(err: &AccessError) -> Response {
    let body = Json(serde_json::json!({
        "event": "error",
        "code": err.reason_code(),
        "message": err.to_string(),
    }));
    (StatusCode::UNAUTHORIZED, body).into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_connected = state.history.store_connected().await;
    Json(health::health_check(
        state.start_time,
        store_connected,
        state.registry.connection_count(),
    ))
}

/// GET /channels/{channel}/history
///
/// The read path for tiers without live push. The response depth is
/// shaped by the caller's policy, never by a client-supplied limit.
async fn history_handler(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = header_credential(&headers);
    let admission = match state.gate.admit(token.as_deref()).await {
        Ok(a) => a,
        Err(e) => return rejection(&e),
    };

    let channel = ChannelId::from(channel);
    let rows = match state
        .history
        .history(&channel, admission.policy.history_depth)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!(channel = %channel, error = %e, "history query failed");
            let body = Json(serde_json::json!({
                "event": "error",
                "code": "store_error",
                "message": "history unavailable",
            }));
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };

    let payloads: Vec<OutcomePayload> = rows
        .iter()
        .filter_map(|raw| match raw.parse() {
            Ok(event) => Some(OutcomePayload::from(&event)),
            Err(e) => {
                warn!(channel = %channel, error = %e, "skipping malformed stored outcome");
                None
            }
        })
        .collect();
    Json(payloads).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
