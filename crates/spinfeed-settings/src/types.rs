//! Typed settings sections with compiled defaults.
//!
//! Every section derives `#[serde(default)]` so a partial settings file
//! only overrides the keys it names.

use serde::{Deserialize, Serialize};
use spinfeed_core::TierTable;

/// Admission strictness. Deployments pick exactly one; the two modes are
/// never mixed within a running gateway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Reject any connection without a valid credential.
    #[default]
    Strict,
    /// Admit connections with an absent credential at the unpaid tier.
    /// A credential that is present but invalid is still rejected.
    Degraded,
}

/// How the ingester learns about new outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Fixed-interval re-query of the backing store.
    #[default]
    Poll,
    /// Wait on the store's change notification, then re-query.
    Notified,
}

/// Network and heartbeat settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Bind address.
    pub host: String,
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// A connection idle for more than `factor × period` is reaped.
    pub heartbeat_timeout_factor: u32,
    /// Hard cap on simultaneously registered connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_factor: 2,
            max_connections: 10_000,
        }
    }
}

/// Admission and entitlement-resolution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Strict or degraded admission.
    pub mode: AuthMode,
    /// HS256 shared secret for bearer verification. Empty means
    /// "not configured"; set it via `SPINFEED_JWT_SECRET`.
    pub jwt_secret: String,
    /// Subscription lookup budget; on timeout the connection is admitted
    /// at the unpaid tier.
    pub resolve_timeout_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            mode: AuthMode::Strict,
            jwt_secret: String::new(),
            resolve_timeout_ms: 1_500,
        }
    }
}

/// Change-ingestion settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Poll or push-notified wiring.
    pub mode: FeedMode,
    /// Poll period in milliseconds (also the notify re-check floor).
    pub poll_interval_ms: u64,
    /// Maximum rows fetched per channel per cycle.
    pub batch_limit: u32,
    /// Fixed delay before retrying after an upstream error.
    pub retry_delay_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            mode: FeedMode::Poll,
            poll_interval_ms: 1_000,
            batch_limit: 256,
            retry_delay_ms: 2_000,
        }
    }
}

/// Optional payload sealing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SealSettings {
    /// Seal data payloads before transmission.
    pub enabled: bool,
    /// Path to the 32-byte sealing key file.
    pub key_path: String,
}

impl Default for SealSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            key_path: "seal.key".to_string(),
        }
    }
}

/// SQLite backing-store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file path.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "spinfeed.db".to_string(),
            pool_size: 8,
        }
    }
}

/// Root settings document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpinfeedSettings {
    /// Settings schema version for log correlation.
    pub version: String,
    /// Network and heartbeat.
    pub server: ServerSettings,
    /// Admission and entitlements.
    pub auth: AuthSettings,
    /// Change ingestion.
    pub ingest: IngestSettings,
    /// Payload sealing.
    pub seal: SealSettings,
    /// Backing store.
    pub store: StoreSettings,
    /// Versioned tier limits, immutable after load.
    pub tiers: TierTable,
}

impl Default for SpinfeedSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            ingest: IngestSettings::default(),
            seal: SealSettings::default(),
            store: StoreSettings::default(),
            tiers: TierTable::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
