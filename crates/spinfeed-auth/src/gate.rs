//! The single admission path shared by both transports.
//!
//! `admit` verifies the credential, resolves the policy, and mints a
//! connection id. It has no registry side effects: the transport layer
//! registers the connection only after admission succeeds, so stream and
//! duplex handshakes share exactly one credential check.

use tracing::{debug, info};

use spinfeed_core::{ConnectionId, EntitlementPolicy, Identity};
use spinfeed_settings::AuthMode;

use crate::errors::AccessError;
use crate::resolver::EntitlementResolver;
use crate::token::TokenVerifier;

/// The result of a successful admission.
#[derive(Debug)]
pub struct Admission {
    /// Freshly minted connection id.
    pub connection_id: ConnectionId,
    /// Verified identity. `None` only for degraded-mode anonymous
    /// admissions.
    pub identity: Option<Identity>,
    /// Policy the connection will carry for its whole lifetime.
    pub policy: EntitlementPolicy,
}

/// Extract the token from an `Authorization: Bearer <token>` value.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Admission control, parameterized by strictness mode.
pub struct AccessGate {
    mode: AuthMode,
    verifier: TokenVerifier,
    resolver: EntitlementResolver,
}

impl AccessGate {
    /// Build a gate.
    pub fn new(mode: AuthMode, verifier: TokenVerifier, resolver: EntitlementResolver) -> Self {
        Self {
            mode,
            verifier,
            resolver,
        }
    }

    /// The configured strictness mode.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Admit or reject a connection attempt.
    ///
    /// An absent credential is rejected in strict mode and admitted at
    /// the unpaid tier in degraded mode. A credential that is present but
    /// malformed, badly signed, or expired is rejected in both modes.
    pub async fn admit(&self, raw_credential: Option<&str>) -> Result<Admission, AccessError> {
        let Some(token) = raw_credential else {
            return match self.mode {
                AuthMode::Strict => {
                    debug!("rejecting connection without credential");
                    Err(AccessError::Unauthenticated("missing credential".into()))
                }
                AuthMode::Degraded => {
                    let connection_id = ConnectionId::new();
                    info!(%connection_id, "admitting anonymous connection at unpaid tier");
                    Ok(Admission {
                        connection_id,
                        identity: None,
                        policy: self.resolver.unpaid_policy(),
                    })
                }
            };
        };

        let identity = self.verifier.verify(token)?;
        let policy = self.resolver.resolve(&identity).await;
        let connection_id = ConnectionId::new();
        info!(%connection_id, subject = %identity.subject_id, tier = ?policy.tier, "admitted connection");

        Ok(Admission {
            connection_id,
            identity: Some(identity),
            policy,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
