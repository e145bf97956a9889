//! HS256 bearer-token verification.
//!
//! Only verification lives here; tokens are issued by an external
//! credential service sharing the same secret. Expiry is validated with
//! zero leeway so "expired" means expired at the instant of admission.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use spinfeed_core::{Identity, SubjectId};

use crate::errors::AccessError;

/// Claims spinfeed requires from a bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Expiry as UNIX seconds.
    pub exp: i64,
    /// Any further claims ride along untyped.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stateless verifier over a shared HS256 secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Build a verifier from the shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token and extract the caller's identity.
    ///
    /// Structural problems map to [`AccessError::Unauthenticated`];
    /// signature and expiry failures to [`AccessError::InvalidSignature`].
    pub fn verify(&self, token: &str) -> Result<Identity, AccessError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    AccessError::InvalidSignature("signature mismatch".into())
                }
                ErrorKind::ExpiredSignature => {
                    AccessError::InvalidSignature("credential expired".into())
                }
                ErrorKind::ImmatureSignature => {
                    AccessError::InvalidSignature("credential not yet valid".into())
                }
                _ => AccessError::Unauthenticated(format!("malformed credential: {e}")),
            },
        )?;

        let raw_claims =
            serde_json::to_value(&data.claims).unwrap_or(serde_json::Value::Null);
        Ok(Identity {
            subject_id: SubjectId::from(data.claims.sub.as_str()),
            raw_claims,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
