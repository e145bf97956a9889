//! Admission error types.

use thiserror::Error;

/// Rejections at admission. A connection that hits one of these never
/// enters the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    /// Credential absent or structurally malformed.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credential present but its signature or expiry check failed.
    #[error("invalid credential: {0}")]
    InvalidSignature(String),
}

impl AccessError {
    /// Machine-readable reason code surfaced on the wire.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidSignature(_) => "invalid_credential",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
