//! Server-side error types.

use thiserror::Error;

/// Per-call registry failures. The connection stays live; only the
/// offending call is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection (or the whole registry) is at its cap.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The connection id is not registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),
}

impl RegistryError {
    /// Machine-readable reason code carried on error frames.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::UnknownConnection(_) => "unknown_connection",
        }
    }
}

/// Payload sealing failures.
#[derive(Debug, Error)]
pub enum SealError {
    /// AEAD encryption failed.
    #[error("sealing failed")]
    SealFailed,

    /// AEAD decryption or authentication failed.
    #[error("opening failed")]
    OpenFailed,

    /// Input was not valid base64 or too short to hold a nonce.
    #[error("invalid encoding")]
    InvalidEncoding,

    /// Opened bytes were not UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// Key file did not decode to exactly 32 bytes.
    #[error("invalid key length")]
    InvalidKeyLength,

    /// Key file could not be read or written.
    #[error("key file error: {0}")]
    Io(String),
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A registry call was refused.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Wire payload serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Payload sealing failed.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// The history source failed a query.
    #[error("history query failed: {0}")]
    History(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
