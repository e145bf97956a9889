//! Optional payload sealing.
//!
//! Sealing is orthogonal to dispatch: the dispatcher serializes the
//! payload and runs it through whatever [`PayloadSealer`] is plugged in.
//! The sealed form is base64(nonce ‖ ciphertext) with a random 12-byte
//! nonce, ChaCha20-Poly1305 AEAD.

use std::path::Path;

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use crate::errors::SealError;

const NONCE_LEN: usize = 12;

/// Pluggable payload serializer applied after JSON serialization.
pub trait PayloadSealer: Send + Sync {
    /// Transform serialized payload text into its wire form.
    fn seal(&self, plaintext: &str) -> Result<String, SealError>;
}

/// Pass-through sealer; the wire carries plain JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainSealer;

impl PayloadSealer for PlainSealer {
    fn seal(&self, plaintext: &str) -> Result<String, SealError> {
        Ok(plaintext.to_string())
    }
}

/// ChaCha20-Poly1305 sealer with a static 256-bit key.
pub struct ChaChaSealer {
    key: [u8; 32],
}

impl ChaChaSealer {
    /// Build from a raw key.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from a base64-encoded key file, creating one if absent.
    pub fn from_key_file(path: &Path) -> Result<Self, SealError> {
        Ok(Self::new(load_or_create_key(path)?))
    }

    /// Reverse of [`PayloadSealer::seal`]. Authentication failures and
    /// malformed input are rejected.
    pub fn open(&self, sealed: &str) -> Result<String, SealError> {
        let combined = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, sealed)
            .map_err(|_| SealError::InvalidEncoding)?;

        if combined.len() < NONCE_LEN {
            return Err(SealError::InvalidEncoding);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = ChaCha20Poly1305::new((&self.key).into());

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SealError::OpenFailed)?;

        String::from_utf8(plaintext).map_err(|_| SealError::InvalidUtf8)
    }
}

impl PayloadSealer for ChaChaSealer {
    fn seal(&self, plaintext: &str) -> Result<String, SealError> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let mut nonce_bytes = [0u8; NONCE_LEN];
        chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| SealError::SealFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &combined,
        ))
    }
}

/// Generate a random 256-bit key.
#[must_use]
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    chacha20poly1305::aead::rand_core::RngCore::fill_bytes(&mut OsRng, &mut key);
    key
}

/// Load the base64-encoded key file, or create it with a fresh key.
pub fn load_or_create_key(path: &Path) -> Result<[u8; 32], SealError> {
    if path.exists() {
        let encoded =
            std::fs::read_to_string(path).map_err(|e| SealError::Io(e.to_string()))?;
        let bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            encoded.trim(),
        )
        .map_err(|_| SealError::InvalidEncoding)?;
        if bytes.len() != 32 {
            return Err(SealError::InvalidKeyLength);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(key)
    } else {
        let key = generate_key();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SealError::Io(e.to_string()))?;
        }
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key);
        std::fs::write(path, &encoded).map_err(|e| SealError::Io(e.to_string()))?;

        // Key material: owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| SealError::Io(e.to_string()))?;
        }

        Ok(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
