//! Ingestion error types.

use thiserror::Error;

/// Errors inside the ingest loop. None of these are client-visible: the
/// loop recovers locally by retrying or skipping.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The backing store is unreachable or failed a query. Retried with
    /// a fixed delay.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// A stored row failed to parse into an outcome. Logged and skipped;
    /// the cursor still advances past it.
    #[error("malformed upstream record: {0}")]
    Malformed(String),

    /// The sink refused the handoff. Retried; the cursor stays before
    /// the undelivered row.
    #[error("handoff failed: {0}")]
    Handoff(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
